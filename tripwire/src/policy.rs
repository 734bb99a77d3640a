//! Verdict-to-action policy.
//!
//! Translates a [`PipelineResult`] into what the orchestrator must do next.
//! An [`Action`] is user-facing: it carries fixed notice texts and the names
//! of tripped checks, never the oracle's reasoning or error detail.

use serde::{Deserialize, Serialize};

use crate::guardrail::Stage;
use crate::pipeline::PipelineResult;

/// Default notice shown when an input check trips.
pub const DEFAULT_INPUT_NOTICE: &str =
    "Your message was blocked because it appears to violate our usage policy.";

/// Default notice shown when an output check trips.
pub const DEFAULT_OUTPUT_NOTICE: &str =
    "The response was withheld because it did not pass our content checks.";

/// Fixed texts shown to the end user in place of blocked content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Notices {
    /// Shown instead of invoking the agent when the input stage trips.
    pub input_blocked: String,
    /// Shown instead of the agent's response when the output stage trips.
    pub output_withheld: String,
}

impl Default for Notices {
    fn default() -> Self {
        Self {
            input_blocked: DEFAULT_INPUT_NOTICE.to_owned(),
            output_withheld: DEFAULT_OUTPUT_NOTICE.to_owned(),
        }
    }
}

/// What the orchestrator must do with a guarded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Forward the payload unchanged to the next stage.
    Proceed {
        /// The payload as evaluated.
        payload: String,
    },
    /// Do not invoke the main agent; show `notice` instead.
    BlockInput {
        /// Policy-violation notice for the user.
        notice: String,
        /// Names of the checks that tripped, for diagnostics.
        tripped_checks: Vec<String>,
    },
    /// Suppress the candidate response; show `notice` instead.
    BlockOutput {
        /// Response-withheld notice for the user.
        notice: String,
        /// Names of the checks that tripped, for diagnostics.
        tripped_checks: Vec<String>,
    },
}

impl Action {
    /// Returns `true` for either block variant.
    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        !matches!(self, Self::Proceed { .. })
    }

    /// The text the end user should see.
    #[must_use]
    pub fn user_text(&self) -> &str {
        match self {
            Self::Proceed { payload } => payload,
            Self::BlockInput { notice, .. } | Self::BlockOutput { notice, .. } => notice,
        }
    }

    /// Names of the checks that caused a block; empty for [`Action::Proceed`].
    #[must_use]
    pub fn tripped_checks(&self) -> &[String] {
        match self {
            Self::Proceed { .. } => &[],
            Self::BlockInput { tripped_checks, .. } | Self::BlockOutput { tripped_checks, .. } => {
                tripped_checks
            }
        }
    }
}

/// Decide the action for a pipeline result.
#[must_use]
pub fn decide(result: &PipelineResult, notices: &Notices) -> Action {
    if !result.tripped {
        return Action::Proceed {
            payload: result.payload.clone(),
        };
    }

    let tripped_checks = result
        .tripped_checks()
        .map(str::to_owned)
        .collect::<Vec<_>>();
    match result.stage {
        Stage::Input => Action::BlockInput {
            notice: notices.input_blocked.clone(),
            tripped_checks,
        },
        Stage::Output => Action::BlockOutput {
            notice: notices.output_withheld.clone(),
            tripped_checks,
        },
    }
}
