//! Telemetry for guardrail runs using the `tracing` ecosystem.
//!
//! Every pipeline run opens a `guardrail_pipeline` span and every check a
//! `guardrail_check` span inside it. Operator diagnostics (oracle reasoning,
//! error detail) are emitted as events here and nowhere else; the
//! user-facing [`Action`](crate::Action) never carries them.
//!
//! # Usage
//!
//! ```rust,ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("tripwire=debug")
//!     .init();
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{Span, debug, debug_span, info, info_span, warn};
use uuid::Uuid;

use crate::guardrail::Stage;
use crate::pipeline::PipelineResult;

/// Metrics collected during one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// Checks evaluated.
    pub checks: usize,
    /// Checks that tripped.
    pub tripped: usize,
    /// Checks whose oracle call failed.
    pub failed: usize,
    /// Oracle calls repeated after a retryable failure.
    pub retries: u32,
    /// Wall-clock duration of the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
}

impl PipelineMetrics {
    /// Collect metrics from a finished run.
    #[must_use]
    pub fn from_result(result: &PipelineResult) -> Self {
        let mut metrics = Self {
            checks: result.verdicts.len(),
            duration: Some(result.elapsed),
            ..Self::default()
        };
        for verdict in &result.verdicts {
            if verdict.tripped {
                metrics.tripped += 1;
            }
            if verdict.is_failed() {
                metrics.failed += 1;
            }
            metrics.retries += verdict.attempts.saturating_sub(1);
        }
        metrics
    }

    /// Checks that returned a usable judgment.
    #[must_use]
    pub const fn judged(&self) -> usize {
        self.checks.saturating_sub(self.failed)
    }
}

impl std::fmt::Display for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Guardrail Metrics")?;
        writeln!(f, "  Checks:   {}", self.checks)?;
        writeln!(f, "  Tripped:  {}", self.tripped)?;
        writeln!(f, "  Failed:   {}", self.failed)?;
        writeln!(f, "  Retries:  {}", self.retries)?;
        if let Some(d) = self.duration {
            writeln!(f, "  Duration: {:.2}s", d.as_secs_f64())?;
        }
        Ok(())
    }
}

/// Span factories and operator-facing events for guardrail runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Telemetry;

impl Telemetry {
    /// Create a span for a pipeline run.
    #[must_use]
    pub fn pipeline_span(stage: Stage, turn_id: Uuid) -> Span {
        info_span!("guardrail_pipeline", stage = %stage, turn_id = %turn_id)
    }

    /// Create a span for a single check.
    #[must_use]
    pub fn check_span(check: &str) -> Span {
        debug_span!("guardrail_check", check = %check)
    }

    /// Log per-check diagnostics and the run summary, returning the metrics.
    pub fn record_result(result: &PipelineResult) -> PipelineMetrics {
        for verdict in &result.verdicts {
            if let Some(error) = &verdict.error {
                warn!(
                    check = %verdict.check,
                    kind = ?error.kind,
                    attempts = verdict.attempts,
                    tripped = verdict.tripped,
                    error = %error.message,
                    "check_failed"
                );
            } else if let Some(judgment) = &verdict.judgment {
                if verdict.tripped {
                    info!(
                        check = %verdict.check,
                        reasoning = judgment.reasoning(),
                        "check_tripped"
                    );
                } else {
                    debug!(
                        check = %verdict.check,
                        reasoning = judgment.reasoning(),
                        "check_passed"
                    );
                }
            }
        }

        let metrics = PipelineMetrics::from_result(result);
        info!(
            stage = %result.stage,
            tripped = result.tripped,
            checks = metrics.checks,
            tripped_checks = metrics.tripped,
            failed_checks = metrics.failed,
            retries = metrics.retries,
            duration_ms = result.elapsed.as_millis(),
            "pipeline_completed"
        );
        metrics
    }
}
