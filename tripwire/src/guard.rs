//! Orchestrator-facing guard.
//!
//! A [`Guard`] wraps one [`Pipeline`] and the user-facing [`Notices`]. It
//! answers the two questions an orchestrator asks per turn: may this message
//! reach the agent, and may this response reach the user.
//!
//! [`Guard::guard_turn`] runs a whole turn in causal order:
//!
//! ```text
//! user message ──► input checks ──► Responder ──► output checks ──► user
//!                       │ trip                          │ trip
//!                       ▼                               ▼
//!               policy-violation notice        response-withheld notice
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, info, info_span};

use crate::config::GuardConfig;
use crate::context::CallContext;
use crate::error::{Error, Result};
use crate::guardrail::{CheckRegistry, Stage};
use crate::oracle::{OpenAiOracle, SharedOracle};
use crate::pipeline::{Pipeline, PipelineResult};
use crate::policy::{Action, Notices, decide};

/// The main conversational agent whose replies are guarded.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Produce a candidate response for `message`.
    ///
    /// # Errors
    ///
    /// Implementations return [`Error::Responder`] when no response could be
    /// produced.
    async fn respond(&self, message: &str, context: &CallContext) -> Result<String>;
}

/// Input and output guardrails for a conversational agent.
#[derive(Debug, Clone)]
pub struct Guard {
    pipeline: Pipeline,
    notices: Notices,
}

impl Guard {
    /// Create a guard around a pipeline.
    #[must_use]
    pub const fn new(pipeline: Pipeline, notices: Notices) -> Self {
        Self { pipeline, notices }
    }

    /// Build a guard that judges through the configured OpenAI-compatible
    /// endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or a disabled
    /// check name is unknown.
    pub fn from_config(config: &GuardConfig) -> Result<Self> {
        let oracle = OpenAiOracle::new(config.oracle.clone())?;
        Self::with_oracle(config, Arc::new(oracle))
    }

    /// Build a guard over the standard checks, minus any disabled ones,
    /// judging with `oracle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registry`] if a disabled check name is unknown.
    pub fn with_oracle(config: &GuardConfig, oracle: SharedOracle) -> Result<Self> {
        let mut registry = CheckRegistry::standard()?;
        if !config.disabled_checks.is_empty() {
            registry = registry.without(config.disabled_checks.as_slice())?;
        }
        Ok(Self::new(
            Pipeline::new(registry, oracle, config.pipeline),
            config.notices.clone(),
        ))
    }

    /// The pipeline both stages run on.
    #[must_use]
    pub const fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Texts shown to the user when a stage blocks.
    #[must_use]
    pub const fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Run one stage and decide its action.
    ///
    /// The [`PipelineResult`] carries operator diagnostics; only the
    /// [`Action`] is meant for the user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the context is cancelled.
    pub async fn evaluate(
        &self,
        stage: Stage,
        payload: &str,
        ctx: &CallContext,
    ) -> Result<(PipelineResult, Action)> {
        let result = self.pipeline.run(stage, payload, ctx).await?;
        let action = decide(&result, &self.notices);
        Ok((result, action))
    }

    /// Decide whether a user message may reach the agent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the context is cancelled.
    pub async fn run_input_pipeline(&self, message: &str, ctx: &CallContext) -> Result<Action> {
        Ok(self.evaluate(Stage::Input, message, ctx).await?.1)
    }

    /// Decide whether a candidate response may reach the user.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the context is cancelled.
    pub async fn run_output_pipeline(&self, candidate: &str, ctx: &CallContext) -> Result<Action> {
        Ok(self.evaluate(Stage::Output, candidate, ctx).await?.1)
    }

    /// Guard a full conversation turn.
    ///
    /// The responder is only invoked if the input stage proceeds, and its
    /// response is only released if the output stage proceeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the context is cancelled at any point
    /// of the turn, or the responder's error.
    pub async fn guard_turn(
        &self,
        message: &str,
        responder: &dyn Responder,
        ctx: &CallContext,
    ) -> Result<Action> {
        let span = info_span!("guarded_turn", turn_id = %ctx.turn_id);
        async {
            let action = self.run_input_pipeline(message, ctx).await?;
            if action.is_blocked() {
                info!(tripped = ?action.tripped_checks(), "input blocked");
                return Ok(action);
            }

            let candidate = tokio::select! {
                biased;
                () = ctx.cancellation().cancelled() => {
                    return Err(Error::cancelled(ctx.turn_id));
                }
                candidate = responder.respond(message, ctx) => candidate?,
            };

            let action = self.run_output_pipeline(&candidate, ctx).await?;
            if action.is_blocked() {
                info!(tripped = ?action.tripped_checks(), "output withheld");
            }
            Ok(action)
        }
        .instrument(span)
        .await
    }
}
