//! The classifier behind every check.
//!
//! An [`Oracle`] receives a check's rubric, its reply contract and the text
//! under evaluation, and returns the raw structured reply. The
//! [`OracleAdapter`] wraps an oracle with a per-call timeout and validates the
//! reply against the check's record before anything downstream sees it.
//!
//! # Implementations
//!
//! - [`OpenAiOracle`]: any OpenAI-compatible chat completions endpoint.
//! - [`MockOracle`] and [`FailingOracle`]: scripted oracles for tests and
//!   offline runs.
//!
//! The adapter never retries; retry scheduling is the pipeline's concern.

mod mock;
mod openai;

pub use mock::{FailingOracle, MockOracle};
pub use openai::OpenAiOracle;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::context::CallContext;
use crate::error::OracleError;
use crate::guardrail::{CheckSpec, FieldSpec, Judgment, Stage};

/// One classification request.
#[derive(Debug, Clone, Copy)]
pub struct OracleRequest<'a> {
    /// Stage the check belongs to.
    pub stage: Stage,
    /// Name of the check.
    pub check: &'a str,
    /// Operating instructions for the classifier.
    pub rubric: &'a str,
    /// Exact reply contract.
    pub fields: &'a [FieldSpec],
    /// JSON Schema of the reply record.
    pub json_schema: &'a Value,
    /// The text to judge.
    pub payload: &'a str,
    /// The turn this call belongs to.
    pub context: &'a CallContext,
}

impl<'a> OracleRequest<'a> {
    /// Build the request for `check` against `payload`.
    #[must_use]
    pub fn new(
        stage: Stage,
        check: &'a CheckSpec,
        payload: &'a str,
        context: &'a CallContext,
    ) -> Self {
        Self {
            stage,
            check: check.name(),
            rubric: check.rubric(),
            fields: check.fields(),
            json_schema: check.json_schema(),
            payload,
            context,
        }
    }
}

/// A remote classifier that judges text against a rubric.
///
/// Implementations return the reply as raw JSON; validation happens in the
/// [`OracleAdapter`].
#[async_trait]
pub trait Oracle: Send + Sync + fmt::Debug {
    /// Classify the request's payload.
    ///
    /// # Errors
    ///
    /// Returns an [`OracleError`] of kind `Unavailable` on transport or auth
    /// failure, or `SchemaViolation` if the reply is not JSON.
    async fn classify(&self, request: &OracleRequest<'_>) -> Result<Value, OracleError>;

    /// Name of the backing service, for logs.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// Shared, thread-safe oracle handle.
pub type SharedOracle = Arc<dyn Oracle>;

/// Turns a (check, payload) pair into a validated [`Judgment`].
#[derive(Debug, Clone)]
pub struct OracleAdapter {
    oracle: SharedOracle,
    timeout: Option<Duration>,
}

impl OracleAdapter {
    /// Wrap an oracle without a timeout.
    #[must_use]
    pub fn new(oracle: SharedOracle) -> Self {
        Self {
            oracle,
            timeout: None,
        }
    }

    /// Set the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The configured per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The wrapped oracle.
    #[must_use]
    pub fn oracle(&self) -> &SharedOracle {
        &self.oracle
    }

    /// Ask the oracle to judge `payload` for `check`.
    ///
    /// # Errors
    ///
    /// Returns the oracle's error, a `Timeout` error if the call exceeded the
    /// configured timeout, or a `SchemaViolation` if the reply does not match
    /// the check's record exactly.
    pub async fn evaluate(
        &self,
        stage: Stage,
        check: &CheckSpec,
        payload: &str,
        context: &CallContext,
    ) -> Result<Judgment, OracleError> {
        let request = OracleRequest::new(stage, check, payload, context);
        let call = self.oracle.classify(&request);

        let reply = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(OracleError::timeout(limit))),
            None => call.await,
        }
        .map_err(|e| e.for_check(check.name()))?;

        debug!(
            oracle = self.oracle.name(),
            check = check.name(),
            %stage,
            turn_id = %context.turn_id,
            metadata = %context.metadata,
            "oracle replied"
        );
        check.parse(&reply)
    }
}
