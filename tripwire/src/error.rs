//! Unified error types for tripwire.
//!
//! This module provides the error hierarchy covering:
//! - Classifier oracle failures (transport, timeout, malformed judgments)
//! - Check registry misconfiguration
//! - Configuration loading
//! - Turn-level failures surfaced to the orchestrator (cancellation, responder)

use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::guardrail::Stage;

/// Result type alias for tripwire operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for tripwire.
///
/// Per-check oracle failures never reach this type during a pipeline run:
/// they are caught and recorded on the check's [`Verdict`](crate::Verdict).
/// What remains are configuration problems and turn-level aborts.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Check registry misconfiguration.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The main agent failed to produce a candidate response.
    #[error("Responder error: {0}")]
    Responder(String),

    /// The conversation turn was cancelled while guardrails were running.
    #[error("Guardrail run for turn {turn_id} was cancelled")]
    Cancelled {
        /// The cancelled turn.
        turn_id: Uuid,
    },
}

impl Error {
    /// Create a responder error with a message.
    #[must_use]
    pub fn responder(msg: impl Into<String>) -> Self {
        Self::Responder(msg.into())
    }

    /// Create a cancellation error for the given turn.
    #[must_use]
    pub const fn cancelled(turn_id: Uuid) -> Self {
        Self::Cancelled { turn_id }
    }

    /// Returns `true` if the turn was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Error type for classifier oracle calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct OracleError {
    /// The error kind.
    pub kind: OracleErrorKind,
    /// The check the call was made for, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    /// Additional error message.
    pub message: String,
}

/// Categories of oracle errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum OracleErrorKind {
    /// Network, authentication or HTTP status failure reaching the oracle.
    Unavailable,
    /// The call exceeded the configured per-call timeout.
    Timeout,
    /// The reply could not be parsed into the check's judgment schema.
    SchemaViolation,
}

impl OracleError {
    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: OracleErrorKind::Unavailable,
            check: None,
            message: message.into(),
        }
    }

    /// Create a timeout error.
    #[must_use]
    pub fn timeout(after: std::time::Duration) -> Self {
        Self {
            kind: OracleErrorKind::Timeout,
            check: None,
            message: format!("Oracle call timed out after {}ms", after.as_millis()),
        }
    }

    /// Create a schema violation error.
    #[must_use]
    pub fn schema_violation(message: impl Into<String>) -> Self {
        Self {
            kind: OracleErrorKind::SchemaViolation,
            check: None,
            message: message.into(),
        }
    }

    /// Create an HTTP status error.
    #[must_use]
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::unavailable(format!("HTTP {status}: {}", body.into()))
    }

    /// Attach the name of the check this call was made for.
    #[must_use]
    pub fn for_check(mut self, check: impl Into<String>) -> Self {
        self.check = Some(check.into());
        self
    }

    /// Returns `true` if the oracle could not be reached in time.
    ///
    /// Timeouts are treated exactly like transport failures.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(
            self.kind,
            OracleErrorKind::Unavailable | OracleErrorKind::Timeout
        )
    }

    /// Returns `true` if repeating the call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.is_unavailable()
    }
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(check) = &self.check {
            write!(f, "[{check}] ")?;
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for OracleError {}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self {
                kind: OracleErrorKind::Timeout,
                check: None,
                message: "Request timed out".into(),
            }
        } else if err.is_connect() {
            Self::unavailable(format!("Connection failed: {err}"))
        } else {
            Self::unavailable(err.to_string())
        }
    }
}

/// Error type for check registry configuration.
///
/// These are programmer errors and should abort startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// A check with the same name is already registered for the stage.
    #[error("Check '{name}' is already registered for the {stage} stage")]
    DuplicateCheck {
        /// Stage the registration targeted.
        stage: Stage,
        /// The duplicated check name.
        name: String,
    },

    /// A check referenced by name does not exist in any stage.
    #[error("Unknown check '{0}'")]
    UnknownCheck(String),
}

impl RegistryError {
    /// Create a duplicate check error.
    #[must_use]
    pub fn duplicate(stage: Stage, name: impl Into<String>) -> Self {
        Self::DuplicateCheck {
            stage,
            name: name.into(),
        }
    }
}

/// Error type for configuration loading.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("Environment variable {0} is not set")]
    MissingVar(String),

    /// A setting has an unusable value.
    #[error("Invalid value for {key}: {message}")]
    Invalid {
        /// The offending setting.
        key: String,
        /// Why it was rejected.
        message: String,
    },
}

impl ConfigError {
    /// Create an invalid value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}
