//! Configuration types for the guard, the pipeline and the oracle transport.
//!
//! All types derive serde so a host application can embed them in its own
//! configuration file. [`GuardConfig::from_env`] reads the same variables the
//! hosted deployment uses (`GEMINI_API_KEY`, `GEMINI_BASE_URL`,
//! `GEMINI_API_MODEL`).

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::Notices;

/// Default OpenAI-compatible endpoint for Gemini models.
pub const GEMINI_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Environment variable holding the oracle API key.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
/// Environment variable overriding the oracle base URL.
pub const BASE_URL_VAR: &str = "GEMINI_BASE_URL";
/// Environment variable holding the oracle model name.
pub const MODEL_VAR: &str = "GEMINI_API_MODEL";
/// Environment variable overriding the per-call timeout, in seconds.
pub const CALL_TIMEOUT_VAR: &str = "TRIPWIRE_CALL_TIMEOUT_SECS";

/// Connection settings for an OpenAI-compatible classifier endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Base URL, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Model used for every check.
    pub model: String,
    /// API key sent as a bearer token.
    #[serde(skip_serializing, default)]
    pub api_key: String,
    /// Sampling temperature; 0.0 keeps judgments deterministic.
    pub temperature: f64,
    /// Maximum tokens in a judgment reply.
    pub max_tokens: u32,
}

impl OracleConfig {
    /// Create a config for the given endpoint, model and key.
    ///
    /// Uses temperature 0.0 and 512 max tokens.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.into(),
            temperature: 0.0,
            max_tokens: 512,
        }
    }

    /// Read the config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] if the key or model is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the config through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] if the key or model is not set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_owned()))
        };
        let api_key = require(API_KEY_VAR)?;
        let model = require(MODEL_VAR)?;
        let base_url = lookup(BASE_URL_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| GEMINI_OPENAI_BASE_URL.to_owned());

        Ok(Self::new(base_url, model, api_key))
    }

    /// Set the sampling temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum tokens in a reply.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Full chat completions URL.
    #[must_use]
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// How the checks of one stage are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One oracle call at a time, in registration order.
    Sequential,
    /// All calls in flight at once, optionally capped.
    Parallel {
        /// Maximum concurrent oracle calls; `None` means unbounded.
        max_concurrency: Option<usize>,
    },
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Parallel {
            max_concurrency: None,
        }
    }
}

/// What a check whose oracle call failed contributes to the stage verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The failed check is reported but does not trip.
    #[default]
    FailOpen,
    /// The failed check trips, blocking the payload.
    FailClosed,
}

/// Retry schedule the pipeline applies to retryable oracle failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per check, including the first; 1 disables retries.
    pub max_attempts: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Exponential backoff multiplier.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to retry delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 250,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A schedule with `max_attempts` total attempts and no jitter.
    #[must_use]
    pub fn attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            jitter: false,
            ..Self::default()
        }
    }

    /// Calculate delay before retry number `attempt` (0-indexed).
    #[must_use]
    #[allow(
        clippy::cast_possible_wrap,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let delay_ms = if self.jitter {
            // up to 25% extra
            base_delay + base_delay * 0.25 * rand_factor()
        } else {
            base_delay
        };
        Duration::from_millis(delay_ms as u64)
    }
}

/// Generate a pseudo-random factor between 0.0 and 1.0.
fn rand_factor() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 1000) / 1000.0
}

/// Pipeline scheduling and failure handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Check scheduling.
    pub mode: ExecutionMode,
    /// Contribution of failed checks.
    pub failure_policy: FailurePolicy,
    /// Retry schedule for retryable oracle errors.
    pub retry: RetryConfig,
    /// Per-call oracle timeout in milliseconds; `None` waits indefinitely.
    pub call_timeout_ms: Option<u64>,
}

impl PipelineConfig {
    /// The per-call timeout as a [`Duration`].
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

/// Everything needed to build a [`Guard`](crate::Guard).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Oracle transport settings.
    pub oracle: OracleConfig,
    /// Pipeline settings shared by both stages.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Texts shown to the user when a stage blocks.
    #[serde(default)]
    pub notices: Notices,
    /// Checks to leave out of the standard catalog (see
    /// [`CheckRegistry::without`](crate::CheckRegistry::without)).
    #[serde(default)]
    pub disabled_checks: Vec<String>,
}

impl GuardConfig {
    /// Default guard settings around an oracle config.
    #[must_use]
    pub fn new(oracle: OracleConfig) -> Self {
        Self {
            oracle,
            pipeline: PipelineConfig {
                call_timeout_ms: Some(30_000),
                ..PipelineConfig::default()
            },
            notices: Notices::default(),
            disabled_checks: Vec::new(),
        }
    }

    /// Read the config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a required variable is missing or the
    /// timeout is not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the config through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new(OracleConfig::from_lookup(&lookup)?);
        if let Some(raw) = lookup(CALL_TIMEOUT_VAR) {
            let secs: u64 = raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(CALL_TIMEOUT_VAR, format!("{e}")))?;
            config.pipeline.call_timeout_ms = (secs > 0).then(|| secs.saturating_mul(1000));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_oracle_config_from_lookup() {
        let config = OracleConfig::from_lookup(lookup(&[
            (API_KEY_VAR, "key-123"),
            (MODEL_VAR, "gemini-2.0-flash"),
        ]))
        .unwrap();

        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.base_url, GEMINI_OPENAI_BASE_URL);
        assert_eq!(
            config.completions_url(),
            format!("{GEMINI_OPENAI_BASE_URL}/chat/completions")
        );
        assert_eq!(config.temperature, 0.0);
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let err = OracleConfig::from_lookup(lookup(&[(MODEL_VAR, "m")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar(API_KEY_VAR.into()));

        let err =
            OracleConfig::from_lookup(lookup(&[(API_KEY_VAR, "k"), (MODEL_VAR, "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::MissingVar(MODEL_VAR.into()));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = OracleConfig::new("http://localhost:8080/v1/", "m", "sk-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert_eq!(config.completions_url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn test_guard_config_timeout_override() {
        let config = GuardConfig::from_lookup(lookup(&[
            (API_KEY_VAR, "k"),
            (MODEL_VAR, "m"),
            (CALL_TIMEOUT_VAR, "5"),
        ]))
        .unwrap();
        assert_eq!(config.pipeline.call_timeout(), Some(Duration::from_secs(5)));

        let err = GuardConfig::from_lookup(lookup(&[
            (API_KEY_VAR, "k"),
            (MODEL_VAR, "m"),
            (CALL_TIMEOUT_VAR, "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_guard_config_defaults() {
        let config = GuardConfig::new(OracleConfig::new("http://x", "m", "k"));
        assert_eq!(config.pipeline.failure_policy, FailurePolicy::FailOpen);
        assert_eq!(config.pipeline.retry.max_attempts, 1);
        assert_eq!(config.pipeline.call_timeout(), Some(Duration::from_secs(30)));
        assert!(config.disabled_checks.is_empty());
    }

    #[test]
    fn test_pipeline_config_deserializes_partially() {
        let config: PipelineConfig = serde_json::from_value(serde_json::json!({
            "mode": { "kind": "sequential" },
            "failure_policy": "fail_closed"
        }))
        .unwrap();
        assert_eq!(config.mode, ExecutionMode::Sequential);
        assert_eq!(config.failure_policy, FailurePolicy::FailClosed);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_retry_config_delay_without_jitter() {
        let config = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            jitter: false,
        };

        assert_eq!(config.delay_for_attempt(0).as_millis(), 1000);
        assert_eq!(config.delay_for_attempt(1).as_millis(), 2000);
        assert_eq!(config.delay_for_attempt(2).as_millis(), 4000);
        assert_eq!(RetryConfig::attempts(0).max_attempts, 1);
    }
}
