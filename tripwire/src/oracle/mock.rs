//! Scripted oracles for tests and offline runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::OracleError;
use crate::guardrail::{FieldKind, FieldSpec};

use super::{Oracle, OracleRequest};

#[derive(Debug, Clone)]
enum Script {
    Reply(Value),
    Flags(Vec<(String, bool)>),
    Fail(OracleError),
}

/// An oracle that answers from a script.
///
/// Scripts are keyed by check name, optionally qualified with the stage
/// (`output:toxicity`); the qualified key wins. Checks without a script get
/// a benign reply: every flag `false`, nullable fields `null`.
#[derive(Debug, Clone, Default)]
pub struct MockOracle {
    scripts: HashMap<String, Script>,
    latency: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockOracle {
    /// Create an oracle that passes every check.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `reply` verbatim for `check`.
    #[must_use]
    pub fn reply(mut self, check: impl Into<String>, reply: Value) -> Self {
        self.scripts.insert(check.into(), Script::Reply(reply));
        self
    }

    /// Return a well-formed reply for `check` with the given flags set.
    ///
    /// Unlisted flags are `false`.
    #[must_use]
    pub fn flags(mut self, check: impl Into<String>, flags: &[(&str, bool)]) -> Self {
        let flags = flags
            .iter()
            .map(|(name, value)| ((*name).to_owned(), *value))
            .collect();
        self.scripts.insert(check.into(), Script::Flags(flags));
        self
    }

    /// Fail every call for `check` with `error`.
    #[must_use]
    pub fn fail(mut self, check: impl Into<String>, error: OracleError) -> Self {
        self.scripts.insert(check.into(), Script::Fail(error));
        self
    }

    /// Delay every reply by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls received so far, across clones.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn script_for(&self, request: &OracleRequest<'_>) -> Option<&Script> {
        self.scripts
            .get(&format!("{}:{}", request.stage, request.check))
            .or_else(|| self.scripts.get(request.check))
    }
}

/// Build a reply that satisfies `fields`, with `flags` applied.
fn synthesize(fields: &[FieldSpec], flags: &[(String, bool)]) -> Value {
    let mut reply = Map::new();
    for field in fields {
        let value = match field.kind {
            FieldKind::Bool => Value::Bool(
                flags
                    .iter()
                    .find(|(name, _)| name == field.name)
                    .is_some_and(|(_, value)| *value),
            ),
            FieldKind::Text => Value::String("scripted judgment".into()),
            FieldKind::OptionalText => Value::Null,
        };
        reply.insert(field.name.to_owned(), value);
    }
    Value::Object(reply)
}

#[async_trait]
impl Oracle for MockOracle {
    async fn classify(&self, request: &OracleRequest<'_>) -> Result<Value, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.script_for(request) {
            Some(Script::Reply(reply)) => Ok(reply.clone()),
            Some(Script::Flags(flags)) => Ok(synthesize(request.fields, flags)),
            Some(Script::Fail(error)) => Err(error.clone()),
            None => Ok(synthesize(request.fields, &[])),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// An oracle that is always unavailable.
#[derive(Debug, Clone)]
pub struct FailingOracle {
    error: OracleError,
}

impl FailingOracle {
    /// Fail every call as unavailable with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: OracleError::unavailable(message),
        }
    }

    /// Fail every call with `error`.
    #[must_use]
    pub const fn with_error(error: OracleError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl Oracle for FailingOracle {
    async fn classify(&self, _request: &OracleRequest<'_>) -> Result<Value, OracleError> {
        Err(self.error.clone())
    }

    fn name(&self) -> &str {
        "failing"
    }
}
