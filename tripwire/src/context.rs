//! Per-turn call context passed to every guardrail run.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Context for one conversation turn.
///
/// Cloning shares the cancellation token, so cancelling any clone abandons
/// every in-flight oracle call of the turn.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Identifier of the turn, attached to every log line.
    pub turn_id: Uuid,
    /// Custom metadata recorded on every oracle call's debug event.
    pub metadata: serde_json::Value,
    cancel: CancellationToken,
}

impl CallContext {
    /// Create a context for a new turn.
    #[must_use]
    pub fn new() -> Self {
        Self {
            turn_id: Uuid::new_v4(),
            metadata: serde_json::Value::Null,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the turn identifier.
    #[must_use]
    pub const fn with_turn_id(mut self, turn_id: Uuid) -> Self {
        self.turn_id = turn_id;
        self
    }

    /// Set custom metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Tie this turn to an externally owned token, e.g. a connection's.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Cancel the turn.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once the turn has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The turn's cancellation token.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}
