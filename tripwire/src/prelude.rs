//! Common imports for guarding an agent.

pub use crate::config::{ExecutionMode, FailurePolicy, GuardConfig, OracleConfig, PipelineConfig};
pub use crate::context::CallContext;
pub use crate::error::{Error, OracleError, Result};
pub use crate::guard::{Guard, Responder};
pub use crate::guardrail::{CheckRegistry, CheckSpec, Judgment, Stage};
pub use crate::oracle::{MockOracle, OpenAiOracle, Oracle, SharedOracle};
pub use crate::pipeline::{PipelineResult, Verdict};
pub use crate::policy::{Action, Notices};
