#![cfg_attr(docsrs, feature(doc_cfg))]
//! Tripwire is an input/output guardrail layer for conversational agents.
//!
//! Every user message is judged by a set of input checks before the agent
//! sees it, and every candidate response by a set of output checks before
//! the user sees it. Each check asks an LLM classifier (the *oracle*) for a
//! structured judgment and reduces it to a single trip decision. A stage
//! blocks if any of its checks trips.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tripwire::prelude::*;
//!
//! let guard = Guard::from_config(&GuardConfig::from_env()?)?;
//! let ctx = CallContext::new();
//!
//! match guard.run_input_pipeline("How does XSS work?", &ctx).await? {
//!     Action::Proceed { payload } => { /* call the agent */ }
//!     blocked => println!("{}", blocked.user_text()),
//! }
//! ```
//!
//! See the `guarded_turn` example for a full turn with [`Guard::guard_turn`].

pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod guardrail;
pub mod oracle;
pub mod pipeline;
pub mod policy;
pub mod prelude;
pub mod telemetry;

pub use config::{ExecutionMode, FailurePolicy, GuardConfig, OracleConfig, PipelineConfig, RetryConfig};
pub use context::CallContext;
pub use error::{Error, Result};
pub use guard::{Guard, Responder};
pub use guardrail::{CheckRegistry, CheckSpec, Judgment, JudgmentRecord, Stage};
pub use oracle::{Oracle, OracleAdapter, SharedOracle};
pub use pipeline::{Pipeline, PipelineResult, Verdict};
pub use policy::{Action, Notices};
