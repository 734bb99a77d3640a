//! Tripwire CLI library for auditing text against guardrail checks.
//!
//! This crate renders registries and pipeline results for operators.

pub mod report;

pub use report::{render_checks, render_result};
