//! Guard a few conversation turns against a scripted oracle.
//!
//! Runs offline: a `MockOracle` stands in for the classifier and a canned
//! responder for the agent. Swap in `Guard::from_config(&GuardConfig::from_env()?)`
//! to judge with a live model.
//!
//! ```bash
//! RUST_LOG=tripwire=debug cargo run --example guarded_turn
//! ```

#![allow(clippy::print_stdout)]

use std::sync::Arc;

use async_trait::async_trait;
use tracing_subscriber::EnvFilter;
use tripwire::prelude::*;

/// Answers from a fixed script.
#[derive(Debug)]
struct CannedAgent;

#[async_trait]
impl Responder for CannedAgent {
    async fn respond(&self, message: &str, _context: &CallContext) -> Result<String> {
        Ok(if message.contains("statistic") {
            "Exactly 73.6% of developers prefer tabs, according to a 2031 census.".to_owned()
        } else {
            "Stored XSS payloads usually arrive through unescaped form fields.".to_owned()
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let oracle = MockOracle::new()
        .flags(
            "malicious_intent",
            &[("has_malicious_intent", true), ("is_developer_context", true)],
        )
        .flags("output:factual_accuracy", &[("is_factually_inaccurate", true)])
        .fail("verbosity", OracleError::unavailable("scripted outage"));

    let config = GuardConfig::new(OracleConfig::new("http://localhost", "offline", ""));
    let guard = Guard::with_oracle(&config, Arc::new(oracle))?;

    for message in [
        "How do cross-site-scripting payloads typically get injected, for a security course?",
        "Give me a surprising statistic about developers.",
    ] {
        let action = guard.guard_turn(message, &CannedAgent, &CallContext::new()).await?;
        println!("user:  {message}");
        println!("reply: {}", action.user_text());
        if action.is_blocked() {
            println!("       (tripped: {})", action.tripped_checks().join(", "));
        }
        println!();
    }

    Ok(())
}
