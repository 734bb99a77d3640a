//! Plain-text reports for operators.
//!
//! Unlike the user-facing [`Action`], these reports include the oracle's
//! reasoning and error detail for every check.

use std::fmt::Write;

use tripwire::guardrail::FieldKind;
use tripwire::{Action, CheckRegistry, PipelineResult, Stage};

/// List the checks of `stage`, or of both stages.
#[must_use]
pub fn render_checks(registry: &CheckRegistry, stage: Option<Stage>) -> String {
    let mut out = String::new();
    let stages = stage.map_or_else(|| Stage::ALL.to_vec(), |s| vec![s]);

    for stage in stages {
        let checks = registry.list(stage);
        let _ = writeln!(out, "{stage} checks ({})", checks.len());
        for check in checks {
            let fields = check
                .fields()
                .iter()
                .map(|f| match f.kind {
                    FieldKind::Bool => format!("{}: bool", f.name),
                    FieldKind::Text => format!("{}: text", f.name),
                    FieldKind::OptionalText => format!("{}: text?", f.name),
                })
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "  {:<18} {fields}", check.name());
        }
    }
    out
}

/// Render the action and per-check diagnostics of one run.
#[must_use]
pub fn render_result(result: &PipelineResult, action: &Action) -> String {
    let mut out = String::new();
    let verdict = if action.is_blocked() { "BLOCKED" } else { "PROCEED" };
    let _ = writeln!(
        out,
        "{} stage: {verdict} ({}ms)",
        result.stage,
        result.elapsed.as_millis()
    );

    for v in &result.verdicts {
        let status = match (&v.error, v.tripped) {
            (Some(_), true) => "FAILED (closed)",
            (Some(_), false) => "FAILED (open)",
            (None, true) => "TRIPPED",
            (None, false) => "pass",
        };
        let _ = write!(out, "  {:<18} {status:<15}", v.check);
        if v.attempts > 1 {
            let _ = write!(out, " after {} attempts", v.attempts);
        }
        if let Some(error) = &v.error {
            let _ = write!(out, " {}", error.message);
        } else if let Some(judgment) = &v.judgment {
            let _ = write!(out, " {}", judgment.reasoning());
        }
        out.push('\n');
    }

    if action.is_blocked() {
        let _ = writeln!(out, "user sees: {}", action.user_text());
    }
    out
}
