//! Input-stage checks.
//!
//! Input checks judge the raw user message before the main agent is invoked,
//! so a tripped check costs one classifier round trip instead of a full agent
//! run.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{CheckSpec, FieldSpec, JudgmentRecord};

/// Name of the input toxicity check.
pub const TOXICITY: &str = "toxicity";

/// Name of the malicious intent check.
pub const MALICIOUS_INTENT: &str = "malicious_intent";

const TOXICITY_RUBRIC: &str = "\
Determine whether the user input contains toxic or harmful language such as \
hate speech, abuse, harassment or threats.

Technical context is never toxic: developer documentation, log excerpts, \
stack traces and programming language syntax may use strong wording in a \
neutral sense and must not be flagged.

Return:
- is_toxic: true only for genuinely toxic language.
- reasoning: a short explanation of the judgment.";

const MALICIOUS_INTENT_RUBRIC: &str = "\
Evaluate whether the user input shows actual malicious intent, or is part of \
a legitimate educational, professional or security-research inquiry.

Legitimate inputs (do not block):
- \"How does XSS work?\" (developer education)
- \"What are common vulnerabilities in JWTs?\" (security learning)
- \"Can I report a vulnerability?\" (responsible disclosure)

Malicious inputs (block):
- \"How can I bypass login on this site?\"
- \"Write a script to steal credentials\"

Return:
- has_malicious_intent: true if the request could be used to cause harm.
- is_developer_context: true if the request is educational, defensive or \
otherwise legitimate technical discourse.
- reasoning: a short explanation of the judgment.";

/// Judgment returned by the input toxicity check.
///
/// The technical-context carve-out lives in the rubric, so there is no
/// separate exemption flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct InputToxicityJudgment {
    /// Whether the message is toxic.
    pub is_toxic: bool,
    /// The oracle's explanation.
    pub reasoning: String,
}

impl JudgmentRecord for InputToxicityJudgment {
    const FIELDS: &'static [FieldSpec] = &[FieldSpec::flag("is_toxic"), FieldSpec::text("reasoning")];

    fn trips(&self) -> bool {
        self.is_toxic
    }

    fn reasoning(&self) -> &str {
        &self.reasoning
    }
}

developer_exempt_record!(
    /// Judgment returned by the malicious intent check.
    MaliciousIntentJudgment,
    has_malicious_intent
);

/// Toxic or abusive user language.
#[must_use]
pub fn toxicity() -> CheckSpec {
    CheckSpec::new::<InputToxicityJudgment>(TOXICITY, TOXICITY_RUBRIC)
}

/// Requests with genuine intent to cause harm.
#[must_use]
pub fn malicious_intent() -> CheckSpec {
    CheckSpec::new::<MaliciousIntentJudgment>(MALICIOUS_INTENT, MALICIOUS_INTENT_RUBRIC)
}

/// All standard input checks, in registration order.
#[must_use]
pub fn standard() -> Vec<CheckSpec> {
    vec![toxicity(), malicious_intent()]
}
