//! Guardrail checks: the catalog of LLM-judged policy checks.
//!
//! A guardrail check pairs a natural-language rubric with a concrete judgment
//! record the classifier oracle must fill in, and a pure decision function
//! that maps that record to a tripwire verdict.
//!
//! Checks are grouped into two [`Stage`]s:
//!
//! - **Input** checks run against the raw user message before the main agent
//!   is invoked (see [`input`]).
//! - **Output** checks run against the agent's candidate response before it is
//!   shown to the user (see [`output`]).
//!
//! # Judgment Records
//!
//! Every check declares one record type implementing [`JudgmentRecord`]. The
//! record's [`FIELDS`](JudgmentRecord::FIELDS) list is the exact reply contract:
//! a reply missing a field, carrying an unknown one, or using the wrong type is
//! a schema violation and never becomes a [`Judgment`].
//!
//! # Developer-Context Exemption
//!
//! Most checks ask the oracle to classify two things in one round trip: whether
//! the primary concern is present, and whether the surrounding text is
//! legitimate technical or educational discourse. Such checks trip iff
//! `<flag> && !is_developer_context`.

use std::fmt;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::OracleError;

/// Declare a judgment record that trips iff `<flag> && !is_developer_context`.
macro_rules! developer_exempt_record {
    ($(#[$meta:meta])* $record:ident, $flag:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
        #[serde(deny_unknown_fields)]
        pub struct $record {
            /// Whether the primary concern is present.
            pub $flag: bool,
            /// Whether the text is legitimate technical or developer discourse.
            pub is_developer_context: bool,
            /// The oracle's explanation.
            pub reasoning: String,
        }

        impl $crate::guardrail::JudgmentRecord for $record {
            const FIELDS: &'static [$crate::guardrail::FieldSpec] = &[
                $crate::guardrail::FieldSpec::flag(stringify!($flag)),
                $crate::guardrail::FieldSpec::flag("is_developer_context"),
                $crate::guardrail::FieldSpec::text("reasoning"),
            ];

            fn trips(&self) -> bool {
                self.$flag && !self.is_developer_context
            }

            fn reasoning(&self) -> &str {
                &self.reasoning
            }
        }
    };
}

pub mod input;
pub mod output;
mod registry;

pub use registry::CheckRegistry;

/// The boundary of the conversation a check guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// The raw user message, before the main agent runs.
    Input,
    /// The main agent's candidate response, before the user sees it.
    Output,
}

impl Stage {
    /// Both stages, in conversational order.
    pub const ALL: [Self; 2] = [Self::Input, Self::Output];

    /// Lowercase stage name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a single judgment field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A boolean flag.
    Bool,
    /// A required string.
    Text,
    /// A string that must be present but may be `null`.
    OptionalText,
}

/// One named, typed field of a judgment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    /// Field name as it appears in the oracle reply.
    pub name: &'static str,
    /// Field type.
    pub kind: FieldKind,
}

impl FieldSpec {
    /// A boolean flag field.
    #[must_use]
    pub const fn flag(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Bool,
        }
    }

    /// A required text field.
    #[must_use]
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
        }
    }

    /// A nullable text field.
    #[must_use]
    pub const fn optional_text(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::OptionalText,
        }
    }
}

/// A concrete judgment record the oracle must return for one check.
///
/// Implementors should use `#[serde(deny_unknown_fields)]` and list every
/// serialized field in [`FIELDS`](Self::FIELDS), in declaration order.
pub trait JudgmentRecord:
    Serialize + DeserializeOwned + JsonSchema + Send + Sync + 'static
{
    /// The exhaustive field list of this record.
    const FIELDS: &'static [FieldSpec];

    /// Whether this judgment trips the check.
    ///
    /// Must depend only on the record's own fields.
    fn trips(&self) -> bool;

    /// The oracle's free-text reasoning.
    fn reasoning(&self) -> &str;
}

/// A validated oracle judgment for one check.
///
/// Produced by [`CheckSpec::parse`] or [`Judgment::from_record`], so every
/// field of the check's record is present with the right type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Judgment {
    fields: Map<String, Value>,
}

impl Judgment {
    /// Build a judgment from a typed record.
    ///
    /// # Errors
    ///
    /// Returns a schema violation if the record does not serialize to an object.
    pub fn from_record<T: JudgmentRecord>(record: &T) -> Result<Self, OracleError> {
        match serde_json::to_value(record) {
            Ok(Value::Object(fields)) => Ok(Self { fields }),
            Ok(other) => Err(OracleError::schema_violation(format!(
                "judgment record serialized to {other}, expected an object"
            ))),
            Err(e) => Err(OracleError::schema_violation(e.to_string())),
        }
    }

    /// Read a boolean field.
    #[must_use]
    pub fn flag(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(Value::as_bool)
    }

    /// Read a text field. Returns `None` for absent or `null` fields.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// The oracle's reasoning, or an empty string if the record has none.
    #[must_use]
    pub fn reasoning(&self) -> &str {
        self.text("reasoning").unwrap_or_default()
    }

    /// All fields of the judgment.
    #[must_use]
    pub const fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Decode the judgment back into a typed record.
    #[must_use]
    pub fn record<T: JudgmentRecord>(&self) -> Option<T> {
        serde_json::from_value(Value::Object(self.fields.clone())).ok()
    }
}

/// Parse a raw oracle reply as record `T`.
fn parse_record<T: JudgmentRecord>(raw: &Value) -> Result<Judgment, OracleError> {
    let Some(object) = raw.as_object() else {
        return Err(OracleError::schema_violation(format!(
            "expected a JSON object, got {raw}"
        )));
    };

    if let Some(missing) = T::FIELDS.iter().find(|f| !object.contains_key(f.name)) {
        return Err(OracleError::schema_violation(format!(
            "missing field `{}`",
            missing.name
        )));
    }

    let record: T = serde_json::from_value(raw.clone())
        .map_err(|e| OracleError::schema_violation(e.to_string()))?;
    Judgment::from_record(&record)
}

/// Apply record `T`'s decision function to a judgment.
///
/// A judgment that does not decode as `T` never trips.
fn decide_record<T: JudgmentRecord>(judgment: &Judgment) -> bool {
    judgment.record::<T>().is_some_and(|record| record.trips())
}

/// An immutable, named guardrail check.
///
/// Cheap to clone; the definition is shared behind an [`Arc`].
#[derive(Clone)]
pub struct CheckSpec {
    inner: Arc<CheckDefinition>,
}

struct CheckDefinition {
    name: String,
    rubric: String,
    fields: &'static [FieldSpec],
    json_schema: Value,
    parse: fn(&Value) -> Result<Judgment, OracleError>,
    decide: fn(&Judgment) -> bool,
}

impl CheckSpec {
    /// Define a check whose oracle reply is record `T`.
    #[must_use]
    pub fn new<T: JudgmentRecord>(name: impl Into<String>, rubric: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(CheckDefinition {
                name: name.into(),
                rubric: rubric.into(),
                fields: T::FIELDS,
                json_schema: schemars::schema_for!(T).to_value(),
                parse: parse_record::<T>,
                decide: decide_record::<T>,
            }),
        }
    }

    /// Unique name of this check within its stage.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Operating instructions for the oracle.
    #[must_use]
    pub fn rubric(&self) -> &str {
        &self.inner.rubric
    }

    /// Exhaustive field list the oracle must return.
    #[must_use]
    pub fn fields(&self) -> &'static [FieldSpec] {
        self.inner.fields
    }

    /// JSON Schema of the judgment record.
    #[must_use]
    pub fn json_schema(&self) -> &Value {
        &self.inner.json_schema
    }

    /// Validate a raw oracle reply against this check's record.
    ///
    /// # Errors
    ///
    /// Returns a schema violation on a missing, unknown or mistyped field.
    pub fn parse(&self, raw: &Value) -> Result<Judgment, OracleError> {
        (self.inner.parse)(raw).map_err(|e| e.for_check(self.name()))
    }

    /// Decide whether a judgment trips this check.
    #[must_use]
    pub fn decide(&self, judgment: &Judgment) -> bool {
        (self.inner.decide)(judgment)
    }
}

impl fmt::Debug for CheckSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckSpec")
            .field("name", &self.inner.name)
            .field("fields", &self.inner.fields)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::OracleErrorKind;
    use crate::guardrail::output::{PiiJudgment, SensitiveTopicJudgment};

    fn pii_check() -> CheckSpec {
        CheckSpec::new::<PiiJudgment>("pii", "Detect personal data.")
    }

    #[test]
    fn test_parse_valid_reply() {
        let judgment = pii_check()
            .parse(&json!({
                "contains_pii": true,
                "is_developer_context": false,
                "reasoning": "Contains a phone number"
            }))
            .unwrap();

        assert_eq!(judgment.flag("contains_pii"), Some(true));
        assert_eq!(judgment.flag("is_developer_context"), Some(false));
        assert_eq!(judgment.reasoning(), "Contains a phone number");
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        let err = pii_check()
            .parse(&json!({ "contains_pii": true, "reasoning": "x" }))
            .unwrap_err();
        assert_eq!(err.kind, OracleErrorKind::SchemaViolation);
        assert_eq!(err.check.as_deref(), Some("pii"));
        assert!(err.message.contains("is_developer_context"));
    }

    #[test]
    fn test_parse_rejects_unknown_field() {
        let err = pii_check()
            .parse(&json!({
                "contains_pii": false,
                "is_developer_context": false,
                "reasoning": "none",
                "confidence": 0.9
            }))
            .unwrap_err();
        assert_eq!(err.kind, OracleErrorKind::SchemaViolation);
    }

    #[test]
    fn test_parse_rejects_wrong_type() {
        let err = pii_check()
            .parse(&json!({
                "contains_pii": "yes",
                "is_developer_context": false,
                "reasoning": "none"
            }))
            .unwrap_err();
        assert_eq!(err.kind, OracleErrorKind::SchemaViolation);

        let err = pii_check().parse(&json!("not an object")).unwrap_err();
        assert_eq!(err.kind, OracleErrorKind::SchemaViolation);
    }

    #[test]
    fn test_optional_field_must_be_present_but_may_be_null() {
        let check = CheckSpec::new::<SensitiveTopicJudgment>("sensitive_topic", "rubric");

        let judgment = check
            .parse(&json!({
                "is_sensitive": true,
                "is_developer_context": false,
                "topic_category": null,
                "reasoning": "politics"
            }))
            .unwrap();
        assert_eq!(judgment.text("topic_category"), None);
        assert!(check.decide(&judgment));

        let err = check
            .parse(&json!({
                "is_sensitive": true,
                "is_developer_context": false,
                "reasoning": "politics"
            }))
            .unwrap_err();
        assert!(err.message.contains("topic_category"));
    }

    #[test]
    fn test_decide_on_foreign_judgment_never_trips() {
        let topic = CheckSpec::new::<SensitiveTopicJudgment>("sensitive_topic", "rubric");
        let judgment = pii_check()
            .parse(&json!({
                "contains_pii": true,
                "is_developer_context": false,
                "reasoning": "email address"
            }))
            .unwrap();
        assert!(!topic.decide(&judgment));
    }

    #[test]
    fn test_fields_match_json_schema_properties() {
        let check = pii_check();
        let properties = check.json_schema()["properties"].as_object().unwrap();
        assert_eq!(properties.len(), check.fields().len());
        for field in check.fields() {
            assert!(properties.contains_key(field.name), "{}", field.name);
        }
    }

    #[test]
    fn test_stage_display_and_serde() {
        assert_eq!(Stage::Input.to_string(), "input");
        assert_eq!(serde_json::to_value(Stage::Output).unwrap(), json!("output"));
        let stage: Stage = serde_json::from_value(json!("input")).unwrap();
        assert_eq!(stage, Stage::Input);
    }
}
