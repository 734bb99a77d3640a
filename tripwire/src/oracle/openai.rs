//! OpenAI-compatible chat completions oracle.
//!
//! Works against any endpoint that speaks the chat completions dialect with
//! `response_format: json_schema`, including Gemini's OpenAI-compatible API.

use std::fmt::{self, Write};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::OracleConfig;
use crate::error::{ConfigError, OracleError};
use crate::guardrail::{FieldKind, FieldSpec};

use super::{Oracle, OracleRequest};

/// Classifier oracle backed by an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiOracle {
    client: reqwest::Client,
    config: OracleConfig,
}

impl fmt::Debug for OpenAiOracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiOracle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OpenAiOracle {
    /// Create an oracle from its connection settings.
    ///
    /// The HTTP client carries no timeout of its own; the per-call limit is
    /// enforced by the [`OracleAdapter`](super::OracleAdapter).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the HTTP client cannot be built.
    pub fn new(config: OracleConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tripwire/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::invalid("http_client", e.to_string()))?;
        Ok(Self { client, config })
    }

    /// The oracle's connection settings.
    #[must_use]
    pub const fn config(&self) -> &OracleConfig {
        &self.config
    }

    /// System message: the rubric followed by the reply contract.
    fn system_prompt(request: &OracleRequest<'_>) -> String {
        let mut prompt = request.rubric.trim().to_owned();
        prompt.push_str(
            "\n\nRespond with a single JSON object containing exactly these fields and no others:",
        );
        for field in request.fields {
            let kind = match field.kind {
                FieldKind::Bool => "boolean",
                FieldKind::Text => "string",
                FieldKind::OptionalText => "string or null",
            };
            let _ = write!(prompt, "\n- {} ({kind})", field.name);
        }
        prompt
    }

    fn build_request_body(&self, request: &OracleRequest<'_>) -> Value {
        json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
            "messages": [
                {
                    "role": "system",
                    "content": Self::system_prompt(request),
                },
                {
                    "role": "user",
                    "content": request.payload,
                }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": format!("{}_{}_judgment", request.stage, request.check),
                    "strict": true,
                    "schema": strict_schema(request.json_schema, request.fields),
                }
            }
        })
    }

    /// Parse the judgment JSON, stripping markdown code fences if present.
    fn parse_content(content: &str) -> Result<Value, OracleError> {
        let trimmed = content.trim();

        let json_str = if trimmed.starts_with("```") {
            let without_opening = trimmed
                .strip_prefix("```json")
                .unwrap_or_else(|| trimmed.strip_prefix("```").unwrap_or(trimmed));
            without_opening
                .strip_suffix("```")
                .unwrap_or(without_opening)
                .trim()
        } else {
            trimmed
        };

        serde_json::from_str(json_str).map_err(|e| {
            OracleError::schema_violation(format!(
                "judgment is not valid JSON: {e}. Raw content: {content}"
            ))
        })
    }

    /// Pull the assistant message content out of a chat completions response.
    fn extract_content(response: &Value) -> Result<&str, OracleError> {
        response
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                OracleError::schema_violation(format!("unexpected response format: {response}"))
            })
    }
}

/// Adapt a record schema to strict structured-output rules.
///
/// Strict mode requires every property to be listed as required and no
/// additional properties; nullable fields stay nullable through their type.
fn strict_schema(schema: &Value, fields: &[FieldSpec]) -> Value {
    let mut schema = schema.clone();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
        object.remove("title");
        object.insert("additionalProperties".into(), Value::Bool(false));
        object.insert(
            "required".into(),
            Value::Array(fields.iter().map(|f| Value::from(f.name)).collect()),
        );
    }
    schema
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn classify(&self, request: &OracleRequest<'_>) -> Result<Value, OracleError> {
        let body = self.build_request_body(request);
        let url = self.config.completions_url();

        debug!(
            %url,
            model = %self.config.model,
            check = request.check,
            turn_id = %request.context.turn_id,
            metadata = %request.context.metadata,
            "sending guardrail classification request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, check = request.check, "oracle returned error status");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    OracleError::unavailable(format!("authentication failed (HTTP {status})"))
                }
                _ => OracleError::http_status(status.as_u16(), body),
            });
        }

        let response: Value = response.json().await.map_err(|e| {
            OracleError::schema_violation(format!("failed to parse API response: {e}"))
        })?;

        Self::parse_content(Self::extract_content(&response)?)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}
