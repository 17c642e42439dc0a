//! Slot extraction.
//!
//! - `deterministic`: regex rules over a single turn
//! - the LLM fallback contract: [`ExtractionAgent`], [`ExtractionRequest`] and
//!   the strict response parser [`parse_response`]

pub mod deterministic;

pub use deterministic::{DeterministicExtractor, ExtractedFacts};

use crate::schema::{Field, FunctionSchema};
use crate::session::{ConversationMessage, MessageRole};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

/// Failure of the LLM extraction fallback.
///
/// Never fatal: the pipeline surfaces the original validation error with
/// `extractionAttempted` set.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionError {
    #[error("Extraction is disabled")]
    Disabled,

    #[error("Extraction timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Extraction was cancelled")]
    Cancelled,

    #[error("Extraction transport error: {message}")]
    Transport { message: String },

    #[error("Malformed extraction response: {message}")]
    Malformed { message: String },

    #[error("Extraction returned no usable values")]
    Empty,

    #[error("No transcript available for extraction")]
    NoTranscript,
}

impl ExtractionError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// What the fallback did for one request. Reported to the caller and kept
/// in the call ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionReport {
    pub attempted: bool,
    /// Whether the external model was actually called
    pub model_called: bool,
    /// Wire field names that were filled
    pub filled: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExtractionError>,
    /// Whether the second validation passed
    pub revalidated: bool,
}

/// One field the model is asked to extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRequest {
    pub field: Field,
    pub description: String,
    pub format: String,
}

/// One transcript line sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub role: MessageRole,
    pub content: String,
}

impl From<&ConversationMessage> for TranscriptLine {
    fn from(message: &ConversationMessage) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// A request restricted to exactly the still-missing fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub function_name: String,
    pub fields: Vec<FieldRequest>,
    pub transcript: Vec<TranscriptLine>,
    /// Anchors relative dates in the transcript
    pub today: NaiveDate,
}

impl ExtractionRequest {
    /// Builds a request for `fields` over the last `window` transcript lines.
    pub fn new(
        schema: &FunctionSchema,
        fields: &[Field],
        transcript: &[TranscriptLine],
        window: usize,
        today: NaiveDate,
    ) -> Self {
        let start = transcript.len().saturating_sub(window);
        Self {
            function_name: schema.name().to_string(),
            fields: fields
                .iter()
                .map(|field| FieldRequest {
                    field: *field,
                    description: field.description().to_string(),
                    format: schema
                        .rule_for(*field)
                        .map(|rule| rule.format_hint())
                        .unwrap_or("plain text")
                        .to_string(),
                })
                .collect(),
            transcript: transcript[start..].to_vec(),
            today,
        }
    }

    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|f| f.field.name()).collect()
    }

    /// System instruction for the model.
    pub fn instructions(&self) -> String {
        let mut text = String::from(
            "You extract facts a caller stated in a dental front-desk conversation.\n\
             Return a JSON object with exactly the keys listed below.\n\
             Use null for any value the caller did not clearly state. Never guess, \
             never invent ids, never add other keys.\n",
        );
        text.push_str(&format!("Today's date is {}.\n\nFields:\n", self.today));
        for field in &self.fields {
            text.push_str(&format!(
                "- {}: {} (format: {})\n",
                field.field.name(),
                field.description,
                field.format
            ));
        }
        text
    }

    /// The transcript rendered as `role: content` lines.
    pub fn transcript_text(&self) -> String {
        self.transcript
            .iter()
            .map(|line| format!("{}: {}", line.role, line.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Strict JSON schema for structured output: every requested key,
    /// nullable strings, nothing else.
    pub fn response_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| {
                (
                    field.field.name().to_string(),
                    json!({
                        "type": ["string", "null"],
                        "description": format!("{} ({})", field.description, field.format),
                    }),
                )
            })
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": self.field_names(),
            "additionalProperties": false,
        })
    }
}

/// Calls an external structured-output model.
#[async_trait]
pub trait ExtractionAgent: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the raw model output for `request`.
    async fn extract(&self, request: &ExtractionRequest) -> Result<String, ExtractionError>;
}

/// Parses raw model output against `request`.
///
/// Code fences are stripped. Anything that is not a JSON object is
/// malformed. Keys that were not requested are dropped, as are values that
/// fail their field's domain rule. No usable value at all is
/// [`ExtractionError::Empty`].
pub fn parse_response(
    raw: &str,
    request: &ExtractionRequest,
    schema: &FunctionSchema,
) -> Result<BTreeMap<Field, Value>, ExtractionError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(ExtractionError::Empty);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| ExtractionError::malformed(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ExtractionError::malformed("expected a JSON object"));
    };

    let mut filled = BTreeMap::new();
    for (key, value) in object {
        let requested = Field::from_str(&key)
            .ok()
            .filter(|field| request.fields.iter().any(|f| f.field == *field));
        let Some(field) = requested else {
            tracing::debug!("[Extraction] dropping unrequested key '{}'", key);
            continue;
        };
        if !crate::params::is_present(Some(&value)) {
            continue;
        }
        let canonical = match schema.rule_for(field) {
            Some(rule) => rule.canonicalize(&value),
            None => Some(value.clone()),
        };
        match canonical {
            Some(canonical) => {
                filled.insert(field, canonical);
            }
            None => {
                tracing::debug!(
                    "[Extraction] dropping {} value {} that fails its format",
                    field,
                    value
                );
            }
        }
    }

    if filled.is_empty() {
        return Err(ExtractionError::Empty);
    }
    Ok(filled)
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;

    fn request() -> (ExtractionRequest, &'static FunctionSchema) {
        let schema = SchemaRegistry::get("CreatePatient").unwrap();
        let transcript = vec![
            TranscriptLine {
                role: MessageRole::Assistant,
                content: "What's the best number to reach you?".into(),
            },
            TranscriptLine {
                role: MessageRole::User,
                content: "it's six one nine, five five five, twelve thirty-four".into(),
            },
        ];
        let request = ExtractionRequest::new(
            schema,
            &[Field::WirelessPhone],
            &transcript,
            12,
            NaiveDate::from_ymd_opt(2025, 12, 3).unwrap(),
        );
        (request, schema)
    }

    #[test]
    fn test_request_is_restricted_to_missing_fields() {
        let (request, _) = request();
        assert_eq!(request.field_names(), vec!["WirelessPhone"]);
        let schema = request.response_schema();
        assert_eq!(schema["required"], json!(["WirelessPhone"]));
        assert_eq!(schema["additionalProperties"], json!(false));
        assert!(request.instructions().contains("WirelessPhone"));
        assert!(request.transcript_text().starts_with("assistant: "));
    }

    #[test]
    fn test_transcript_window() {
        let schema = SchemaRegistry::get("CreatePatient").unwrap();
        let transcript: Vec<TranscriptLine> = (0..20)
            .map(|i| TranscriptLine {
                role: MessageRole::User,
                content: format!("line {}", i),
            })
            .collect();
        let request = ExtractionRequest::new(
            schema,
            &[Field::FName],
            &transcript,
            5,
            NaiveDate::from_ymd_opt(2025, 12, 3).unwrap(),
        );
        assert_eq!(request.transcript.len(), 5);
        assert_eq!(request.transcript[0].content, "line 15");
    }

    #[test]
    fn test_parse_normalizes_and_drops_unrequested_keys() {
        let (request, schema) = request();
        let filled = parse_response(
            "```json\n{\"WirelessPhone\": \"619-555-1234\", \"PatNum\": \"99\"}\n```",
            &request,
            schema,
        )
        .unwrap();
        assert_eq!(filled.len(), 1);
        assert_eq!(filled[&Field::WirelessPhone], json!("6195551234"));
    }

    #[test]
    fn test_parse_failures() {
        let (request, schema) = request();
        assert!(matches!(
            parse_response("sure! the number is 6195551234", &request, schema),
            Err(ExtractionError::Malformed { .. })
        ));
        assert_eq!(
            parse_response("{\"WirelessPhone\": null}", &request, schema),
            Err(ExtractionError::Empty)
        );
        assert_eq!(
            parse_response("{\"WirelessPhone\": \"555-1234\"}", &request, schema),
            Err(ExtractionError::Empty)
        );
        assert_eq!(parse_response("  ", &request, schema), Err(ExtractionError::Empty));
    }
}
