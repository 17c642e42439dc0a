//! OpenAIExtractionAgent - structured-output extraction over the OpenAI
//! Chat Completions API.
//!
//! The request carries a strict JSON schema listing exactly the requested
//! fields, so the model can only answer with those keys (or null).

use async_trait::async_trait;
use frontdesk_core::config::ExtractionConfig;
use frontdesk_core::extraction::{ExtractionAgent, ExtractionError, ExtractionRequest};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const SCHEMA_NAME: &str = "slot_extraction";

/// Extraction agent that talks to an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct OpenAIExtractionAgent {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAIExtractionAgent {
    /// Creates a new agent with the provided API key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Builds an agent from configuration. `None` when extraction is
    /// disabled or no API key is configured.
    pub fn from_config(config: &ExtractionConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let api_key = config.api_key.as_deref().filter(|k| !k.trim().is_empty())?;
        Some(Self::new(api_key, config.model.clone()).with_endpoint(config.provider_url.clone()))
    }

    /// Overrides the chat completions endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn build_request(&self, request: &ExtractionRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.instructions(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("Conversation:\n{}", request.transcript_text()),
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: SCHEMA_NAME.to_string(),
                    strict: true,
                    schema: request.response_schema(),
                },
            },
        }
    }

    async fn send_request(&self, body: &ChatCompletionRequest) -> Result<String, ExtractionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|err| ExtractionError::transport(format!("OpenAI API request failed: {err}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read OpenAI error body".to_string());
            return Err(map_http_error(status, body_text));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|err| {
            ExtractionError::malformed(format!("Failed to parse OpenAI response: {err}"))
        })?;

        extract_text_response(parsed)
    }
}

#[async_trait]
impl ExtractionAgent for OpenAIExtractionAgent {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn extract(&self, request: &ExtractionRequest) -> Result<String, ExtractionError> {
        let body = self.build_request(request);
        tracing::debug!(
            "[OpenAIExtractionAgent] {} fields={:?} transcript_lines={}",
            self.model,
            request.field_names(),
            request.transcript.len()
        );
        self.send_request(&body).await
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: Value,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

fn extract_text_response(response: ChatCompletionResponse) -> Result<String, ExtractionError> {
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or(ExtractionError::Empty)?;
    if let Some(refusal) = message.refusal {
        return Err(ExtractionError::malformed(format!("model refused: {refusal}")));
    }
    message
        .content
        .filter(|content| !content.trim().is_empty())
        .ok_or(ExtractionError::Empty)
}

fn map_http_error(status: StatusCode, body: String) -> ExtractionError {
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or(body);
    ExtractionError::transport(format!("OpenAI API returned {}: {}", status.as_u16(), message))
}
