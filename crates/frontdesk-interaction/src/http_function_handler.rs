//! HttpFunctionHandler - forwards validated calls to the booking service.
//!
//! Each call becomes `POST {base_url}/{functionName}` with the canonical
//! parameters as the JSON body. The response body is returned as-is.

use async_trait::async_trait;
use frontdesk_core::config::HandlersConfig;
use frontdesk_core::handler::{FunctionHandler, HandlerError, HandlerInvocation};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub const SESSION_HEADER: &str = "x-session-id";

/// Function handler backed by an HTTP booking service.
#[derive(Clone)]
pub struct HttpFunctionHandler {
    client: Client,
    base_url: String,
}

impl HttpFunctionHandler {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, HandlerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HandlerError::transport(format!("Failed to build HTTP client: {e}")))?;
        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `None` when no booking service is configured.
    pub fn from_config(config: &HandlersConfig) -> Result<Option<Self>, HandlerError> {
        match config.base_url.as_deref().filter(|url| !url.trim().is_empty()) {
            Some(url) => Self::new(url, Duration::from_millis(config.timeout_ms)).map(Some),
            None => Ok(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, function_name: &str) -> String {
        format!("{}/{}", self.base_url, function_name)
    }
}

#[async_trait]
impl FunctionHandler for HttpFunctionHandler {
    async fn handle(&self, invocation: &HandlerInvocation) -> Result<Value, HandlerError> {
        let url = self.endpoint(&invocation.function_name);
        tracing::debug!("[HttpFunctionHandler] POST {}", url);

        let mut request = self.client.post(&url).json(&invocation.parameters);
        if let Some(session_id) = &invocation.session_id {
            request = request.header(SESSION_HEADER, session_id);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                HandlerError::transport(format!("{} timed out", invocation.function_name))
            } else {
                HandlerError::transport(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HandlerError::transport(format!("Failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(map_http_error(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| HandlerError::failed(format!("Booking service returned invalid JSON: {e}")))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(alias = "error")]
    message: String,
}

fn map_http_error(status: StatusCode, body: &str) -> HandlerError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                trimmed.to_string()
            }
        });
    HandlerError::Rejected {
        status: status.as_u16(),
        message,
    }
}
