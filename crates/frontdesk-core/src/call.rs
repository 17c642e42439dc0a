//! Function-call API types.

use crate::extraction::{ExtractionReport, TranscriptLine};
use crate::params::Params;
use crate::validator::ValidationError;
use serde::{Deserialize, Serialize};

/// Inbound request from the orchestrating model or a channel adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallRequest {
    pub function_name: String,
    #[serde(default)]
    pub parameters: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Transcript supplied by the caller; preferred over the session's own
    /// messages for the extraction fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history: Option<Vec<TranscriptLine>>,
}

impl FunctionCallRequest {
    pub fn new(function_name: impl Into<String>, parameters: Params) -> Self {
        Self {
            function_name: function_name.into(),
            parameters,
            session_id: None,
            conversation_history: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<TranscriptLine>) -> Self {
        self.conversation_history = Some(history);
        self
    }
}

/// Body returned for a validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailureBody {
    pub error: bool,
    pub validation_error: bool,
    #[serde(flatten)]
    pub details: ValidationError,
    pub extraction_attempted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionReport>,
}

impl ValidationFailureBody {
    pub fn new(details: ValidationError, extraction: Option<ExtractionReport>) -> Self {
        Self {
            error: true,
            validation_error: true,
            details,
            extraction_attempted: extraction.as_ref().is_some_and(|r| r.attempted),
            extraction,
        }
    }
}

/// Body returned when a domain handler failed for a valid request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerFailureBody {
    pub error: bool,
    pub handler_error: bool,
    pub function_name: String,
    pub message: String,
}

impl HandlerFailureBody {
    pub fn new(function_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: true,
            handler_error: true,
            function_name: function_name.into(),
            message: message.into(),
        }
    }
}

/// Body returned for unexpected internal failures. The message is generic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemFailureBody {
    pub error: bool,
    pub system_error: bool,
    pub message: String,
}

impl Default for SystemFailureBody {
    fn default() -> Self {
        Self {
            error: true,
            system_error: true,
            message: "An internal error occurred. Please try again later.".to_string(),
        }
    }
}
