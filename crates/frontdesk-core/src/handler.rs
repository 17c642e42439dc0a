//! Domain handler interface.
//!
//! The booking operations themselves live outside this engine. A handler is
//! only invoked with parameters that passed validation.

use crate::params::Params;
use crate::schema::FunctionCall;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure of a domain operation for a valid request.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HandlerError {
    #[error("No handler registered for {function_name}")]
    NotRegistered { function_name: String },

    #[error("{message}")]
    Failed { message: String },

    #[error("Handler transport error: {message}")]
    Transport { message: String },

    #[error("Handler rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Everything a handler receives for one validated call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerInvocation {
    pub function_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Canonical parameters (typed call serialization for registered
    /// functions, the caller's bag otherwise)
    pub parameters: Params,
    #[serde(skip)]
    pub call: Option<FunctionCall>,
}

/// A booking operation.
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    /// Runs the operation and returns its raw result, which is passed back to
    /// the caller unmodified.
    async fn handle(&self, invocation: &HandlerInvocation) -> Result<Value, HandlerError>;
}
