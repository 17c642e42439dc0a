//! Error types for the Frontdesk engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error category of a call attempt, recorded in the call ledger.
///
/// A validation error means "ask the user". A handler error means the
/// operation failed for a valid request. A system error is never
/// user-fixable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Handler,
    System,
}

/// A shared error type for the entire Frontdesk workspace.
///
/// Parameter-contract and handler failures are call outcomes, not errors;
/// see [`crate::ledger::CallOutcome`].
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum FrontdeskError {
    /// Entity not found error with type information
    #[error("Entity not found: {entity_type} '{id}'")]
    NotFound { entity_type: String, id: String },

    /// Malformed inbound request (not a parameter-contract violation)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal failure (store unavailable, broken invariant)
    #[error("System error: {0}")]
    System(String),
}

impl FrontdeskError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a NotFound error
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.to_string(),
            id: id.into(),
        }
    }

    /// Creates an InvalidInput error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a System error
    pub fn system(message: impl Into<String>) -> Self {
        Self::System(message.into())
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for FrontdeskError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for FrontdeskError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for FrontdeskError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for FrontdeskError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Conversion from anyhow::Error at crate boundaries
impl From<anyhow::Error> for FrontdeskError {
    fn from(err: anyhow::Error) -> Self {
        Self::System(err.to_string())
    }
}

/// A type alias for `Result<T, FrontdeskError>`.
pub type Result<T> = std::result::Result<T, FrontdeskError>;
