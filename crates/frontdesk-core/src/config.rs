//! Runtime configuration model.
//!
//! Loaded from `config.toml` by the infrastructure `ConfigService`. Every
//! section and key is optional; missing values fall back to the defaults
//! below.

use crate::session::Channel;
use serde::{Deserialize, Serialize};

/// Root configuration structure for the config file.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct FrontdeskConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub handlers: HandlersConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Settings for the LLM extraction fallback.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// When false the fallback never calls the model
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// OpenAI-compatible chat completions endpoint
    #[serde(default = "default_provider_url")]
    pub provider_url: String,
    #[serde(default = "default_extraction_model")]
    pub model: String,
    /// Usually supplied through `OPENAI_API_KEY` instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_extraction_timeout_ms")]
    pub timeout_ms: u64,
    /// Number of most recent transcript messages sent to the model
    #[serde(default = "default_transcript_window")]
    pub transcript_window: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider_url: default_provider_url(),
            model: default_extraction_model(),
            api_key: None,
            timeout_ms: default_extraction_timeout_ms(),
            transcript_window: default_transcript_window(),
        }
    }
}

/// Where validated calls are forwarded.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct HandlersConfig {
    /// Base URL of the booking service. Unset means no handler is wired
    /// and every valid call fails with a handler error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_handler_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: default_handler_timeout_ms(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct SessionsConfig {
    /// Channel assigned to sessions created by a function call
    #[serde(default)]
    pub default_channel: Channel,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct LedgerConfig {
    /// Append every call record as a JSON line
    #[serde(default)]
    pub export: bool,
    /// Export file; defaults to `ledger.jsonl` in the data directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_path: Option<String>,
}

fn default_bind_address() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_true() -> bool {
    true
}

fn default_provider_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_extraction_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_extraction_timeout_ms() -> u64 {
    4_000
}

fn default_transcript_window() -> usize {
    12
}

fn default_handler_timeout_ms() -> u64 {
    15_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: FrontdeskConfig = toml::from_str("").unwrap();
        assert_eq!(config, FrontdeskConfig::default());
        assert_eq!(config.server.bind_address, "127.0.0.1:8787");
        assert_eq!(config.extraction.timeout_ms, 4_000);
        assert!(config.extraction.enabled);
    }

    #[test]
    fn test_partial_sections() {
        let config: FrontdeskConfig = toml::from_str(
            r#"
            [extraction]
            model = "gpt-4.1-mini"
            transcript_window = 6

            [handlers]
            base_url = "http://booking.internal:9000/functions"

            [sessions]
            default_channel = "voice"
            "#,
        )
        .unwrap();

        assert_eq!(config.extraction.model, "gpt-4.1-mini");
        assert_eq!(config.extraction.transcript_window, 6);
        assert_eq!(config.extraction.timeout_ms, 4_000);
        assert_eq!(
            config.handlers.base_url.as_deref(),
            Some("http://booking.internal:9000/functions")
        );
        assert_eq!(config.sessions.default_channel, Channel::Voice);
    }
}
