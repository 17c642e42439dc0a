//! Outbound adapters: the model used for extraction and the booking service
//! that executes validated calls.

pub mod http_function_handler;
pub mod openai_extraction_agent;

pub use http_function_handler::{HttpFunctionHandler, SESSION_HEADER};
pub use openai_extraction_agent::OpenAIExtractionAgent;
