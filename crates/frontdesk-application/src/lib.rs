//! Application layer for Frontdesk.
//!
//! This crate provides the use cases that coordinate the domain rules in
//! `frontdesk-core` with the store, model and handler adapters supplied by
//! the outer layers.

pub mod extraction_fallback;
pub mod function_call_usecase;
pub mod handler_registry;
pub mod message_ingestion;
pub mod session;

pub use extraction_fallback::{ExtractionFallback, FallbackInput};
pub use function_call_usecase::{FunctionCallResponse, FunctionCallUseCase};
pub use handler_registry::HandlerRegistry;
pub use message_ingestion::{InboundMessage, IngestionReport, MessageIngestionUseCase};
pub use session::SessionGate;

use chrono::NaiveDate;
use std::sync::Arc;

/// Source of the current date, used to anchor relative dates in messages.
pub type Today = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// The local calendar date.
pub fn local_today() -> Today {
    Arc::new(|| chrono::Local::now().date_naive())
}
