//! HTTP surface for the Frontdesk engine.
//!
//! `router` builds the axum application from an [`AppState`]; the binary in
//! `main.rs` wires configuration, adapters and shutdown around it.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{AUTOFILLED_HEADER, EXTRACTED_HEADER, router};
pub use state::{AppState, Components};
