pub mod call;
pub mod config;
pub mod error;
pub mod extraction;
pub mod handler;
pub mod ledger;
pub mod params;
pub mod resolver;
pub mod schema;
pub mod session;
pub mod validator;

// Re-export common error type
pub use error::{ErrorCategory, FrontdeskError, Result};
