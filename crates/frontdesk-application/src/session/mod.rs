//! Session application services.
//!
//! - `gate`: per-session request serialization (`SessionGate`)

mod gate;

pub use gate::SessionGate;
