pub mod config_service;
pub mod ledger_sink;
pub mod memory_session_store;
pub mod paths;

pub use crate::config_service::ConfigService;
pub use crate::ledger_sink::{
    FanoutLedgerSink, JsonlLedgerSink, LedgerLine, LedgerWriter, TracingLedgerSink,
};
pub use crate::memory_session_store::MemorySessionStore;
pub use crate::paths::FrontdeskPaths;
