//! Shared handler state and its wiring.

use frontdesk_application::{
    ExtractionFallback, FunctionCallUseCase, MessageIngestionUseCase, SessionGate, Today,
};
use frontdesk_core::config::FrontdeskConfig;
use frontdesk_core::extraction::ExtractionAgent;
use frontdesk_core::handler::FunctionHandler;
use frontdesk_core::ledger::LedgerSink;
use frontdesk_core::session::SessionStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Collaborators the server is assembled from.
pub struct Components {
    pub store: Arc<dyn SessionStore>,
    pub handler: Arc<dyn FunctionHandler>,
    pub agent: Option<Arc<dyn ExtractionAgent>>,
    pub sink: Arc<dyn LedgerSink>,
    pub today: Today,
}

#[derive(Clone)]
pub struct AppState {
    pub function_calls: Arc<FunctionCallUseCase>,
    pub ingestion: Arc<MessageIngestionUseCase>,
    pub store: Arc<dyn SessionStore>,
    /// Parent of every per-request cancellation token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: &FrontdeskConfig, components: Components, shutdown: CancellationToken) -> Self {
        let Components {
            store,
            handler,
            agent,
            sink,
            today,
        } = components;

        // Ingestion and function calls share one gate so a turn and a call
        // for the same session never interleave.
        let gate = Arc::new(SessionGate::new());
        let fallback = ExtractionFallback::new(store.clone(), agent, config.extraction.clone());
        let function_calls = FunctionCallUseCase::new(
            store.clone(),
            gate.clone(),
            handler,
            fallback,
            sink,
            today.clone(),
        );
        let ingestion = MessageIngestionUseCase::new(store.clone(), gate, today);

        Self {
            function_calls: Arc::new(function_calls),
            ingestion: Arc::new(ingestion),
            store,
            shutdown,
        }
    }
}
