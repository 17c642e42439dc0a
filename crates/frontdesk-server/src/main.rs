use anyhow::Context;
use frontdesk_application::{HandlerRegistry, local_today};
use frontdesk_core::extraction::ExtractionAgent;
use frontdesk_core::session::SessionStore;
use frontdesk_infrastructure::{
    ConfigService, FanoutLedgerSink, JsonlLedgerSink, MemorySessionStore, TracingLedgerSink,
};
use frontdesk_interaction::{HttpFunctionHandler, OpenAIExtractionAgent};
use frontdesk_server::{AppState, Components, router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,frontdesk=debug")),
        )
        .init();

    let config_service = ConfigService::new();
    let config = config_service
        .get_config()
        .context("failed to load configuration")?;
    tracing::debug!(
        "[Server] config loaded from {:?}",
        config_service.config_path().ok()
    );

    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::with_default_channel(
        config.sessions.default_channel,
    ));

    let mut handlers = HandlerRegistry::new();
    match HttpFunctionHandler::from_config(&config.handlers)? {
        Some(handler) => {
            tracing::info!("[Server] forwarding calls to {}", handler.base_url());
            handlers = handlers.with_fallback(Arc::new(handler));
        }
        None => tracing::warn!(
            "[Server] no handlers.base_url configured, valid calls will fail with a handler error"
        ),
    }

    let agent = OpenAIExtractionAgent::from_config(&config.extraction)
        .map(|agent| Arc::new(agent) as Arc<dyn ExtractionAgent>);
    match &agent {
        Some(agent) => tracing::info!("[Server] extraction model: {}", agent.model_name()),
        None => tracing::info!("[Server] extraction model disabled, deterministic extraction only"),
    }

    let mut sink = FanoutLedgerSink::new().with(Arc::new(TracingLedgerSink));
    let mut ledger_writer = None;
    if let Some((jsonl, writer)) = JsonlLedgerSink::from_config(&config.ledger).await? {
        sink = sink.with(Arc::new(jsonl));
        ledger_writer = Some(writer);
    }

    let shutdown = CancellationToken::new();
    let state = AppState::new(
        &config,
        Components {
            store,
            handler: Arc::new(handlers),
            agent,
            sink: Arc::new(sink),
            today: local_today(),
        },
        shutdown.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_address))?;
    tracing::info!("[Server] listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    // The router (and every sink clone) is gone; drain the export queue.
    if let Some(writer) = ledger_writer {
        writer.await??;
    }
    tracing::info!("[Server] stopped");
    Ok(())
}

/// Resolves on Ctrl-C and cancels in-flight model calls.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[Server] failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("[Server] shutting down");
    shutdown.cancel();
}
