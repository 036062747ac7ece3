//! CreditLedger Server Binary
//!
//! Serves the ledger over HTTP, backed by PostgreSQL or the in-memory store.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use creditledger_ledger::{LedgerStore, MemoryStore, PostgresStore, TransactionEngine};
use creditledger_server::config::default_clients;
use creditledger_server::{http, LedgerService, ServerConfig, StoreBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting CreditLedger server");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let store: Arc<dyn LedgerStore> = match config.store {
        StoreBackend::Postgres => {
            let store = PostgresStore::connect(&config.pg_settings()).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::with_clients(default_clients())?),
    };
    info!(backend = ?config.store, "Store ready");

    let engine = TransactionEngine::new(store, config.engine_config());
    let service = Arc::new(LedgerService::new(engine));
    service.start();

    let listener =
        tokio::net::TcpListener::bind((config.listen_addr.as_str(), config.listen_port)).await?;
    info!(
        listen_addr = %config.listen_addr,
        listen_port = %config.listen_port,
        "Server listening"
    );

    let shutdown_service = service.clone();
    axum::serve(listener, http::router(service.clone()))
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
            shutdown_service.stop().await;
        })
        .await?;

    // No-op when the signal handler already stopped the service.
    service.stop().await;

    info!("Server shutdown complete");
    Ok(())
}
