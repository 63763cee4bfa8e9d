//! Tokenpay Service - HTTP API for token package checkout and settlement
//!
//! This is the main entry point for the tokenpay service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokenpay_service::{create_router, AppState, ServiceConfig, StoreConfig, StripeClient};
use tokenpay_store::{MemoryStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    tracing::info!("Starting Tokenpay Service");

    // Load configuration from environment; missing settings abort startup
    let config = ServiceConfig::from_env().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        base_url = %config.base_url,
        store = config.store.backend_name(),
        packages = config.prices.len(),
        "Service configuration loaded"
    );

    let store = open_store(&config).await?;
    let stripe = Arc::new(StripeClient::new(
        config.stripe_api_key.clone(),
        config.stripe_api_base.clone(),
    )?);

    // Build app state
    let state = AppState::new(config.clone(), store, stripe);

    // Create the router
    let app = create_router(state);

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Initialize tracing; `LOG_FORMAT=json` selects structured JSON output.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tokenpay=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Open the configured storage backend.
async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    match &config.store {
        #[cfg(feature = "rocksdb-backend")]
        StoreConfig::RocksDb { data_dir } => {
            tracing::info!(path = %data_dir, "Opening RocksDB store");
            let store = tokenpay_store::RocksStore::open(data_dir)?
                .with_max_retries(config.store_max_retries);
            Ok(Arc::new(store))
        }
        #[cfg(feature = "postgres-backend")]
        StoreConfig::Postgres { database_url } => {
            tracing::info!("Connecting to PostgreSQL store");
            let store = tokenpay_store::PgStore::connect(
                database_url,
                std::time::Duration::from_secs(config.store_timeout_seconds),
            )
            .await?
            .with_max_retries(config.store_max_retries);
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory store - balances are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[allow(unreachable_patterns)]
        other => Err(format!(
            "store backend {} is not compiled into this binary",
            other.backend_name()
        )
        .into()),
    }
}
