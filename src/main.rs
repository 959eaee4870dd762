use anyhow::Result;
use std::sync::Arc;

mod config;
mod error;
mod logging;
mod routes;
mod services;
mod models;

use services::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::load_config()?;

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    let store = Store::open(&config.database_path)?;
    store.purge_expired_sessions()?;

    // Build our application state
    let addr = config.bind_address();
    let state = Arc::new(AppState::new(config, store));

    let app = routes::router(state);

    // Run it
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

// Application state
pub struct AppState {
    config: config::Config,
    store: Store,
}

impl AppState {
    fn new(config: config::Config, store: Store) -> Self {
        Self { config, store }
    }
}
