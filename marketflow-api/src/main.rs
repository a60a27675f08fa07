//! Marketflow API Server
//!
//! Runs the ingestion pipeline and serves price queries over HTTP.

mod config;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, Method};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use marketflow_services::{IngestionCoordinator, MemoryCache, QueryEngine, SqliteStore};

use crate::config::Cli;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<IngestionCoordinator>,
    pub query: Arc<QueryEngine>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,marketflow_api=debug")),
        )
        .init();

    let cli = Cli::parse();
    info!("Starting Marketflow API");

    info!("Initializing store at: {}", cli.database_path.display());
    let store = Arc::new(
        SqliteStore::new(&cli.database_path).context("Failed to initialize store")?,
    );
    let cache = Arc::new(MemoryCache::new());

    let coordinator =
        IngestionCoordinator::new(store.clone(), cache.clone(), cli.coordinator_config()?);

    // Stay up when the feeds are down; the mode can be switched over HTTP
    match coordinator.start(cli.mode).await {
        Ok(()) => info!("Ingestion started in {} mode", cli.mode),
        Err(e) => error!("Failed to start ingestion in {} mode: {}", cli.mode, e),
    }

    let state = AppState {
        coordinator: coordinator.clone(),
        query: Arc::new(QueryEngine::new(coordinator.clone(), store, cache)),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let app = routes::router(state).layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.stop_listening().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
