//! HTTP server module
//!
//! Exposes training, detection and model status over a JSON REST API.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use handlers::{AnomalyDetectionOutput, TrainingResult};
pub use state::AppState;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::anomaly::ForestConfig;
use crate::lifecycle::ModelManager;
use crate::store::ModelStore;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub models_dir: PathBuf,
    /// Delete every stored model before accepting requests
    pub purge_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8000),
            models_dir: std::env::var("MODELS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./models")),
            purge_on_start: false,
        }
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig, forest_config: ForestConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    info!(
        models_dir = %config.models_dir.display(),
        started_at = %start_time.to_rfc3339(),
        "Opening model store"
    );

    let store = Arc::new(ModelStore::open(&config.models_dir)?);
    if config.purge_on_start {
        let removed = store.purge()?;
        info!(removed, "Purged stored models on startup");
    }

    let manager = Arc::new(ModelManager::new(store, forest_config));
    let state = Arc::new(AppState::new(config.clone(), manager));
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        address = %addr,
        num_trees = forest_config.num_trees,
        subsample_size = forest_config.subsample_size,
        seed = forest_config.seed,
        "Verifiable engine server starting"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
        let stop_time = chrono::Utc::now();
        let uptime = stop_time.signed_duration_since(start_time);
        info!(
            stopped_at = %stop_time.to_rfc3339(),
            uptime_secs = uptime.num_seconds(),
            "Shutdown signal received, stopping server gracefully"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
