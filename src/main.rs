//! Verifiable Engine - Main Entry Point

use clap::Parser;
use verifiable_engine::cli::{run, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "verifiable_engine=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    run(cli).await
}
