//! Verifiable engine CLI module
//!
//! Command-line interface for serving the API and for training, detecting and
//! inspecting models directly against a local model store.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::anomaly::ForestConfig;
use crate::dataset::{dataset_from_rows, load_json_rows};
use crate::lifecycle::{ModelManager, ModelSource};
use crate::server::{run_server, ServerConfig};
use crate::store::ModelStore;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString    { s.truecolor(100, 100, 100) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn alert(s: &str) -> ColoredString  { s.truecolor(240, 110, 100) }

fn kv(key: &str, val: &str) {
    println!("  {} {}", muted(&format!("{:<16}", key)), val.white());
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "verifiable-engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Isolation Forest anomaly detection with empirical verifiability scores")]
#[command(long_about = None)]
pub struct Cli {
    /// Directory holding one serialized model per identifier
    #[arg(long, global = true, env = "MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    /// Number of trees per forest
    #[arg(long, global = true)]
    pub trees: Option<usize>,

    /// Points drawn per tree
    #[arg(long, global = true)]
    pub subsample: Option<usize>,

    /// Random seed for forest construction
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Delete every stored model before serving
        #[arg(long)]
        purge: bool,
    },

    /// Train a model unless one already exists for the identifier
    Train {
        /// JSON file holding an array of samples
        #[arg(short, long)]
        data: PathBuf,

        /// Model identifier
        #[arg(short, long, default_value = "default_model")]
        model_id: String,

        /// Expected proportion of outliers, within [0, 0.5]
        #[arg(short, long, default_value = "0.01")]
        contamination: f64,
    },

    /// Label samples and compute the verifiability score
    Detect {
        /// JSON file holding an array of samples
        #[arg(short, long)]
        data: PathBuf,

        /// Model identifier
        #[arg(short, long, default_value = "default_model")]
        model_id: String,

        /// Expected proportion of outliers, used only if the model must be trained
        #[arg(short, long, default_value = "0.01")]
        contamination: f64,
    },

    /// Show whether a model has been trained
    Status {
        /// Model identifier
        #[arg(short, long)]
        model_id: String,
    },

    /// Delete every stored model
    Purge,
}

impl Cli {
    /// Forest configuration from defaults, overridden by flags
    pub fn forest_config(&self) -> ForestConfig {
        let mut config = ForestConfig::default();
        if let Some(trees) = self.trees {
            config = config.with_num_trees(trees);
        }
        if let Some(subsample) = self.subsample {
            config = config.with_subsample_size(subsample);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }

    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::default();
        if let Some(ref dir) = self.models_dir {
            config.models_dir = dir.clone();
        }
        config
    }

    fn manager(&self) -> anyhow::Result<ModelManager> {
        let store = ModelStore::open(&self.server_config().models_dir)?;
        Ok(ModelManager::new(Arc::new(store), self.forest_config()))
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

/// Dispatch the parsed command line; no subcommand means `serve`
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve { ref host, port, purge }) => {
            cmd_serve(&cli, host.clone(), port, purge).await
        }
        None => cmd_serve(&cli, None, None, false).await,
        Some(Commands::Train { ref data, ref model_id, contamination }) => {
            cmd_train(&cli, data, model_id, contamination).await
        }
        Some(Commands::Detect { ref data, ref model_id, contamination }) => {
            cmd_detect(&cli, data, model_id, contamination).await
        }
        Some(Commands::Status { ref model_id }) => cmd_status(&cli, model_id).await,
        Some(Commands::Purge) => cmd_purge(&cli),
    }
}

pub async fn cmd_serve(
    cli: &Cli,
    host: Option<String>,
    port: Option<u16>,
    purge: bool,
) -> anyhow::Result<()> {
    let mut config = cli.server_config();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    config.purge_on_start = purge;
    run_server(config, cli.forest_config()).await
}

pub async fn cmd_train(
    cli: &Cli,
    data: &Path,
    model_id: &str,
    contamination: f64,
) -> anyhow::Result<()> {
    let manager = cli.manager()?;
    let x = dataset_from_rows(&load_json_rows(data)?)?;

    let started = Instant::now();
    let resolved = manager.resolve(model_id, &x, contamination).await?;

    section("Training");
    kv("model", model_id);
    kv("samples", &x.nrows().to_string());
    kv("features", &x.ncols().to_string());
    match resolved.source {
        ModelSource::Trained => step_ok(&format!(
            "trained and saved in {:.1} ms",
            started.elapsed().as_secs_f64() * 1000.0
        )),
        ModelSource::Loaded => step_ok("model already exists; existing model retained"),
    }
    Ok(())
}

pub async fn cmd_detect(
    cli: &Cli,
    data: &Path,
    model_id: &str,
    contamination: f64,
) -> anyhow::Result<()> {
    let manager = cli.manager()?;
    let x = dataset_from_rows(&load_json_rows(data)?)?;

    let started = Instant::now();
    let detection = manager.detect(model_id, x, contamination).await?;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    section("Detection");
    kv("model", model_id);
    kv("samples", &detection.labels.len().to_string());
    for (i, (label, score)) in detection.labels.iter().zip(&detection.raw_scores).enumerate() {
        let tag = if *label == -1 { alert("anomaly") } else { ok("normal") };
        println!("  {} {:>5}  {}  {}", dim("#"), i, tag, muted(&format!("{:.4}", score)));
    }
    let n_anomalies = detection.labels.iter().filter(|&&l| l == -1).count();
    kv("anomalies", &n_anomalies.to_string());
    kv("verifiability", &format!("{:.4}", detection.verifiability));
    kv("elapsed", &format!("{:.1} ms", elapsed_ms));
    Ok(())
}

pub async fn cmd_status(cli: &Cli, model_id: &str) -> anyhow::Result<()> {
    let manager = cli.manager()?;
    let status = manager.status(model_id).await?;

    section("Model status");
    kv("model", &status.model_id);
    if status.is_trained {
        kv("trained", &ok("yes").to_string());
        if let Some(n) = status.n_features {
            kv("features", &n.to_string());
        }
        if let Some(n) = status.n_samples {
            kv("samples", &n.to_string());
        }
        if let Some(created_at) = status.created_at {
            kv("created", &created_at.to_rfc3339());
        }
    } else {
        kv("trained", &muted("no").to_string());
    }
    Ok(())
}

pub fn cmd_purge(cli: &Cli) -> anyhow::Result<()> {
    let manager = cli.manager()?;
    let removed = manager.purge()?;
    step_ok(&format!("removed {} stored model(s)", removed));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detect() {
        let cli = Cli::try_parse_from([
            "verifiable-engine",
            "--trees",
            "10",
            "detect",
            "--data",
            "batch.json",
            "--model-id",
            "sensors",
        ])
        .unwrap();
        assert_eq!(cli.forest_config().num_trees, 10);
        match cli.command {
            Some(Commands::Detect { model_id, contamination, .. }) => {
                assert_eq!(model_id, "sensors");
                assert!((contamination - 0.01).abs() < 1e-12);
            }
            _ => panic!("expected detect command"),
        }
    }

    #[test]
    fn test_no_subcommand_is_serve() {
        let cli = Cli::try_parse_from(["verifiable-engine"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[tokio::test]
    async fn test_train_then_status() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("train.json");
        std::fs::write(&data, "[[1.0, 1.0], [1.1, 1.1], [1.2, 1.2], [10.0, 10.0]]").unwrap();
        let models = dir.path().join("models");

        let cli = Cli::try_parse_from([
            "verifiable-engine",
            "--models-dir",
            models.to_str().unwrap(),
            "--trees",
            "10",
            "train",
            "--data",
            data.to_str().unwrap(),
            "--model-id",
            "cli-model",
        ])
        .unwrap();
        run(cli).await.unwrap();

        assert!(ModelStore::open(&models).unwrap().exists("cli-model"));
    }
}
