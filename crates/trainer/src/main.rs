//! Digest score trainer
//!
//! Batch job: fetch interactions and user preferences, train the click model
//! and publish it to the object store.

use anyhow::{Context, Result};
use clap::Parser;
use digest_score_trainer::{store, Pipeline, PipelineConfig, CONFIG_PATH_ENV};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "digest-train")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train and publish the digest click-prediction model", long_about = None)]
struct Args {
    /// TOML configuration file (overrides DIGEST_SCORE_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging unless RUST_LOG is set
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(config: &PipelineConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if config.log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().compact().with_target(false))
            .init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_sources(Some(path.as_path()), None),
        None => PipelineConfig::load(),
    }
    .with_context(|| format!("Failed to load configuration (see {CONFIG_PATH_ENV})"))?;

    init_logging(&config, args.verbose);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        execution_date = %config.execution_date,
        bucket = %config.gcs_bucket,
        "Starting digest score training"
    );

    let store = store::from_config(&config).context("Failed to initialise object store")?;
    let summary = Pipeline::new(config, store)
        .run()
        .context("Training run failed")?;

    info!(
        model = %summary.model_object,
        hash = %summary.model_hash,
        training_rows = summary.training_rows,
        accuracy = summary.report.accuracy,
        "Training completed"
    );
    Ok(())
}
