use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{self, WrapErr};
use tracing_subscriber::EnvFilter;

use wavebyol::config::RunConfig;

/// Trains a WaveBYOL pretext model or a downstream classifier on top of one.
#[derive(Parser)]
#[command(name = "train", version, about)]
struct Cli {
    /// Path to the JSON run configuration.
    #[arg(
        long,
        default_value = "./config/T10-urbansound-WaveBYOL-ResNet50-Adam-15200.json"
    )]
    configuration: PathBuf,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!(configuration = %cli.configuration.display(), "loading configuration");
    let config = RunConfig::load(&cli.configuration)
        .wrap_err_with(|| format!("invalid configuration {}", cli.configuration.display()))?;

    let summary = wavebyol::train::run(&config)?;

    tracing::info!(
        best_loss = ?summary.best_loss,
        best_epoch = ?summary.best_epoch,
        checkpoint = ?summary.checkpoint_dir,
        metrics = %summary.metrics_dir.display(),
        "done"
    );

    Ok(())
}
