use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre;
use tracing_subscriber::EnvFilter;

use wavebyol::convert::{flac_to_wav, FlacToWavOptions};

/// Converts every FLAC file below a directory into a WAV file next to it.
#[derive(Parser)]
#[command(name = "flac-to-wav", version, about)]
struct Cli {
    /// Directory searched recursively for `.flac` files.
    dir: PathBuf,
    /// Resample to this rate (Hz) instead of keeping the source rate.
    #[arg(long)]
    sample_rate: Option<u32>,
    /// Replace WAV files that already exist.
    #[arg(long)]
    overwrite: bool,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let options = FlacToWavOptions {
        sample_rate: cli.sample_rate,
        overwrite: cli.overwrite,
    };

    let report = flac_to_wav(&cli.dir, &options)?;

    for failure in &report.failures {
        tracing::error!(path = %failure.path.display(), error = %failure.error, "not converted");
    }

    if !report.is_success() {
        eyre::bail!(
            "{} of {} files failed to convert",
            report.failures.len(),
            report.failures.len() + report.converted.len() + report.skipped.len()
        );
    }

    Ok(())
}
