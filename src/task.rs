use crate::error::Error;
use crate::metric::MetricsWriter;

pub mod downstream;
pub mod pretext;

/// Progress is logged every this many iterations.
const LOG_INTERVAL: usize = 20;

/// Mean values over one pass of a loader.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    pub loss: f64,
    pub accuracy: Option<f64>,
}

/// Step index shared by all epochs, so per-step curves line up.
pub fn global_step(epoch: usize, num_batches: usize, iteration: usize) -> usize {
    epoch.saturating_sub(1) * num_batches + iteration
}

fn log_progress(phase: &str, epoch: usize, epochs: usize, iteration: usize, num_batches: usize, loss: f64) {
    if iteration % LOG_INTERVAL == 0 || iteration + 1 == num_batches {
        tracing::info!(
            loss,
            "{phase} [ {epoch}/{epochs} epoch - {}/{num_batches} iter ]",
            iteration + 1
        );
    }
}

fn write_scalar(writer: &mut MetricsWriter, tag: &str, value: f64, step: usize) -> Result<(), Error> {
    writer.add_scalar(tag, value, step).map_err(Error::Metrics)
}
