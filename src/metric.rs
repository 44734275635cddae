use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Local time stamp used to name run and checkpoint directories, e.g.
/// `Mar05_14-02-33`.
pub fn setup_timestamp() -> String {
    Local::now().format("%b%d_%H-%M-%S").to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub tag: String,
    pub value: f64,
    pub step: usize,
    pub wall_time: f64,
}

/// Appends scalar events as JSON lines to `<run dir>/scalars.jsonl`.
pub struct MetricsWriter {
    run_dir: PathBuf,
    out: BufWriter<File>,
}

impl MetricsWriter {
    pub const FILE_NAME: &'static str = "scalars.jsonl";

    pub fn create(directory: impl AsRef<Path>, name: &str, timestamp: &str) -> std::io::Result<Self> {
        let run_dir = directory.as_ref().join(format!("{name}-{timestamp}"));
        fs::create_dir_all(&run_dir)?;

        let file = File::options()
            .create(true)
            .append(true)
            .open(run_dir.join(Self::FILE_NAME))?;

        Ok(Self {
            run_dir,
            out: BufWriter::new(file),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> std::io::Result<()> {
        let wall_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();

        let event = ScalarEvent {
            tag: tag.to_string(),
            value,
            step,
            wall_time,
        };

        serde_json::to_writer(&mut self.out, &event)?;
        self.out.write_all(b"\n")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.out.flush()
    }

    pub fn close(mut self) -> std::io::Result<()> {
        self.flush()
    }
}

/// Reads back every event of a run directory.
pub fn read_scalars(run_dir: impl AsRef<Path>) -> std::io::Result<Vec<ScalarEvent>> {
    let text = fs::read_to_string(run_dir.as_ref().join(MetricsWriter::FILE_NAME))?;

    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(std::io::Error::from))
        .collect()
}

/// Running mean of per-step values.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningMean {
    sum: f64,
    count: usize,
}

impl RunningMean {
    pub fn update(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        match self.count {
            0 => 0.0,
            n => self.sum / n as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_event_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MetricsWriter::create(dir.path(), "T10-urbansound", "Jan01_00-00-00").unwrap();
        let run_dir = writer.run_dir().to_path_buf();

        writer.add_scalar("Loss/train_pretext", 1.5, 0).unwrap();
        writer.add_scalar("Loss/train_pretext", 1.25, 1).unwrap();
        writer.close().unwrap();

        assert_eq!(run_dir, dir.path().join("T10-urbansound-Jan01_00-00-00"));
        let events = read_scalars(&run_dir).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].tag, "Loss/train_pretext");
        assert_eq!(events[1].value, 1.25);
        assert_eq!(events[1].step, 1);
    }

    #[test]
    fn timestamp_has_expected_shape() {
        let stamp = setup_timestamp();

        // e.g. Mar05_14-02-33
        assert_eq!(stamp.len(), 14);
        assert_eq!(&stamp[5..6], "_");
    }

    #[test]
    fn running_mean() {
        let mut mean = RunningMean::default();
        assert_eq!(mean.mean(), 0.0);

        [1.0, 2.0, 6.0].into_iter().for_each(|v| mean.update(v));

        assert_eq!(mean.count(), 3);
        assert_eq!(mean.mean(), 3.0);
    }
}
