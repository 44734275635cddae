use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{AudioError, ConvertError};
use crate::io::{read_audio, write_wav};

/// Files handed to one conversion worker.
pub const BATCH_SIZE: usize = 48;

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn walk(dir: &Path, extensions: &[&str], files: &mut Vec<PathBuf>) -> Result<(), ConvertError> {
    let list_error = |source| ConvertError::List {
        path: dir.to_path_buf(),
        source,
    };

    for entry in fs::read_dir(dir).map_err(list_error)? {
        let path = entry.map_err(list_error)?.path();

        if path.is_dir() {
            walk(&path, extensions, files)?;
        } else if has_extension(&path, extensions) {
            files.push(path);
        }
    }

    Ok(())
}

/// Every file below `dir` whose extension is one of `extensions`, compared
/// case-insensitively, in sorted order.
pub fn list_files_with(dir: impl AsRef<Path>, extensions: &[&str]) -> Result<Vec<PathBuf>, ConvertError> {
    let mut files = Vec::new();
    walk(dir.as_ref(), extensions, &mut files)?;
    files.sort();

    Ok(files)
}

pub fn list_files(dir: impl AsRef<Path>, extension: &str) -> Result<Vec<PathBuf>, ConvertError> {
    list_files_with(dir, &[extension])
}

/// Splits `files` into consecutive chunks of `size`; the last one may be
/// shorter.
pub fn partition(files: Vec<PathBuf>, size: usize) -> Result<Vec<Vec<PathBuf>>, ConvertError> {
    if size == 0 {
        return Err(ConvertError::ZeroBatchSize);
    }

    Ok(files.chunks(size).map(<[PathBuf]>::to_vec).collect())
}

#[derive(Debug, Clone, Default)]
pub struct FlacToWavOptions {
    /// Resample to this rate before writing; keep the source rate when unset.
    pub sample_rate: Option<u32>,
    /// Replace WAV files that already exist.
    pub overwrite: bool,
}

#[derive(Debug)]
pub struct ConversionFailure {
    pub path: PathBuf,
    pub error: AudioError,
}

#[derive(Debug, Default)]
pub struct ConversionReport {
    pub converted: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<ConversionFailure>,
}

impl ConversionReport {
    fn merge(mut self, other: ConversionReport) -> ConversionReport {
        self.converted.extend(other.converted);
        self.skipped.extend(other.skipped);
        self.failures.extend(other.failures);
        self
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Outcome {
    Converted(PathBuf),
    Skipped(PathBuf),
}

fn convert_file(flac: &Path, options: &FlacToWavOptions) -> Result<Outcome, AudioError> {
    let wav = flac.with_extension("wav");

    if wav.exists() && !options.overwrite {
        return Ok(Outcome::Skipped(wav));
    }

    let mut audio = read_audio(flac)?;
    if let Some(sample_rate) = options.sample_rate {
        audio = audio.resample(sample_rate)?;
    }

    write_wav(&wav, &audio)?;

    Ok(Outcome::Converted(wav))
}

fn convert_batch(batch: &[PathBuf], options: &FlacToWavOptions) -> ConversionReport {
    let mut report = ConversionReport::default();

    for path in batch {
        match convert_file(path, options) {
            Ok(Outcome::Converted(wav)) => {
                tracing::debug!(source = %path.display(), target = %wav.display(), "converted");
                report.converted.push(wav);
            }
            Ok(Outcome::Skipped(wav)) => report.skipped.push(wav),
            Err(error) => {
                tracing::warn!(source = %path.display(), %error, "conversion failed");
                report.failures.push(ConversionFailure {
                    path: path.clone(),
                    error,
                });
            }
        }
    }

    report
}

/// Converts every FLAC file below `dir` into a WAV file next to it. Batches of
/// [`BATCH_SIZE`] files run in parallel; a failing file is recorded in the
/// report and does not stop the other files.
pub fn flac_to_wav(
    dir: impl AsRef<Path>,
    options: &FlacToWavOptions,
) -> Result<ConversionReport, ConvertError> {
    let files = list_files(dir.as_ref(), "flac")?;
    let batches = partition(files, BATCH_SIZE)?;

    tracing::info!(
        dir = %dir.as_ref().display(),
        batches = batches.len(),
        "converting flac to wav"
    );

    let report = batches
        .par_iter()
        .map(|batch| convert_batch(batch, options))
        .reduce(ConversionReport::default, ConversionReport::merge);

    tracing::info!(
        converted = report.converted.len(),
        skipped = report.skipped.len(),
        failed = report.failures.len(),
        "conversion finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("{i:03}.flac"))).collect()
    }

    #[test]
    fn partition_preserves_order() {
        let files = paths(101);
        let batches = partition(files.clone(), BATCH_SIZE).unwrap();

        assert_eq!(batches.iter().map(Vec::len).collect_vec(), vec![48, 48, 5]);
        assert_eq!(batches.concat(), files);
    }

    #[test]
    fn partition_edge_sizes() {
        assert!(partition(paths(3), 1).unwrap().iter().all(|b| b.len() == 1));
        assert_eq!(partition(paths(3), 10).unwrap().len(), 1);
        assert!(partition(Vec::new(), 4).unwrap().is_empty());
        assert!(matches!(
            partition(paths(3), 0),
            Err(ConvertError::ZeroBatchSize)
        ));
    }

    #[test]
    fn lists_recursively_ignoring_case() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("b");
        fs::create_dir(&nested).unwrap();
        for path in [
            dir.path().join("z.flac"),
            dir.path().join("a.FLAC"),
            dir.path().join("c.wav"),
            nested.join("d.flac"),
        ] {
            fs::write(path, b"").unwrap();
        }

        let files = list_files(dir.path(), "flac").unwrap();

        assert_eq!(
            files,
            vec![
                dir.path().join("a.FLAC"),
                nested.join("d.flac"),
                dir.path().join("z.flac"),
            ]
        );
    }

    #[test]
    fn missing_directory_is_a_list_error() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            list_files(dir.path().join("absent"), "flac"),
            Err(ConvertError::List { .. })
        ));
    }

    #[test]
    fn corrupt_files_are_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.flac"), b"definitely not flac").unwrap();

        let report = flac_to_wav(dir.path(), &FlacToWavOptions::default()).unwrap();

        assert!(report.converted.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, dir.path().join("broken.flac"));
        assert!(!dir.path().join("broken.wav").exists());
    }

    #[test]
    fn existing_wav_is_skipped_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("clip.flac"), b"unused").unwrap();
        fs::write(dir.path().join("clip.wav"), b"kept").unwrap();

        let report = flac_to_wav(dir.path(), &FlacToWavOptions::default()).unwrap();

        assert_eq!(report.skipped, vec![dir.path().join("clip.wav")]);
        assert!(report.is_success());
        assert_eq!(fs::read(dir.path().join("clip.wav")).unwrap(), b"kept");
    }
}
