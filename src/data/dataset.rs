use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use burn::data::dataloader::Dataset;
use burn::data::dataset::InMemDataset;
use rayon::prelude::*;

use crate::convert::list_files_with;
use crate::data::AudioItem;
use crate::error::{AudioError, ConvertError, DatasetError};
use crate::io::read_audio;

pub const AUDIO_EXTENSIONS: [&str; 3] = ["wav", "flac", "mp3"];

/// Class name to index, in sorted name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelDict {
    labels: BTreeMap<String, usize>,
}

impl LabelDict {
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names = labels.into_iter().map(Into::into).collect::<Vec<String>>();
        names.sort();
        names.dedup();

        Self {
            labels: names
                .into_iter()
                .enumerate()
                .map(|(index, name)| (name, index))
                .collect(),
        }
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.labels.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.labels.keys().map(String::as_str)
    }
}

/// The class of a clip is the name of the directory containing it.
pub fn label_of(path: &Path) -> Result<String, DatasetError> {
    path.parent()
        .and_then(Path::file_name)
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| DatasetError::MissingLabel(path.to_path_buf()))
}

/// Reads a manifest: one path per line, `#` comments and blank lines
/// skipped, relative paths taken from the manifest's directory.
pub fn read_manifest(path: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let text = fs::read_to_string(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base = path.parent().unwrap_or(Path::new("."));

    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let entry = Path::new(line);
            if entry.is_absolute() {
                entry.to_path_buf()
            } else {
                base.join(entry)
            }
        })
        .collect())
}

/// Audio files named by `source`, either a manifest or a directory.
pub fn collect_sources(source: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    if source.is_dir() {
        list_files_with(source, &AUDIO_EXTENSIONS).map_err(|e| match e {
            ConvertError::List { path, source } => DatasetError::Io { path, source },
            other => DatasetError::Io {
                path: source.to_path_buf(),
                source: std::io::Error::other(other.to_string()),
            },
        })
    } else {
        read_manifest(source)
    }
}

fn decode(path: &Path, sample_rate: u32) -> Result<Vec<f32>, AudioError> {
    Ok(read_audio(path)?.to_mono().resample(sample_rate)?.samples)
}

/// Every clip of a split, decoded to mono at the training rate.
pub struct AudioDataset {
    pub inner: InMemDataset<AudioItem>,
    pub label_dict: LabelDict,
}

impl AudioDataset {
    /// Decodes `source` in parallel. Without `labels` the label dictionary is
    /// built from this split; with it, unknown labels are rejected.
    pub fn load(
        source: &Path,
        sample_rate: u32,
        labels: Option<&LabelDict>,
    ) -> Result<Self, DatasetError> {
        let paths = collect_sources(source)?;

        let named = paths
            .into_iter()
            .map(|path| label_of(&path).map(|label| (path, label)))
            .collect::<Result<Vec<_>, _>>()?;

        let label_dict = match labels {
            Some(labels) => labels.clone(),
            None => LabelDict::from_labels(named.iter().map(|(_, label)| label.clone())),
        };

        for (path, label) in &named {
            if label_dict.get(label).is_none() {
                return Err(DatasetError::UnknownLabel {
                    label: label.clone(),
                    path: path.clone(),
                });
            }
        }

        let items = named
            .into_par_iter()
            .filter_map(|(path, label)| match decode(&path, sample_rate) {
                Ok(samples) if !samples.is_empty() => Some(AudioItem {
                    samples,
                    label: label_dict.get(&label).unwrap_or_default(),
                }),
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "skipping empty clip");
                    None
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "skipping undecodable clip");
                    None
                }
            })
            .collect::<Vec<_>>();

        if items.is_empty() {
            return Err(DatasetError::Empty(source.to_path_buf()));
        }

        Ok(Self {
            inner: InMemDataset::new(items),
            label_dict,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.label_dict.len()
    }
}

impl Dataset<AudioItem> for AudioDataset {
    fn get(&self, index: usize) -> Option<AudioItem> {
        self.inner.get(index)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use crate::io::{write_wav, Audio};

    use super::*;

    fn write_clip(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let audio = Audio {
            samples: (0..len).map(|i| (i as f32 * 0.01).sin()).collect(),
            sample_rate: 16_000,
            channels: 1,
        };
        write_wav(path, &audio).unwrap();
    }

    #[test]
    fn label_dict_is_sorted_and_unique() {
        let dict = LabelDict::from_labels(["siren", "dog_bark", "siren", "car_horn"]);

        assert_eq!(dict.len(), 3);
        assert_eq!(dict.get("car_horn"), Some(0));
        assert_eq!(dict.get("dog_bark"), Some(1));
        assert_eq!(dict.get("siren"), Some(2));
        assert_eq!(dict.get("drilling"), None);
    }

    #[test]
    fn manifest_skips_comments_and_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("train.txt");
        fs::write(&manifest, "# header\n\ndog/a.wav\n  /abs/cat/b.wav  \n").unwrap();

        let paths = read_manifest(&manifest).unwrap();

        assert_eq!(
            paths,
            vec![dir.path().join("dog/a.wav"), PathBuf::from("/abs/cat/b.wav")]
        );
    }

    #[test]
    fn loads_directory_and_skips_bad_clips() {
        let dir = tempfile::tempdir().unwrap();
        write_clip(&dir.path().join("dog/a.wav"), 800);
        write_clip(&dir.path().join("cat/b.wav"), 400);
        fs::write(dir.path().join("cat/broken.wav"), b"nope").unwrap();

        let dataset = AudioDataset::load(dir.path(), 16_000, None).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.num_classes(), 2);
        let labels = (0..dataset.len())
            .map(|i| dataset.get(i).unwrap())
            .map(|item| (item.samples.len(), item.label))
            .collect::<Vec<_>>();
        assert!(labels.contains(&(800, 1)));
        assert!(labels.contains(&(400, 0)));
    }

    #[test]
    fn test_split_rejects_unknown_labels() {
        let dir = tempfile::tempdir().unwrap();
        write_clip(&dir.path().join("bird/c.wav"), 100);
        let labels = LabelDict::from_labels(["cat", "dog"]);

        assert!(matches!(
            AudioDataset::load(dir.path(), 16_000, Some(&labels)),
            Err(DatasetError::UnknownLabel { .. })
        ));
    }

    #[test]
    fn empty_source_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            AudioDataset::load(dir.path(), 16_000, None),
            Err(DatasetError::Empty(_))
        ));
    }
}
