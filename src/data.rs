use std::sync::Arc;

use burn::data::dataloader::{DataLoader, DataLoaderBuilder, Dataset};
use burn::prelude::{Backend, Int, Tensor};

use crate::config::RunConfig;
use crate::data::batcher::{DownstreamBatcher, PretextBatcher};
use crate::data::dataset::{AudioDataset, LabelDict};
use crate::error::Error;

pub mod augment;
pub mod batcher;
pub mod dataset;

/// One decoded clip.
#[derive(Debug, Clone)]
pub struct AudioItem {
    pub samples: Vec<f32>,
    pub label: usize,
}

/// Two independently cropped and augmented views of the same clips.
#[derive(Debug, Clone)]
pub struct PretextBatch<B: Backend> {
    pub view_a: Tensor<B, 2>,
    pub view_b: Tensor<B, 2>,
}

#[derive(Debug, Clone)]
pub struct DownstreamBatch<B: Backend> {
    pub waveforms: Tensor<B, 2>,
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn name(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

/// A data loader together with the number of batches it yields per epoch.
pub struct Loader<O> {
    pub loader: Arc<dyn DataLoader<O>>,
    pub num_batches: usize,
}

impl<O> Loader<O> {
    pub fn len(&self) -> usize {
        self.num_batches
    }

    pub fn is_empty(&self) -> bool {
        self.num_batches == 0
    }
}

fn num_batches(num_items: usize, batch_size: usize) -> usize {
    num_items.div_ceil(batch_size)
}

/// Decodes the dataset of `split`. The test split needs the training labels.
pub fn load_dataset(
    config: &RunConfig,
    split: Split,
    labels: Option<&LabelDict>,
) -> Result<AudioDataset, Error> {
    let source = match split {
        Split::Train => &config.train_dataset,
        Split::Test => &config.test_dataset,
    };

    tracing::info!(split = split.name(), source = %source.display(), "loading dataset");
    let dataset = AudioDataset::load(source, config.sampling_rate, labels)?;
    tracing::info!(
        split = split.name(),
        clips = dataset.len(),
        classes = dataset.label_dict.len(),
        "dataset loaded"
    );
    tracing::debug!(labels = ?dataset.label_dict.names().collect::<Vec<_>>(), "label dictionary");

    Ok(dataset)
}

pub fn pretext_loader<B: Backend>(
    config: &RunConfig,
    split: Split,
    dataset: AudioDataset,
    device: &B::Device,
) -> Loader<PretextBatch<B>> {
    let num_batches = num_batches(dataset.len(), config.batch_size);
    let batcher = PretextBatcher::<B>::new(config.audio_window, config.seed, device.clone());

    let builder = DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers);
    let builder = match split {
        Split::Train if config.dataset_shuffle => builder.shuffle(config.seed),
        _ => builder,
    };

    Loader {
        loader: builder.build(dataset),
        num_batches,
    }
}

pub fn downstream_loader<B: Backend>(
    config: &RunConfig,
    split: Split,
    dataset: AudioDataset,
    device: &B::Device,
) -> Loader<DownstreamBatch<B>> {
    let num_batches = num_batches(dataset.len(), config.batch_size);

    let batcher = match split {
        Split::Train => DownstreamBatcher::<B>::training(config.audio_window, config.seed, device.clone()),
        Split::Test => DownstreamBatcher::<B>::inference(config.audio_window, device.clone()),
    };

    let builder = DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers);
    let builder = match split {
        Split::Train if config.dataset_shuffle => builder.shuffle(config.seed),
        _ => builder,
    };

    Loader {
        loader: builder.build(dataset),
        num_batches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_count_rounds_up() {
        assert_eq!(num_batches(10, 4), 3);
        assert_eq!(num_batches(8, 4), 2);
        assert_eq!(num_batches(1, 16), 1);
    }
}
