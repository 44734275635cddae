use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::{Backend, Int, Tensor};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::augment::{augment, AugmentConfig};
use crate::data::{AudioItem, DownstreamBatch, PretextBatch};
use crate::pad::{center_crop, random_crop, stack_sequences};

/// Random source for crops and augmentation. Batch `n` of a run always draws
/// from the same stream; the counter is shared by every clone of the batcher
/// so it keeps advancing across epochs.
#[derive(Clone, Debug)]
pub struct BatchRng {
    seed: u64,
    batches: Arc<AtomicU64>,
}

impl BatchRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            batches: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_batch(&self) -> StdRng {
        let index = self.batches.fetch_add(1, Ordering::Relaxed);
        StdRng::seed_from_u64(self.seed ^ index.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }
}

#[derive(Clone, Debug)]
pub struct PretextBatcher<B: Backend> {
    window: usize,
    augment: AugmentConfig,
    rng: BatchRng,
    device: B::Device,
}

impl<B: Backend> PretextBatcher<B> {
    pub fn new(window: usize, seed: u64, device: B::Device) -> Self {
        Self {
            window,
            augment: AugmentConfig::default(),
            rng: BatchRng::new(seed),
            device,
        }
    }
}

impl<B: Backend> Batcher<AudioItem, PretextBatch<B>> for PretextBatcher<B> {
    fn batch(&self, items: Vec<AudioItem>) -> PretextBatch<B> {
        let mut rng = self.rng.next_batch();

        let (view_a, view_b): (Vec<_>, Vec<_>) = items
            .iter()
            .map(|item| {
                let mut view = || {
                    let mut crop = random_crop(&item.samples, self.window, &mut rng);
                    augment(&mut crop, &self.augment, &mut rng);
                    crop
                };
                (view(), view())
            })
            .unzip();

        PretextBatch {
            view_a: stack_sequences(view_a, &self.device),
            view_b: stack_sequences(view_b, &self.device),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DownstreamBatcher<B: Backend> {
    window: usize,
    // random crops when set, centre crops otherwise
    rng: Option<BatchRng>,
    device: B::Device,
}

impl<B: Backend> DownstreamBatcher<B> {
    /// Random crops, for training.
    pub fn training(window: usize, seed: u64, device: B::Device) -> Self {
        Self {
            window,
            rng: Some(BatchRng::new(seed)),
            device,
        }
    }

    /// Centre crops, so evaluation is deterministic.
    pub fn inference(window: usize, device: B::Device) -> Self {
        Self {
            window,
            rng: None,
            device,
        }
    }
}

impl<B: Backend> Batcher<AudioItem, DownstreamBatch<B>> for DownstreamBatcher<B> {
    fn batch(&self, items: Vec<AudioItem>) -> DownstreamBatch<B> {
        let mut rng = self.rng.as_ref().map(BatchRng::next_batch);

        let waveforms = items
            .iter()
            .map(|item| match rng.as_mut() {
                Some(rng) => random_crop(&item.samples, self.window, rng),
                None => center_crop(&item.samples, self.window),
            })
            .collect_vec();
        let targets = items.iter().map(|item| item.label as i32).collect_vec();

        DownstreamBatch {
            waveforms: stack_sequences(waveforms, &self.device),
            targets: Tensor::<B, 1, Int>::from_ints(targets.as_slice(), &self.device),
        }
    }
}
