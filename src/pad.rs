use burn::prelude::Backend;
use burn::tensor::Tensor;
use itertools::Itertools;
use rand::Rng;

pub fn trim_sequence(mut sequence: Vec<f32>, len: usize) -> Vec<f32> {
    sequence.truncate(len);
    sequence
}

pub fn pad_sequence(mut sequence: Vec<f32>, len: usize) -> Vec<f32> {
    if sequence.len() < len {
        sequence.resize(len, 0.0);
    }
    sequence
}

pub fn pad_or_trim(sequence: Vec<f32>, len: usize) -> Vec<f32> {
    match sequence.len() {
        original_len if original_len > len => trim_sequence(sequence, len),
        _ => pad_sequence(sequence, len),
    }
}

/// Window of `len` samples at a uniformly drawn offset; shorter clips are
/// zero padded on the right.
pub fn random_crop(sequence: &[f32], len: usize, rng: &mut impl Rng) -> Vec<f32> {
    if sequence.len() <= len {
        return pad_sequence(sequence.to_vec(), len);
    }

    let offset = rng.gen_range(0..=sequence.len() - len);
    sequence[offset..offset + len].to_vec()
}

pub fn center_crop(sequence: &[f32], len: usize) -> Vec<f32> {
    if sequence.len() <= len {
        return pad_sequence(sequence.to_vec(), len);
    }

    let offset = (sequence.len() - len) / 2;
    sequence[offset..offset + len].to_vec()
}

/// Stacks equal-length sequences into a batch x time tensor.
pub fn stack_sequences<B: Backend>(sequences: Vec<Vec<f32>>, device: &B::Device) -> Tensor<B, 2> {
    let batch = sequences.len();
    let len = sequences.first().map(Vec::len).unwrap_or(0);

    debug_assert!(sequences.iter().all(|s| s.len() == len));

    let flat = sequences.into_iter().flatten().collect_vec();
    Tensor::<B, 1>::from_floats(flat.as_slice(), device).reshape([batch, len])
}
