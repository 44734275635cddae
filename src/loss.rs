use std::str::FromStr;

use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::prelude::{Backend, ElementConversion, Int, Tensor};

use crate::error::ConfigError;
use crate::ops::cosine_similarity;

/// BYOL regression loss `2 - 2 cos(p, z)`, averaged over the batch.
///
/// Lies in `[0, 4]`: zero when prediction and target point the same way.
pub fn byol_loss<B: Backend>(prediction: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
    let similarity = cosine_similarity(prediction, target, 1);
    (similarity.mul_scalar(-2.0).add_scalar(2.0)).mean()
}

/// Symmetrised BYOL loss over two views: each view's prediction regresses the
/// other view's target projection.
pub fn symmetric_byol_loss<B: Backend>(
    prediction_a: Tensor<B, 2>,
    prediction_b: Tensor<B, 2>,
    target_a: Tensor<B, 2>,
    target_b: Tensor<B, 2>,
) -> Tensor<B, 1> {
    byol_loss(prediction_a, target_b) + byol_loss(prediction_b, target_a)
}

/// Downstream criteria selectable through `loss_function`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Criterion {
    CrossEntropy,
    LabelSmoothingCrossEntropy(f32),
}

impl FromStr for Criterion {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "CrossEntropyLoss" => Ok(Criterion::CrossEntropy),
            "LabelSmoothingCrossEntropyLoss" => Ok(Criterion::LabelSmoothingCrossEntropy(0.1)),
            other => Err(ConfigError::UnknownLoss(other.to_string())),
        }
    }
}

impl Criterion {
    pub fn init<B: Backend>(self, device: &B::Device) -> CrossEntropyLoss<B> {
        match self {
            Criterion::CrossEntropy => CrossEntropyLossConfig::new().init(device),
            Criterion::LabelSmoothingCrossEntropy(alpha) => CrossEntropyLossConfig::new()
                .with_smoothing(Some(alpha))
                .init(device),
        }
    }
}

/// Number of rows whose arg-max matches the target class.
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predicted = logits.argmax(1).squeeze::<1>(1);

    predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}
