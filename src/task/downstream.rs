use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLoss;
use burn::optim::GradientsParams;
use burn::prelude::{Backend, ElementConversion, Int, Tensor};
use burn::tensor::backend::AutodiffBackend;

use crate::data::{DownstreamBatch, Loader};
use crate::error::Error;
use crate::loss::{count_correct, Criterion};
use crate::metric::{MetricsWriter, RunningMean};
use crate::model::downstream::DownstreamClassifier;
use crate::model::WaveByol;
use crate::optim::{LearningRateSchedule, ModelOptimizer};
use crate::task::{global_step, log_progress, write_scalar, EpochSummary};

struct StepOutput<B: Backend> {
    loss: Tensor<B, 1>,
    correct: usize,
    total: usize,
}

fn classify<B: Backend>(
    head: &DownstreamClassifier<B>,
    features: Tensor<B, 3>,
    targets: Tensor<B, 1, Int>,
    criterion: &CrossEntropyLoss<B>,
) -> StepOutput<B> {
    let logits = head.forward(features);
    let total = targets.dims()[0];

    StepOutput {
        loss: criterion.forward(logits.clone(), targets.clone()),
        correct: count_correct(logits, targets),
        total,
    }
}

#[derive(Default)]
struct Accuracy {
    correct: usize,
    total: usize,
}

impl Accuracy {
    fn update(&mut self, correct: usize, total: usize) -> f64 {
        self.correct += correct;
        self.total += total;
        ratio(correct, total)
    }

    fn value(&self) -> f64 {
        ratio(self.correct, self.total)
    }
}

fn ratio(correct: usize, total: usize) -> f64 {
    match total {
        0 => 0.0,
        total => correct as f64 / total as f64,
    }
}

pub struct DownstreamTrainer<'a, B: AutodiffBackend> {
    pub optimizer: &'a mut ModelOptimizer<DownstreamClassifier<B>, B>,
    pub schedule: &'a mut LearningRateSchedule,
    pub criterion: Criterion,
    pub epochs: usize,
}

impl<B: AutodiffBackend> DownstreamTrainer<'_, B> {
    /// One pass over `loader` optimising the head. The pretext network stays
    /// frozen on the inner backend.
    pub fn train_downstream(
        &mut self,
        epoch: usize,
        pretext: &WaveByol<B::InnerBackend>,
        mut head: DownstreamClassifier<B>,
        loader: &Loader<DownstreamBatch<B>>,
        writer: &mut MetricsWriter,
    ) -> Result<(DownstreamClassifier<B>, EpochSummary), Error> {
        let mut mean = RunningMean::default();
        let mut accuracy = Accuracy::default();
        let mut criterion = None;

        for (iteration, batch) in loader.loader.iter().enumerate() {
            let criterion = criterion
                .get_or_insert_with(|| self.criterion.init::<B>(&batch.targets.device()));
            let features = Tensor::from_inner(pretext.features(batch.waveforms.inner()));

            let output = classify(&head, features, batch.targets, criterion);
            let value = output.loss.clone().into_scalar().elem::<f64>();

            let grads = GradientsParams::from_grads(output.loss.backward(), &head);
            let lr = self.schedule.next_lr();
            head = self.optimizer.step(lr, head, grads);

            mean.update(value);
            let batch_accuracy = accuracy.update(output.correct, output.total);
            let step = global_step(epoch, loader.len(), iteration);
            write_scalar(writer, "Loss/train_downstream", value, step)?;
            write_scalar(writer, "Accuracy/train_downstream", batch_accuracy, step)?;
            log_progress("train", epoch, self.epochs, iteration, loader.len(), value);
        }

        Ok((
            head,
            EpochSummary {
                loss: mean.mean(),
                accuracy: Some(accuracy.value()),
            },
        ))
    }
}

pub fn test_downstream<B: AutodiffBackend>(
    epoch: usize,
    epochs: usize,
    pretext: &WaveByol<B::InnerBackend>,
    head: &DownstreamClassifier<B>,
    criterion: Criterion,
    loader: &Loader<DownstreamBatch<B::InnerBackend>>,
    writer: &mut MetricsWriter,
) -> Result<EpochSummary, Error> {
    let head = head.valid();
    let mut mean = RunningMean::default();
    let mut accuracy = Accuracy::default();
    let mut loss_fn = None;

    for (iteration, batch) in loader.loader.iter().enumerate() {
        let loss_fn = loss_fn
            .get_or_insert_with(|| criterion.init::<B::InnerBackend>(&batch.targets.device()));
        let features = pretext.features(batch.waveforms);

        let output = classify(&head, features, batch.targets, loss_fn);
        let value = output.loss.into_scalar().elem::<f64>();

        mean.update(value);
        let batch_accuracy = accuracy.update(output.correct, output.total);
        let step = global_step(epoch, loader.len(), iteration);
        write_scalar(writer, "Loss/test_downstream", value, step)?;
        write_scalar(writer, "Accuracy/test_downstream", batch_accuracy, step)?;
        log_progress("test", epoch, epochs, iteration, loader.len(), value);
    }

    Ok(EpochSummary {
        loss: mean.mean(),
        accuracy: Some(accuracy.value()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_accumulates_counts() {
        let mut accuracy = Accuracy::default();

        assert_eq!(accuracy.update(3, 4), 0.75);
        assert_eq!(accuracy.update(0, 4), 0.0);
        assert_eq!(accuracy.value(), 0.375);
        assert_eq!(ratio(0, 0), 0.0);
    }
}
