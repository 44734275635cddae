use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::prelude::{Backend, ElementConversion, Tensor};
use burn::tensor::backend::AutodiffBackend;

use crate::data::{Loader, PretextBatch};
use crate::error::Error;
use crate::loss::symmetric_byol_loss;
use crate::metric::{MetricsWriter, RunningMean};
use crate::model::target::TargetNetwork;
use crate::model::WaveByol;
use crate::optim::{LearningRateSchedule, ModelOptimizer};
use crate::task::{global_step, log_progress, write_scalar, EpochSummary};

/// Online network being trained and its EMA target.
pub struct PretextModels<B: AutodiffBackend> {
    pub online: WaveByol<B>,
    pub target: TargetNetwork<B::InnerBackend>,
}

impl<B: AutodiffBackend> PretextModels<B> {
    pub fn new(online: WaveByol<B>) -> Self {
        let target = TargetNetwork::from_online(&online);
        Self { online, target }
    }
}

fn pretext_loss<B: Backend>(
    online: &WaveByol<B>,
    target_a: Tensor<B, 2>,
    target_b: Tensor<B, 2>,
    batch: PretextBatch<B>,
) -> Tensor<B, 1> {
    let (_, prediction_a) = online.forward(batch.view_a);
    let (_, prediction_b) = online.forward(batch.view_b);

    symmetric_byol_loss(prediction_a, prediction_b, target_a, target_b)
}

pub struct PretextTrainer<'a, B: AutodiffBackend> {
    pub optimizer: &'a mut ModelOptimizer<WaveByol<B>, B>,
    pub schedule: &'a mut LearningRateSchedule,
    pub ema_decay: f64,
    pub epochs: usize,
}

impl<B: AutodiffBackend> PretextTrainer<'_, B> {
    /// One pass over `loader`, stepping the optimizer and the target network
    /// after every batch.
    pub fn train_pretext(
        &mut self,
        epoch: usize,
        models: PretextModels<B>,
        loader: &Loader<PretextBatch<B>>,
        writer: &mut MetricsWriter,
    ) -> Result<(PretextModels<B>, EpochSummary), Error> {
        let PretextModels {
            mut online,
            mut target,
        } = models;
        let mut mean = RunningMean::default();

        for (iteration, batch) in loader.loader.iter().enumerate() {
            let target_a = Tensor::from_inner(target.project(batch.view_a.clone().inner()));
            let target_b = Tensor::from_inner(target.project(batch.view_b.clone().inner()));

            let loss = pretext_loss(&online, target_a, target_b, batch);
            let value = loss.clone().into_scalar().elem::<f64>();

            let grads = GradientsParams::from_grads(loss.backward(), &online);
            let lr = self.schedule.next_lr();
            online = self.optimizer.step(lr, online, grads);
            target = target.update(&online, self.ema_decay);

            mean.update(value);
            let step = global_step(epoch, loader.len(), iteration);
            write_scalar(writer, "Loss/train_pretext", value, step)?;
            log_progress("train", epoch, self.epochs, iteration, loader.len(), value);
        }

        Ok((
            PretextModels { online, target },
            EpochSummary {
                loss: mean.mean(),
                accuracy: None,
            },
        ))
    }
}

/// Evaluation pass on the inner backend; no parameter changes.
pub fn test_pretext<B: AutodiffBackend>(
    epoch: usize,
    epochs: usize,
    models: &PretextModels<B>,
    loader: &Loader<PretextBatch<B::InnerBackend>>,
    writer: &mut MetricsWriter,
) -> Result<EpochSummary, Error> {
    let online = models.online.valid();
    let mut mean = RunningMean::default();

    for (iteration, batch) in loader.loader.iter().enumerate() {
        let target_a = models.target.project(batch.view_a.clone());
        let target_b = models.target.project(batch.view_b.clone());

        let value = pretext_loss(&online, target_a, target_b, batch)
            .into_scalar()
            .elem::<f64>();

        mean.update(value);
        write_scalar(
            writer,
            "Loss/test_pretext",
            value,
            global_step(epoch, loader.len(), iteration),
        )?;
        log_progress("test", epoch, epochs, iteration, loader.len(), value);
    }

    Ok(EpochSummary {
        loss: mean.mean(),
        accuracy: None,
    })
}
