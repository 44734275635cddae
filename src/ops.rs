use std::collections::HashMap;

use burn::lr_scheduler::LrScheduler;
use burn::module::{Module, ModuleMapper, ModuleVisitor, ParamId};
use burn::prelude::{Backend, Tensor};
use burn::LearningRate;

/// Euclidean norm along `dim`, keeping the dimension.
pub fn l2<B: Backend, const D: usize>(tensor: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    tensor.powi_scalar(2).sum_dim(dim).sqrt()
}

pub fn l2_normalize<B: Backend, const D: usize>(tensor: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    let norm = l2(tensor.clone(), dim).clamp_min(1e-8);
    tensor / norm
}

pub fn cosine_similarity<B: Backend, const D: usize>(
    a: Tensor<B, D>,
    b: Tensor<B, D>,
    dim: usize,
) -> Tensor<B, D> {
    Tensor::sum_dim(l2_normalize(a, dim) * l2_normalize(b, dim), dim)
}

/// Linear warm-up followed by polynomial decay towards `end_lr`.
#[derive(Clone, Debug)]
pub struct PolynomialDecay {
    start_lr: f32,
    end_lr: f32,
    power: f32,
    num_warmup_steps: usize,
    total_steps: usize,
    current_step: usize,
}

impl PolynomialDecay {
    pub fn new(
        start_lr: f32,
        end_lr: f32,
        power: f32,
        total_steps: usize,
        num_warmup_steps: usize,
    ) -> Self {
        Self {
            start_lr,
            end_lr,
            power,
            total_steps,
            num_warmup_steps,
            current_step: 1,
        }
    }

    pub fn next_lr(&mut self) -> LearningRate {
        if self.current_step >= self.total_steps {
            return self.end_lr as f64;
        }

        let lr = if self.current_step <= self.num_warmup_steps {
            self.current_step as f32 / self.num_warmup_steps as f32 * self.start_lr
        } else {
            let progress = (self.current_step - self.num_warmup_steps) as f32
                / (self.total_steps - self.num_warmup_steps) as f32;
            (self.start_lr - self.end_lr) * (1.0 - progress).powf(self.power) + self.end_lr
        };

        self.current_step += 1;

        lr as f64
    }
}

impl<B: Backend> LrScheduler<B> for PolynomialDecay {
    type Record = (f32, f32, f32, usize, usize, usize);

    fn step(&mut self) -> LearningRate {
        self.next_lr()
    }

    fn to_record(&self) -> Self::Record {
        (
            self.start_lr,
            self.end_lr,
            self.power,
            self.num_warmup_steps,
            self.total_steps,
            self.current_step,
        )
    }

    fn load_record(self, record: Self::Record) -> Self {
        Self {
            start_lr: record.0,
            end_lr: record.1,
            power: record.2,
            num_warmup_steps: record.3,
            total_steps: record.4,
            current_step: record.5,
        }
    }
}

/// Collects every float parameter of a module, flattened, keyed by id.
pub struct ParamCollector<B: Backend> {
    pub params: HashMap<ParamId, Tensor<B, 1>>,
}

impl<B: Backend> Default for ParamCollector<B> {
    fn default() -> Self {
        Self {
            params: HashMap::new(),
        }
    }
}

impl<B: Backend> ModuleVisitor<B> for ParamCollector<B> {
    fn visit_float<const D: usize>(&mut self, id: &ParamId, tensor: &Tensor<B, D>) {
        let num_elements = tensor.shape().num_elements();
        self.params
            .insert(id.clone(), tensor.clone().reshape([num_elements]));
    }
}

/// Blends each parameter with the collected parameter of the same id.
pub struct EmaMapper<B: Backend> {
    pub decay: f64,
    pub online: HashMap<ParamId, Tensor<B, 1>>,
}

impl<B: Backend> ModuleMapper<B> for EmaMapper<B> {
    fn map_float<const D: usize>(&mut self, id: &ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        match self.online.remove(id) {
            Some(online) => {
                let online = online.reshape(tensor.shape());
                tensor.mul_scalar(self.decay) + online.mul_scalar(1.0 - self.decay)
            }
            None => tensor,
        }
    }
}

/// Exponential moving average of `target` towards `online`. Both modules must
/// share parameter ids, which holds when one was derived from the other.
pub fn ema_update<B: Backend, M: Module<B>>(target: M, online: &M, decay: f64) -> M {
    let mut collector = ParamCollector::<B>::default();
    online.visit(&mut collector);

    let mut mapper = EmaMapper {
        decay,
        online: collector.params,
    };
    target.map(&mut mapper)
}

#[cfg(test)]
mod tests {
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::NdArray;
    use burn::module::Param;
    use burn::tensor::TensorData;

    use super::*;

    #[derive(Module, Debug)]
    struct Weights<B: Backend> {
        weight: Param<Tensor<B, 2>>,
    }

    fn weights(value: f32, device: &NdArrayDevice) -> Weights<NdArray> {
        Weights {
            weight: Param::from_tensor(Tensor::full([2, 3], value, device)),
        }
    }

    #[test]
    fn cosine_similarity_of_parallel_and_opposite_vectors() {
        let device = NdArrayDevice::Cpu;
        let a = Tensor::<NdArray, 2>::from_data(
            TensorData::new(vec![1.0f32, 2.0, -1.0, 0.5], [2, 2]),
            &device,
        );
        let b = Tensor::<NdArray, 2>::from_data(
            TensorData::new(vec![2.0f32, 4.0, 1.0, -0.5], [2, 2]),
            &device,
        );

        let sim = cosine_similarity(a, b, 1).to_data().to_vec::<f32>().unwrap();

        assert!((sim[0] - 1.0).abs() < 1e-5);
        assert!((sim[1] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn ema_moves_target_towards_online() {
        let device = NdArrayDevice::Cpu;
        let online = weights(1.0, &device);
        let mut collector = ParamCollector::default();
        online.visit(&mut collector);
        // zeroed copy sharing the online parameter ids
        let target = online.clone().map(&mut EmaMapper {
            decay: 0.0,
            online: collector
                .params
                .into_iter()
                .map(|(id, tensor)| (id, tensor.zeros_like()))
                .collect(),
        });

        let updated = ema_update(target, &online, 0.75);
        let values = updated.weight.val().to_data().to_vec::<f32>().unwrap();

        assert!(values.iter().all(|v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn ema_ignores_unrelated_params() {
        let device = NdArrayDevice::Cpu;
        let online = weights(1.0, &device);
        let target = weights(3.0, &device);

        // distinct ids: nothing to blend
        let updated = ema_update(target, &online, 0.5);
        let values = updated.weight.val().to_data().to_vec::<f32>().unwrap();

        assert!(values.iter().all(|v| (v - 3.0).abs() < 1e-6));
    }

    #[test]
    fn polynomial_decay_warms_up_then_decays() {
        let mut schedule = PolynomialDecay::new(1.0, 0.0, 1.0, 10, 4);

        let lrs = (0..12).map(|_| schedule.next_lr()).collect::<Vec<_>>();

        assert!((lrs[0] - 0.25).abs() < 1e-6);
        assert!((lrs[3] - 1.0).abs() < 1e-6);
        assert!(lrs[4] < lrs[3]);
        assert!(lrs.windows(2).skip(3).all(|w| w[1] <= w[0]));
        assert_eq!(lrs[11], 0.0);
    }
}
