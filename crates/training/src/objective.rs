//! Pixel-wise softmax cross-entropy and the Adam update step.

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use std::marker::PhantomData;

#[derive(Debug, Clone)]
pub struct ObjectiveOutput<B: Backend> {
    /// Scores flattened to `[N*H*W, num_classes]`.
    pub logits: Tensor<B, 2>,
    /// Mean cross-entropy over every pixel.
    pub loss: Tensor<B, 1>,
}

pub struct Objective;

impl Objective {
    /// `scores` is `[N, C, H, W]`, `labels` one-hot `[N, H, W, C]`.
    pub fn build<B: Backend>(scores: Tensor<B, 4>, labels: Tensor<B, 4>) -> ObjectiveOutput<B> {
        let [n, c, h, w] = scores.dims();
        let logits = scores.permute([0, 2, 3, 1]).reshape([n * h * w, c]);
        let labels = labels.reshape([n * h * w, c]);
        let loss = (labels * log_softmax(logits.clone(), 1))
            .sum_dim(1)
            .mean()
            .neg();
        ObjectiveOutput { logits, loss }
    }

    /// Adam with default moments; the learning rate is supplied per step.
    pub fn update_step<B, M>() -> UpdateStep<impl Optimizer<M, B>, M, B>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
    {
        UpdateStep::new(AdamConfig::new().init())
    }
}

/// One backward pass plus one optimizer step.
pub struct UpdateStep<O, M, B> {
    optim: O,
    _marker: PhantomData<fn() -> (M, B)>,
}

impl<O, M, B> UpdateStep<O, M, B>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    pub fn new(optim: O) -> Self {
        Self {
            optim,
            _marker: PhantomData,
        }
    }

    pub fn apply(&mut self, model: M, loss: Tensor<B, 1>, learning_rate: f64) -> M {
        let grads = GradientsParams::from_grads(loss.backward(), &model);
        self.optim.step(learning_rate, model, grads)
    }
}

pub(crate) fn scalar<B: Backend>(loss: Tensor<B, 1>) -> f32 {
    loss.into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .first()
        .copied()
        .unwrap_or(f32::NAN)
}
