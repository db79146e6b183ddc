use crate::checkpoint::{restore_checkpoint, save_checkpoint, CheckpointMeta};
use crate::objective::{scalar, Objective, ObjectiveOutput, UpdateStep};
use crate::trainer::{BatchSource, StepInputs, TrainSession};
use burn::module::Module;
use burn::optim::Optimizer;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn_dataset::{ImageShape, RoadBatch, RoadDataset};
use models::{Fcn, Vgg16Config};
use std::path::Path;

/// Feeds a [`RoadDataset`] to the trainer as tensors on `device`.
pub struct DatasetSource<B: Backend> {
    dataset: RoadDataset,
    device: B::Device,
}

impl<B: Backend> DatasetSource<B> {
    pub fn new(dataset: RoadDataset, device: B::Device) -> Self {
        Self { dataset, device }
    }

    pub fn dataset(&self) -> &RoadDataset {
        &self.dataset
    }
}

impl<B: Backend> BatchSource for DatasetSource<B> {
    type Batch = RoadBatch<B>;

    fn batches(
        &self,
        batch_size: usize,
    ) -> anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<Self::Batch>> + '_>> {
        let mut iter = self.dataset.iter();
        let device = self.device.clone();
        Ok(Box::new(std::iter::from_fn(move || {
            iter.next_batch::<B>(batch_size, &device)
                .map_err(anyhow::Error::from)
                .transpose()
        })))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionOptions {
    /// Add the decoder L2 penalty to the optimized loss.
    pub regularize: bool,
    /// Keep pretrained backbone weights fixed.
    pub freeze_backbone: bool,
}

/// Owns the network and optimizer state for one run.
pub struct FcnSession<B: AutodiffBackend, O> {
    model: Fcn<B>,
    step: UpdateStep<O, Fcn<B>, B>,
    options: SessionOptions,
    backbone: Vgg16Config,
    shape: ImageShape,
}

impl<B, O> FcnSession<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Fcn<B>, B>,
{
    pub fn new(
        model: Fcn<B>,
        step: UpdateStep<O, Fcn<B>, B>,
        options: SessionOptions,
        backbone: Vgg16Config,
        shape: ImageShape,
    ) -> Self {
        let mut session = Self {
            model,
            step,
            options,
            backbone,
            shape,
        };
        session.apply_freeze();
        tracing::info!(
            "session ready: {} params, regularize={} freeze_backbone={}",
            session.model.num_params(),
            options.regularize,
            options.freeze_backbone
        );
        session
    }

    fn apply_freeze(&mut self) {
        if self.options.freeze_backbone {
            self.model.backbone = self.model.backbone.clone().no_grad();
        }
    }

    pub fn model(&self) -> &Fcn<B> {
        &self.model
    }

    pub fn into_model(self) -> Fcn<B> {
        self.model
    }

    pub fn describe(&self, epoch: usize, loss: f32) -> CheckpointMeta {
        CheckpointMeta::describe(&self.model, &self.backbone, self.shape, epoch, loss)
    }

    /// Replace the weights with those stored at `model_path`.
    pub fn restore(&mut self, model_path: &Path, device: &B::Device) -> anyhow::Result<()> {
        let current = self.describe(0, f32::NAN);
        self.model = restore_checkpoint(self.model.clone(), model_path, &current, device)?;
        self.apply_freeze();
        Ok(())
    }
}

impl<B, O> TrainSession for FcnSession<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Fcn<B>, B>,
{
    type Batch = RoadBatch<B>;

    fn run_step(&mut self, batch: RoadBatch<B>, inputs: StepInputs) -> anyhow::Result<f32> {
        if batch.is_empty() {
            anyhow::bail!("cannot step on an empty batch");
        }
        let scores = self.model.forward(batch.images, inputs.keep_prob);
        let ObjectiveOutput { loss, .. } = Objective::build(scores, batch.labels);
        let loss = if self.options.regularize {
            loss + self.model.regularization_loss()
        } else {
            loss
        };
        let value = scalar(loss.clone().detach());
        self.model = self
            .step
            .apply(self.model.clone(), loss, inputs.learning_rate);
        Ok(value)
    }

    fn save(&mut self, path: &Path, epoch: usize, loss: f32) -> anyhow::Result<()> {
        let meta = self.describe(epoch, loss);
        save_checkpoint(&self.model, path, &meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::{Distribution, Tensor, TensorData};
    use models::FcnConfig;

    type TestBackend = Autodiff<NdArray<f32>>;

    const STEP: StepInputs = StepInputs {
        keep_prob: 1.0,
        learning_rate: 1e-2,
    };

    fn tiny_backbone() -> Vgg16Config {
        Vgg16Config {
            in_channels: 3,
            block_channels: [4, 4, 8, 8, 8],
            fc_channels: 16,
        }
    }

    fn shape() -> ImageShape {
        ImageShape::new(32, 64)
    }

    fn session(
        options: SessionOptions,
    ) -> FcnSession<TestBackend, impl Optimizer<Fcn<TestBackend>, TestBackend>> {
        let model = FcnConfig::new(tiny_backbone(), 2).init(&Default::default());
        FcnSession::new(
            model,
            Objective::update_step(),
            options,
            tiny_backbone(),
            shape(),
        )
    }

    fn batch() -> RoadBatch<TestBackend> {
        let device = Default::default();
        let images = Tensor::random([2, 3, 32, 64], Distribution::Uniform(0.0, 255.0), &device);
        // Top half background, bottom half road.
        let labels: Vec<f32> = (0..2 * 32 * 64)
            .flat_map(|i| if (i / 64) % 32 < 16 { [1.0, 0.0] } else { [0.0, 1.0] })
            .collect();
        let labels = Tensor::from_data(TensorData::new(labels, [2, 32, 64, 2]), &device);
        RoadBatch { images, labels }
    }

    fn values(t: Tensor<TestBackend, 4>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn frozen_backbone_keeps_weights_while_decoder_learns() {
        let mut session = session(SessionOptions {
            regularize: false,
            freeze_backbone: true,
        });
        let data = batch();
        let features_before =
            values(session.model().backbone.endpoints(data.images.clone(), 1.0).layer7_out);
        let scores_before = values(session.model().forward(data.images.clone(), 1.0));

        for _ in 0..2 {
            session.run_step(data.clone(), STEP).unwrap();
        }

        let features_after =
            values(session.model().backbone.endpoints(data.images.clone(), 1.0).layer7_out);
        let scores_after = values(session.model().forward(data.images, 1.0));
        assert_eq!(features_before, features_after);
        assert_ne!(scores_before, scores_after);
    }

    #[test]
    fn unfrozen_backbone_is_updated() {
        let mut session = session(SessionOptions::default());
        let data = batch();
        let before = values(session.model().backbone.endpoints(data.images.clone(), 1.0).layer7_out);
        for _ in 0..2 {
            session.run_step(data.clone(), STEP).unwrap();
        }
        let after = values(session.model().backbone.endpoints(data.images, 1.0).layer7_out);
        assert_ne!(before, after);
    }

    #[test]
    fn regularized_step_reports_penalized_loss() {
        let mut session = session(SessionOptions {
            regularize: true,
            freeze_backbone: false,
        });
        let data = batch();
        let scores = session.model().forward(data.images.clone(), 1.0);
        let cross_entropy = scalar(Objective::build(scores, data.labels.clone()).loss);
        let penalty = scalar(session.model().regularization_loss());
        assert!(penalty > 0.0);

        let reported = session.run_step(data, STEP).unwrap();
        let expected = cross_entropy + penalty;
        assert!(
            (reported - expected).abs() <= 1e-4 * expected.abs().max(1.0),
            "reported {reported}, expected {expected}"
        );
    }

    #[test]
    fn empty_batch_is_rejected() {
        let mut session = session(SessionOptions::default());
        let device = Default::default();
        let empty = RoadBatch {
            images: Tensor::<TestBackend, 4>::zeros([0, 3, 32, 64], &device),
            labels: Tensor::<TestBackend, 4>::zeros([0, 32, 64, 2], &device),
        };
        let err = session.run_step(empty, STEP).unwrap_err();
        assert!(err.to_string().contains("empty batch"), "{err}");
    }
}
