//! Batch iteration for training.

use crate::aug::{DatasetConfig, TransformPipeline};
use crate::index::index_split;
use crate::types::{DatasetResult, SamplePair, NUM_CLASSES};
use burn::tensor::{backend::Backend, Tensor, TensorData};
use rand::{seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use std::cell::Cell;
use std::path::Path;
use std::time::{Duration, Instant};

/// A training batch: images `[N, 3, H, W]` and one-hot labels `[N, H, W, C]`.
#[derive(Debug, Clone)]
pub struct RoadBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub labels: Tensor<B, 4>,
}

impl<B: Backend> RoadBatch<B> {
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An indexed training split. Each call to [`RoadDataset::iter`] starts a new
/// pass in a freshly shuffled order.
pub struct RoadDataset {
    pairs: Vec<SamplePair>,
    cfg: DatasetConfig,
    passes: Cell<u64>,
}

impl RoadDataset {
    pub fn from_split(split_dir: &Path, cfg: DatasetConfig) -> DatasetResult<Self> {
        let pairs = index_split(split_dir)?;
        tracing::info!(
            "indexed {} training pairs under {} ({})",
            pairs.len(),
            split_dir.display(),
            TransformPipeline::from_config(&cfg).describe()
        );
        Ok(Self::from_pairs(pairs, cfg))
    }

    pub fn from_pairs(pairs: Vec<SamplePair>, cfg: DatasetConfig) -> Self {
        Self {
            pairs,
            cfg,
            passes: Cell::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.cfg
    }

    pub fn iter(&self) -> BatchIter {
        let pass = self.passes.get();
        self.passes.set(pass + 1);
        let mut order = self.pairs.clone();
        if self.cfg.shuffle {
            let mut rng = match self.cfg.seed {
                Some(seed) => rand::rngs::StdRng::seed_from_u64(seed.wrapping_add(pass)),
                None => rand::rngs::StdRng::from_rng(&mut rand::rng()),
            };
            order.shuffle(&mut rng);
        }
        BatchIter::new(order, &self.cfg, pass)
    }
}

pub struct BatchIter {
    pairs: Vec<SamplePair>,
    cursor: usize,
    pass: u64,
    drop_last: bool,
    pipeline: TransformPipeline,
    processed_samples: usize,
    processed_batches: usize,
    total_load_time: Duration,
}

impl BatchIter {
    fn new(pairs: Vec<SamplePair>, cfg: &DatasetConfig, pass: u64) -> Self {
        Self {
            pairs,
            cursor: 0,
            pass,
            drop_last: cfg.drop_last,
            pipeline: TransformPipeline::from_config(cfg),
            processed_samples: 0,
            processed_batches: 0,
            total_load_time: Duration::ZERO,
        }
    }

    pub fn next_batch<B: Backend>(
        &mut self,
        batch_size: usize,
        device: &B::Device,
    ) -> DatasetResult<Option<RoadBatch<B>>> {
        let batch_size = batch_size.max(1);
        if self.cursor >= self.pairs.len() {
            self.log_summary();
            return Ok(None);
        }
        let end = (self.cursor + batch_size).min(self.pairs.len());
        if self.drop_last && end - self.cursor < batch_size {
            self.cursor = self.pairs.len();
            self.log_summary();
            return Ok(None);
        }
        let slice = &self.pairs[self.cursor..end];
        let offset = self.cursor;
        self.cursor = end;

        let t_load = Instant::now();
        let pipeline = &self.pipeline;
        let salt_base = self.pass.wrapping_mul(1_000_003);
        let samples = slice
            .par_iter()
            .enumerate()
            .map(|(i, pair)| pipeline.load(pair, salt_base.wrapping_add((offset + i) as u64)))
            .collect::<DatasetResult<Vec<_>>>()?;
        self.total_load_time += t_load.elapsed();

        let shape = self.pipeline.image_shape;
        let (h, w) = (shape.height as usize, shape.width as usize);
        let n = samples.len();
        let mut images_buf = Vec::with_capacity(n * 3 * shape.pixels());
        let mut labels_buf = Vec::with_capacity(n * shape.pixels() * NUM_CLASSES);
        for sample in samples {
            images_buf.extend_from_slice(&sample.image_chw);
            labels_buf.extend_from_slice(&sample.label_hwc);
        }

        let images =
            Tensor::<B, 4>::from_data(TensorData::new(images_buf, [n, 3, h, w]), device);
        let labels = Tensor::<B, 4>::from_data(
            TensorData::new(labels_buf, [n, h, w, NUM_CLASSES]),
            device,
        );

        self.processed_samples += n;
        self.processed_batches += 1;
        Ok(Some(RoadBatch { images, labels }))
    }

    fn log_summary(&self) {
        if self.processed_batches == 0 {
            return;
        }
        tracing::debug!(
            "[dataset] pass={} batches={} samples={} avg_load_ms={:.2}",
            self.pass,
            self.processed_batches,
            self.processed_samples,
            self.total_load_time.as_secs_f64() * 1000.0 / self.processed_batches as f64
        );
    }
}
