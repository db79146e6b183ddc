//! Checkpoint files: `<model_path>.bin` (Burn record) and `<model_path>.json`.

use anyhow::Context;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use burn_dataset::ImageShape;
use chrono::{DateTime, Utc};
use models::{Fcn, Vgg16Config};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub format_version: u32,
    pub saved_at: DateTime<Utc>,
    pub epoch: usize,
    pub loss: f32,
    pub num_classes: usize,
    pub image_height: u32,
    pub image_width: u32,
    pub backbone: Vgg16Config,
    pub num_params: usize,
}

impl CheckpointMeta {
    pub fn describe<B: Backend>(
        model: &Fcn<B>,
        backbone: &Vgg16Config,
        shape: ImageShape,
        epoch: usize,
        loss: f32,
    ) -> Self {
        Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            saved_at: Utc::now(),
            epoch,
            loss,
            num_classes: model.num_classes(),
            image_height: shape.height,
            image_width: shape.width,
            backbone: backbone.clone(),
            num_params: model.num_params(),
        }
    }

    /// Error out when a stored checkpoint cannot be loaded into `current`.
    pub fn check_compatible(&self, current: &CheckpointMeta) -> anyhow::Result<()> {
        if self.format_version > CHECKPOINT_FORMAT_VERSION {
            anyhow::bail!(
                "checkpoint format {} is newer than supported {}",
                self.format_version,
                CHECKPOINT_FORMAT_VERSION
            );
        }
        if self.num_classes != current.num_classes {
            anyhow::bail!(
                "checkpoint has {} classes, model has {}",
                self.num_classes,
                current.num_classes
            );
        }
        if (self.image_height, self.image_width) != (current.image_height, current.image_width) {
            anyhow::bail!(
                "checkpoint was trained at {}x{}, run uses {}x{}",
                self.image_height,
                self.image_width,
                current.image_height,
                current.image_width
            );
        }
        if self.backbone != current.backbone {
            anyhow::bail!(
                "checkpoint backbone {:?} does not match loaded backbone {:?}",
                self.backbone,
                current.backbone
            );
        }
        if self.num_params != current.num_params {
            anyhow::bail!(
                "checkpoint has {} parameters, model has {}",
                self.num_params,
                current.num_params
            );
        }
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

pub fn weights_path(model_path: &Path) -> PathBuf {
    with_suffix(model_path, ".bin")
}

pub fn meta_path(model_path: &Path) -> PathBuf {
    with_suffix(model_path, ".json")
}

pub fn checkpoint_exists(model_path: &Path) -> bool {
    weights_path(model_path).is_file()
}

/// Write weights and the metadata sidecar through temporary siblings, then
/// rename both into place.
pub fn save_checkpoint<B: Backend>(
    model: &Fcn<B>,
    model_path: &Path,
    meta: &CheckpointMeta,
) -> anyhow::Result<()> {
    if let Some(parent) = model_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    // The recorder forces a `.bin` extension, so the temp name keeps it.
    let tmp_weights = with_suffix(model_path, ".tmp.bin");
    let tmp_meta = with_suffix(model_path, ".tmp.json");

    let json = serde_json::to_vec_pretty(meta)?;
    fs::write(&tmp_meta, json)
        .with_context(|| format!("failed to write {}", tmp_meta.display()))?;
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(tmp_weights.as_path(), &recorder)
        .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))?;

    promote(&tmp_weights, &weights_path(model_path))?;
    promote(&tmp_meta, &meta_path(model_path))?;
    tracing::info!("Model saved to {}", model_path.display());
    Ok(())
}

fn promote(from: &Path, to: &Path) -> anyhow::Result<()> {
    fs::rename(from, to)
        .with_context(|| format!("failed to move {} to {}", from.display(), to.display()))
}

pub fn read_meta(model_path: &Path) -> anyhow::Result<CheckpointMeta> {
    let path = meta_path(model_path);
    let raw = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("invalid metadata in {}", path.display()))
}

/// Load weights saved by [`save_checkpoint`] into `model`.
///
/// `current` describes the model being restored into; the stored metadata
/// must agree with it. A checkpoint without a sidecar is loaded with a warning.
pub fn restore_checkpoint<B: Backend>(
    model: Fcn<B>,
    model_path: &Path,
    current: &CheckpointMeta,
    device: &B::Device,
) -> anyhow::Result<Fcn<B>> {
    let weights = weights_path(model_path);
    if !weights.is_file() {
        anyhow::bail!("no checkpoint found at {}", weights.display());
    }
    if meta_path(model_path).is_file() {
        let stored = read_meta(model_path)?;
        stored
            .check_compatible(current)
            .with_context(|| format!("cannot restore {}", model_path.display()))?;
        tracing::debug!(
            "checkpoint from epoch {} (loss {:.3}) saved at {}",
            stored.epoch,
            stored.loss,
            stored.saved_at
        );
    } else {
        tracing::warn!(
            "{} has no metadata; skipping compatibility checks",
            weights.display()
        );
    }

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let model = model
        .load_file(weights.as_path(), &recorder, device)
        .map_err(|e| anyhow::anyhow!("failed to load checkpoint {}: {e}", weights.display()))?;
    tracing::info!("Model restored from {}", model_path.display());
    Ok(model)
}
