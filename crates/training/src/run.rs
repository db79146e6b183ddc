//! `train` binary: flags, config resolution, and the end-to-end run.

use crate::objective::Objective;
use crate::session::{DatasetSource, FcnSession, SessionOptions};
use crate::trainer::{TrainReport, Trainer, TrainerConfig};
use crate::ADBackend;
use anyhow::Context;
use burn::module::AutodiffModule;
use burn::tensor::backend::Backend;
use burn_dataset::{verify_layout, DatasetConfig, ImageShape, RoadDataset, NUM_CLASSES};
use clap::{Parser, ValueEnum};
use cli_support::{log_gpu_status, platform_probe, DataPathsArgs, DataPathsOpts, RunConfig};
use inference::{save_inference_samples, ExportSummary, FcnSegmenter};
use models::{check_input_shape, load_vgg, FcnConfig};
use std::path::PathBuf;

pub const DEFAULT_MODEL_PATH: &str = "./model/model.ckpt";
pub const DEFAULT_EPOCHS: usize = 50;
pub const DEFAULT_BATCH_SIZE: usize = 8;
pub const DEFAULT_LEARNING_RATE: f64 = 1e-3;
pub const DEFAULT_KEEP_PROB: f64 = 0.8;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    #[value(name = "ndarray")]
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "train",
    about = "Train an FCN-8 road segmenter on KITTI road and export test overlays"
)]
pub struct TrainArgs {
    /// Path a model is loaded from (with --load) and saved to [default: ./model/model.ckpt].
    #[arg(long = "model_path")]
    pub model_path: Option<PathBuf>,
    /// Restore the model from --model_path before training.
    #[arg(long, default_value_t = false)]
    pub load: bool,
    /// Number of epochs; 0 skips training [default: 50].
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Batch size [default: 8].
    #[arg(long = "batch_size")]
    pub batch_size: Option<usize>,
    /// Learning rate [default: 0.001].
    #[arg(long = "learning_rate", allow_negative_numbers = true)]
    pub learning_rate: Option<f64>,
    /// Dropout keep probability during training [default: 0.8].
    #[arg(long = "keep_prob")]
    pub keep_prob: Option<f64>,
    #[command(flatten)]
    pub paths: DataPathsArgs,
    /// TOML run config (falls back to $FCN_ROAD_CONFIG, then ./fcn-road.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// Keep the pretrained backbone fixed; only the decoder learns.
    #[arg(long = "freeze_backbone", default_value_t = false)]
    pub freeze_backbone: bool,
    /// Add the decoder L2 penalty to the loss.
    #[arg(long, default_value_t = false)]
    pub regularize: bool,
    /// Probability of a horizontal flip per training sample [default: 0].
    #[arg(long = "flip_prob")]
    pub flip_prob: Option<f32>,
    /// Seed for shuffling and augmentation.
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Fully resolved run parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub model_path: PathBuf,
    pub load: bool,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub keep_prob: f64,
    pub paths: DataPathsOpts,
    pub image_shape: ImageShape,
    pub num_classes: usize,
    pub flip_prob: f32,
    pub seed: Option<u64>,
    pub regularize: bool,
    pub freeze_backbone: bool,
}

impl RunSettings {
    /// Flag, then config file, then the built-in default.
    pub fn resolve(args: &TrainArgs, cfg: &RunConfig) -> anyhow::Result<Self> {
        let default_shape = ImageShape::default();
        let settings = Self {
            model_path: args
                .model_path
                .clone()
                .or_else(|| cfg.model_path())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            load: args.load,
            epochs: args.epochs.or(cfg.train.epochs).unwrap_or(DEFAULT_EPOCHS),
            batch_size: args
                .batch_size
                .or(cfg.train.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            learning_rate: args
                .learning_rate
                .or(cfg.train.learning_rate)
                .unwrap_or(DEFAULT_LEARNING_RATE),
            keep_prob: args
                .keep_prob
                .or(cfg.train.keep_prob)
                .unwrap_or(DEFAULT_KEEP_PROB),
            paths: DataPathsOpts::resolve(&args.paths, cfg),
            image_shape: ImageShape::new(
                cfg.model.image_height.unwrap_or(default_shape.height),
                cfg.model.image_width.unwrap_or(default_shape.width),
            ),
            num_classes: cfg.model.num_classes.unwrap_or(NUM_CLASSES),
            flip_prob: args.flip_prob.or(cfg.train.flip_prob).unwrap_or(0.0),
            seed: args.seed.or(cfg.train.seed),
            regularize: args.regularize || cfg.train.regularize.unwrap_or(false),
            freeze_backbone: args.freeze_backbone || cfg.train.freeze_backbone.unwrap_or(false),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        if !(self.keep_prob > 0.0 && self.keep_prob <= 1.0) {
            anyhow::bail!("keep_prob must be in (0, 1], got {}", self.keep_prob);
        }
        if !(self.learning_rate > 0.0) {
            anyhow::bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if !(0.0..=1.0).contains(&self.flip_prob) {
            anyhow::bail!("flip_prob must be in [0, 1], got {}", self.flip_prob);
        }
        if self.num_classes != NUM_CLASSES {
            anyhow::bail!(
                "labels are encoded as {} classes, config asks for {}",
                NUM_CLASSES,
                self.num_classes
            );
        }
        check_input_shape(
            self.image_shape.height as usize,
            self.image_shape.width as usize,
        )?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub report: Option<TrainReport>,
    pub export: ExportSummary,
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            tracing::warn!("built with backend-wgpu; training will still use the WGPU backend despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;
    let cfg = RunConfig::discover(args.config.as_deref())?;
    if let Some(source) = &cfg.source {
        tracing::info!("using config {}", source.display());
    }
    let settings = RunSettings::resolve(&args, &cfg)?;
    run_with_settings(&settings)?;
    Ok(())
}

/// Layout check, backbone load, optional restore, training, then export.
pub fn run_with_settings(settings: &RunSettings) -> anyhow::Result<RunOutcome> {
    let paths = &settings.paths;
    verify_layout(&paths.data_dir)
        .into_result()
        .with_context(|| format!("dataset under {} is not usable", paths.data_dir.display()))?;
    log_gpu_status(platform_probe().as_ref());

    let device = <ADBackend as Backend>::Device::default();
    let vgg_dir = paths.vgg_dir();
    let (backbone, backbone_cfg) = load_vgg::<ADBackend>(&vgg_dir, &device)
        .with_context(|| format!("failed to load backbone from {}", vgg_dir.display()))?;
    let model = FcnConfig::new(backbone_cfg.clone(), settings.num_classes)
        .init_with_backbone(backbone, &device);

    let mut session = FcnSession::new(
        model,
        Objective::update_step(),
        SessionOptions {
            regularize: settings.regularize,
            freeze_backbone: settings.freeze_backbone,
        },
        backbone_cfg,
        settings.image_shape,
    );
    if settings.load {
        session.restore(&settings.model_path, &device)?;
    }

    let report = if settings.epochs > 0 {
        let dataset = RoadDataset::from_split(
            &paths.training_dir(),
            DatasetConfig {
                image_shape: settings.image_shape,
                flip_horizontal_prob: settings.flip_prob,
                seed: settings.seed,
                ..Default::default()
            },
        )?;
        let source = DatasetSource::<ADBackend>::new(dataset, device.clone());
        let mut trainer = Trainer::new(TrainerConfig {
            epochs: settings.epochs,
            batch_size: settings.batch_size,
            keep_prob: settings.keep_prob,
            learning_rate: settings.learning_rate,
            save_path: Some(settings.model_path.clone()),
        });
        Some(trainer.train(&source, &mut session)?)
    } else {
        None
    };

    let model = session.into_model().valid();
    let mut segmenter = FcnSegmenter::new(model, settings.image_shape, device)?;
    let export = save_inference_samples(&paths.runs_dir, &paths.data_dir, &mut segmenter)?;
    Ok(RunOutcome { report, export })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> TrainArgs {
        TrainArgs::try_parse_from(std::iter::once("train").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_match_reference_run() {
        let settings = RunSettings::resolve(&parse(&[]), &RunConfig::default()).unwrap();
        assert_eq!(settings.model_path, PathBuf::from("./model/model.ckpt"));
        assert!(!settings.load);
        assert_eq!(settings.epochs, 50);
        assert_eq!(settings.batch_size, 8);
        assert_eq!(settings.learning_rate, 1e-3);
        assert_eq!(settings.keep_prob, 0.8);
        assert_eq!(settings.image_shape, ImageShape::new(160, 576));
        assert_eq!(settings.paths.data_dir, PathBuf::from("./data"));
        assert_eq!(settings.paths.runs_dir, PathBuf::from("./runs"));
    }

    #[test]
    fn underscore_flags_parse() {
        let args = parse(&[
            "--model_path",
            "/tmp/m.ckpt",
            "--load",
            "--epochs",
            "0",
            "--batch_size",
            "2",
            "--learning_rate",
            "0.01",
            "--keep_prob",
            "0.5",
            "--data_dir",
            "/d",
            "--runs_dir",
            "/r",
            "--freeze_backbone",
            "--flip_prob",
            "0.5",
            "--backend",
            "ndarray",
        ]);
        let settings = RunSettings::resolve(&args, &RunConfig::default()).unwrap();
        assert_eq!(settings.model_path, PathBuf::from("/tmp/m.ckpt"));
        assert!(settings.load);
        assert_eq!(settings.epochs, 0);
        assert_eq!(settings.batch_size, 2);
        assert_eq!(settings.learning_rate, 0.01);
        assert_eq!(settings.keep_prob, 0.5);
        assert_eq!(settings.paths.data_dir, PathBuf::from("/d"));
        assert!(settings.freeze_backbone);
        assert_eq!(settings.flip_prob, 0.5);
        assert_eq!(args.backend, BackendKind::NdArray);
    }

    #[test]
    fn flags_beat_config_and_config_beats_defaults() {
        let mut cfg = RunConfig::default();
        cfg.train.epochs = Some(7);
        cfg.train.batch_size = Some(3);
        cfg.train.regularize = Some(true);
        cfg.model.image_height = Some(64);
        cfg.model.image_width = Some(96);
        let settings = RunSettings::resolve(&parse(&["--epochs", "2"]), &cfg).unwrap();
        assert_eq!(settings.epochs, 2);
        assert_eq!(settings.batch_size, 3);
        assert!(settings.regularize);
        assert_eq!(settings.image_shape, ImageShape::new(64, 96));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let cfg = RunConfig::default();
        assert!(RunSettings::resolve(&parse(&["--keep_prob", "0"]), &cfg).is_err());
        assert!(RunSettings::resolve(&parse(&["--batch_size", "0"]), &cfg).is_err());
        let negative = parse(&["--learning_rate", "-1"]);
        assert_eq!(negative.learning_rate, Some(-1.0));
        assert!(RunSettings::resolve(&negative, &cfg).is_err());
        assert!(RunSettings::resolve(&parse(&["--learning_rate", "0"]), &cfg).is_err());

        let mut odd = RunConfig::default();
        odd.model.image_height = Some(100);
        assert!(RunSettings::resolve(&parse(&[]), &odd).is_err());
    }

    #[test]
    fn wgpu_requires_feature() {
        if !cfg!(feature = "backend-wgpu") {
            assert!(validate_backend_choice(BackendKind::Wgpu).is_err());
        }
        assert!(validate_backend_choice(BackendKind::NdArray).is_ok());
    }
}
