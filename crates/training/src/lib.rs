#![recursion_limit = "256"]

pub mod checkpoint;
pub mod objective;
pub mod run;
pub mod session;
pub mod trainer;

pub use checkpoint::{restore_checkpoint, save_checkpoint, CheckpointMeta};
pub use objective::{Objective, ObjectiveOutput, UpdateStep};
pub use run::{run_train, run_with_settings, RunOutcome, RunSettings, TrainArgs};
pub use session::{DatasetSource, FcnSession, SessionOptions};
pub use trainer::{
    BatchSource, StepInputs, TrainReport, TrainSession, Trainer, TrainerConfig, TrainerState,
    BEST_LOSS_SENTINEL,
};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;

pub type ADBackend = burn::backend::Autodiff<TrainBackend>;
