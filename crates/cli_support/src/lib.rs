pub mod common;
pub mod config;
pub mod gpu;

pub use common::{DataPathsArgs, DataPathsOpts};
pub use config::{expand_path, ConfigError, RunConfig, CONFIG_ENV_VAR, DEFAULT_CONFIG_NAME};
pub use gpu::{log_gpu_status, platform_probe, GpuProbe, GpuStatus};
