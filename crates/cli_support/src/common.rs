use crate::config::RunConfig;
use clap::Args;
use std::path::PathBuf;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_RUNS_DIR: &str = "./runs";

/// Input/output roots shared by the training and export binaries.
#[derive(Debug, Clone, Default, Args)]
pub struct DataPathsArgs {
    /// Root holding `vgg/` and `data_road/` [default: ./data].
    #[arg(long = "data_dir")]
    pub data_dir: Option<PathBuf>,
    /// Directory that receives inference overlays [default: ./runs].
    #[arg(long = "runs_dir")]
    pub runs_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPathsOpts {
    pub data_dir: PathBuf,
    pub runs_dir: PathBuf,
}

impl DataPathsOpts {
    pub fn new(data_dir: PathBuf, runs_dir: PathBuf) -> Self {
        Self { data_dir, runs_dir }
    }

    /// Flag, then config file, then the built-in default.
    pub fn resolve(args: &DataPathsArgs, cfg: &RunConfig) -> Self {
        Self::new(
            args.data_dir
                .clone()
                .or_else(|| cfg.data_dir())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            args.runs_dir
                .clone()
                .or_else(|| cfg.runs_dir())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RUNS_DIR)),
        )
    }

    pub fn vgg_dir(&self) -> PathBuf {
        self.data_dir.join("vgg")
    }

    pub fn training_dir(&self) -> PathBuf {
        self.data_dir.join("data_road").join("training")
    }
}

impl From<&DataPathsArgs> for DataPathsOpts {
    fn from(args: &DataPathsArgs) -> Self {
        DataPathsOpts::resolve(args, &RunConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags_or_config() {
        let opts = DataPathsOpts::from(&DataPathsArgs::default());
        assert_eq!(opts.data_dir, PathBuf::from("./data"));
        assert_eq!(opts.runs_dir, PathBuf::from("./runs"));
        assert_eq!(opts.vgg_dir(), PathBuf::from("./data/vgg"));
        assert_eq!(
            opts.training_dir(),
            PathBuf::from("./data/data_road/training")
        );
    }

    #[test]
    fn flags_override_config() {
        let mut cfg = RunConfig::default();
        cfg.paths.data_dir = Some("/cfg/data".into());
        cfg.paths.runs_dir = Some("/cfg/runs".into());
        let args = DataPathsArgs {
            data_dir: Some("/flag/data".into()),
            runs_dir: None,
        };
        let opts = DataPathsOpts::resolve(&args, &cfg);
        assert_eq!(opts.data_dir, PathBuf::from("/flag/data"));
        assert_eq!(opts.runs_dir, PathBuf::from("/cfg/runs"));
    }
}
