use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_NAME: &str = "fcn-road.toml";
pub const CONFIG_ENV_VAR: &str = "FCN_ROAD_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Values from an optional TOML file. Every field is optional; command-line
/// flags win over anything set here.
///
/// ```toml
/// [paths]
/// data_dir = "~/kitti"
/// model_path = "./model/model.ckpt"
///
/// [train]
/// epochs = 20
/// keep_prob = 0.5
///
/// [model]
/// image_height = 160
/// image_width = 576
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub paths: PathsSection,
    pub train: TrainSection,
    pub model: ModelSection,
    /// File this config came from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsSection {
    pub data_dir: Option<String>,
    pub runs_dir: Option<String>,
    pub model_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainSection {
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub learning_rate: Option<f64>,
    pub keep_prob: Option<f64>,
    pub flip_prob: Option<f32>,
    pub seed: Option<u64>,
    pub regularize: Option<bool>,
    pub freeze_backbone: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSection {
    pub image_height: Option<u32>,
    pub image_width: Option<u32>,
    pub num_classes: Option<usize>,
}

impl RunConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut cfg: RunConfig = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        cfg.source = Some(path.to_path_buf());
        Ok(cfg)
    }

    /// Find the config to use: `explicit` first, then `$FCN_ROAD_CONFIG`, then
    /// `fcn-road.toml` in the working directory. No file means all defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_path(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_path(&expand_path(&path));
        }
        let local = Path::new(DEFAULT_CONFIG_NAME);
        if local.exists() {
            return Self::from_path(local);
        }
        Ok(Self::default())
    }

    pub fn data_dir(&self) -> Option<PathBuf> {
        self.paths.data_dir.as_deref().map(expand_path)
    }

    pub fn runs_dir(&self) -> Option<PathBuf> {
        self.paths.runs_dir.as_deref().map(expand_path)
    }

    pub fn model_path(&self) -> Option<PathBuf> {
        self.paths.model_path.as_deref().map(expand_path)
    }
}

/// Expand a leading `~` and `${VAR}` references. Unknown variables are left
/// as written.
pub fn expand_path(raw: &str) -> PathBuf {
    let mut out = raw.to_string();
    if let Some(stripped) = out.strip_prefix('~') {
        if let Ok(home) = std::env::var("HOME") {
            out = format!("{home}{stripped}");
        }
    }
    PathBuf::from(expand_env(&out))
}

fn expand_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match std::env::var(key) {
                    Ok(val) => out.push_str(&val),
                    Err(_) => out.push_str(&format!("${{{key}}}")),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_variables_are_kept_verbatim() {
        assert_eq!(
            expand_env("a/${FCN_ROAD_SURELY_UNSET_VAR}/b"),
            "a/${FCN_ROAD_SURELY_UNSET_VAR}/b"
        );
        assert_eq!(expand_env("plain/path"), "plain/path");
        assert_eq!(expand_env("broken/${open"), "broken/${open");
    }

    #[test]
    fn known_variables_expand() {
        let path = std::env::var("PATH").unwrap_or_default();
        assert_eq!(expand_env("${PATH}/x"), format!("{path}/x"));
    }
}
