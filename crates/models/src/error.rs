use std::path::PathBuf;
use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("backbone manifest {path} is not valid: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("backbone bundle tag mismatch: expected {expected:?}, found {found:?}")]
    TagMismatch { expected: String, found: String },
    #[error("backbone bundle does not export tensor {name:?}")]
    MissingTensor { name: String },
    #[error("weight record {path}: {msg}")]
    Record { path: PathBuf, msg: String },
    #[error("input {height}x{width} is not divisible by the backbone stride {factor}")]
    InputShape {
        height: usize,
        width: usize,
        factor: usize,
    },
}
