//! Core types, error definitions, and data structures for burn_dataset.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, BurnDatasetError>;

/// Subdirectory holding camera frames within a split.
pub const IMAGE_SUBDIR: &str = "image_2";
/// Subdirectory holding ground-truth masks within a split.
pub const LABEL_SUBDIR: &str = "gt_image_2";
/// Ground-truth pixels of this colour are background; everything else is road.
pub const DEFAULT_BACKGROUND: [u8; 3] = [255, 0, 0];
/// The one-hot encoding is background/road.
pub const NUM_CLASSES: usize = 2;

#[derive(Debug, Error)]
pub enum BurnDatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no ground-truth mask for {image} (expected key {key})")]
    MissingLabel { image: PathBuf, key: String },
    #[error("dataset directory missing: {path}")]
    MissingDir { path: PathBuf },
    #[error("dataset layout check failed: {}", reasons.join("; "))]
    Layout { reasons: Vec<String> },
}

/// Target size for every image and mask fed to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: u32,
    pub width: u32,
}

impl ImageShape {
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }

    pub fn pixels(&self) -> usize {
        self.height as usize * self.width as usize
    }
}

impl Default for ImageShape {
    fn default() -> Self {
        Self::new(160, 576)
    }
}

/// One camera frame and its ground-truth mask on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplePair {
    pub image: PathBuf,
    pub label: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RoadSample {
    /// Image in CHW layout, raw 0..=255 intensities.
    pub image_chw: Vec<f32>,
    /// One-hot labels in HWC layout (`NUM_CLASSES` channels).
    pub label_hwc: Vec<f32>,
    pub shape: ImageShape,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplitSummary {
    pub split_dir: PathBuf,
    pub images: usize,
    pub labels: usize,
    /// Images that have no `_road_` mask.
    pub unlabeled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Pass,
    Warn,
    Fail,
}

impl ValidationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationOutcome::Pass => "pass",
            ValidationOutcome::Warn => "warn",
            ValidationOutcome::Fail => "fail",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutReport {
    pub outcome: ValidationOutcome,
    pub reasons: Vec<String>,
    pub training: SplitSummary,
    pub testing: SplitSummary,
}
