//! Dataset indexing, preprocessing, and Burn-compatible batching for road segmentation.
//!
//! This crate provides utilities for:
//! - Pairing camera frames with their road ground-truth masks
//! - Resizing, optional flip augmentation, and one-hot label encoding
//! - Pull-based batch iteration producing Burn tensors
//! - Fail-fast layout checks for the `data_road` directory tree

pub mod aug;
pub mod batch;
pub mod index;
pub mod types;
pub mod validation;

pub use aug::{DatasetConfig, TransformPipeline};
pub use batch::{BatchIter, RoadBatch, RoadDataset};
pub use index::{index_split, index_test_images, label_key};
pub use types::*;
pub use validation::{summarize_split, verify_layout};
