//! Pairing camera frames with their ground-truth masks.

use crate::types::{BurnDatasetError, DatasetResult, SamplePair, IMAGE_SUBDIR, LABEL_SUBDIR};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Map a ground-truth file name to the frame it annotates.
///
/// `um_road_000000.png` and `um_lane_000000.png` both key to `um_000000.png`.
pub fn label_key(file_name: &str) -> String {
    for token in ["_road_", "_lane_"] {
        if let Some(pos) = file_name.find(token) {
            let mut key = String::with_capacity(file_name.len());
            key.push_str(&file_name[..pos]);
            key.push('_');
            key.push_str(&file_name[pos + token.len()..]);
            return key;
        }
    }
    file_name.to_string()
}

fn list_png(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(BurnDatasetError::MissingDir {
            path: dir.to_path_buf(),
        });
    }
    let entries = fs::read_dir(dir).map_err(|e| BurnDatasetError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let mut out = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("png") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Road masks under `<split>/gt_image_2`, keyed by the frame file name.
pub(crate) fn road_labels(split_dir: &Path) -> DatasetResult<HashMap<String, PathBuf>> {
    let labels = list_png(&split_dir.join(LABEL_SUBDIR))?;
    Ok(labels
        .into_iter()
        .filter(|p| file_name(p).contains("_road_"))
        .map(|p| (label_key(&file_name(&p)), p))
        .collect())
}

/// Index a training split (`image_2` + `gt_image_2`) into sorted image/mask pairs.
///
/// Every frame must have a road mask; lane masks are ignored.
pub fn index_split(split_dir: &Path) -> DatasetResult<Vec<SamplePair>> {
    let images = list_png(&split_dir.join(IMAGE_SUBDIR))?;
    let labels = road_labels(split_dir)?;
    images
        .into_iter()
        .map(|image| {
            let key = file_name(&image);
            match labels.get(&key) {
                Some(label) => Ok(SamplePair {
                    image,
                    label: label.clone(),
                }),
                None => Err(BurnDatasetError::MissingLabel { image, key }),
            }
        })
        .collect()
}

/// Sorted frames of a held-out split (`<split>/image_2/*.png`).
pub fn index_test_images(split_dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    list_png(&split_dir.join(IMAGE_SUBDIR))
}
