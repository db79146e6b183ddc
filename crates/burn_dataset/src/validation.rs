//! Fail-fast checks on the `data_road` directory tree.

use crate::index::{index_test_images, road_labels};
use crate::types::{
    BurnDatasetError, DatasetResult, LayoutReport, SplitSummary, ValidationOutcome, IMAGE_SUBDIR,
};
use std::path::Path;

/// Frame counts of the published KITTI road benchmark.
pub const KITTI_TRAINING_IMAGES: usize = 289;
pub const KITTI_TESTING_IMAGES: usize = 290;

/// Count frames and road masks in one split. A missing `gt_image_2` is
/// treated as zero labels (held-out splits have none).
pub fn summarize_split(split_dir: &Path) -> DatasetResult<SplitSummary> {
    let images = index_test_images(split_dir)?;
    let labels = match road_labels(split_dir) {
        Ok(labels) => labels,
        Err(BurnDatasetError::MissingDir { .. }) => Default::default(),
        Err(e) => return Err(e),
    };
    let unlabeled = images
        .iter()
        .filter(|p| {
            let name = p.file_name().and_then(|s| s.to_str()).unwrap_or_default();
            !labels.contains_key(name)
        })
        .count();
    Ok(SplitSummary {
        split_dir: split_dir.to_path_buf(),
        images: images.len(),
        labels: labels.len(),
        unlabeled,
    })
}

fn summarize_or_fail(
    split_dir: &Path,
    outcome: &mut ValidationOutcome,
    reasons: &mut Vec<String>,
) -> SplitSummary {
    match summarize_split(split_dir) {
        Ok(summary) => summary,
        Err(e) => {
            *outcome = ValidationOutcome::Fail;
            reasons.push(e.to_string());
            SplitSummary {
                split_dir: split_dir.to_path_buf(),
                ..Default::default()
            }
        }
    }
}

fn check_count(
    label: &str,
    count: usize,
    expected: usize,
    outcome: &mut ValidationOutcome,
    reasons: &mut Vec<String>,
) {
    if count == 0 {
        *outcome = ValidationOutcome::Fail;
        reasons.push(format!("{label}: no images found"));
    } else if count != expected {
        if *outcome == ValidationOutcome::Pass {
            *outcome = ValidationOutcome::Warn;
        }
        reasons.push(format!("{label}: {count} images (KITTI road has {expected})"));
    }
}

/// Inspect `<data_dir>/data_road/{training,testing}`.
///
/// Missing directories, empty splits, or unlabeled training frames fail;
/// counts that differ from the public benchmark only warn.
pub fn verify_layout(data_dir: &Path) -> LayoutReport {
    let road_dir = data_dir.join("data_road");
    let mut outcome = ValidationOutcome::Pass;
    let mut reasons = Vec::new();

    let training = summarize_or_fail(&road_dir.join("training"), &mut outcome, &mut reasons);
    let testing = summarize_or_fail(&road_dir.join("testing"), &mut outcome, &mut reasons);

    if outcome != ValidationOutcome::Fail {
        check_count(
            &format!("training/{IMAGE_SUBDIR}"),
            training.images,
            KITTI_TRAINING_IMAGES,
            &mut outcome,
            &mut reasons,
        );
        check_count(
            &format!("testing/{IMAGE_SUBDIR}"),
            testing.images,
            KITTI_TESTING_IMAGES,
            &mut outcome,
            &mut reasons,
        );
        if training.unlabeled > 0 {
            outcome = ValidationOutcome::Fail;
            reasons.push(format!(
                "training: {} images without a road mask",
                training.unlabeled
            ));
        }
    }

    tracing::debug!(
        "layout check {} for {}",
        outcome.as_str(),
        road_dir.display()
    );
    LayoutReport {
        outcome,
        reasons,
        training,
        testing,
    }
}

impl LayoutReport {
    /// Turn a failing report into an error; warnings are logged.
    pub fn into_result(self) -> DatasetResult<Self> {
        match self.outcome {
            ValidationOutcome::Fail => Err(BurnDatasetError::Layout {
                reasons: self.reasons,
            }),
            ValidationOutcome::Warn => {
                for reason in &self.reasons {
                    tracing::warn!("dataset layout: {reason}");
                }
                Ok(self)
            }
            ValidationOutcome::Pass => Ok(self),
        }
    }
}
