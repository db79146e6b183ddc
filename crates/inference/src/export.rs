//! Overlay export for the held-out split.

use anyhow::Context;
use burn_dataset::aug::resize_image;
use burn_dataset::{index_test_images, ImageShape};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use vision_core::interfaces::Segmenter;
use vision_core::overlay::{overlay_mask, ROAD_OVERLAY};

/// Road probability must exceed this for a pixel to be painted.
pub const ROAD_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub output_dir: PathBuf,
    pub written: usize,
}

/// `runs_dir/<unix seconds>.<microseconds>`.
pub fn run_output_dir(runs_dir: &Path, now: DateTime<Utc>) -> PathBuf {
    runs_dir.join(format!(
        "{}.{:06}",
        now.timestamp(),
        now.timestamp_subsec_micros()
    ))
}

/// Segment every `data_road/testing/image_2/*.png` under `data_dir` and write
/// the overlays into a fresh timestamped directory under `runs_dir`.
pub fn save_inference_samples<S: Segmenter + ?Sized>(
    runs_dir: &Path,
    data_dir: &Path,
    segmenter: &mut S,
) -> anyhow::Result<ExportSummary> {
    let output_dir = run_output_dir(runs_dir, Utc::now());
    if output_dir.exists() {
        fs::remove_dir_all(&output_dir)
            .with_context(|| format!("failed to clear {}", output_dir.display()))?;
    }
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    tracing::info!(
        "Training Finished. Saving test images to: {}",
        output_dir.display()
    );

    let test_dir = data_dir.join("data_road").join("testing");
    let images = index_test_images(&test_dir)
        .with_context(|| format!("failed to list test images under {}", test_dir.display()))?;
    let (width, height) = segmenter.input_size();
    let shape = ImageShape::new(height, width);

    let mut written = 0;
    for path in images {
        let name = path
            .file_name()
            .with_context(|| format!("test image without file name: {}", path.display()))?
            .to_owned();
        let image = image::open(&path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgb8();
        let resized = resize_image(&image, shape);
        let mask = segmenter.segment(&resized);
        let road = mask.threshold(ROAD_THRESHOLD);
        tracing::debug!(
            "{}: road fraction {:.3}",
            path.display(),
            mask.foreground_fraction(ROAD_THRESHOLD)
        );
        let overlay = overlay_mask(&resized, &road, ROAD_OVERLAY).with_context(|| {
            format!(
                "mask {}x{} does not match image {}x{}",
                mask.width, mask.height, width, height
            )
        })?;
        let out_path = output_dir.join(name);
        overlay
            .save(&out_path)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        written += 1;
    }
    tracing::debug!("wrote {written} overlays");

    Ok(ExportSummary {
        output_dir,
        written,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn output_dir_uses_seconds_and_micros() {
        let now = Utc
            .timestamp_opt(1_700_000_000, 42_000)
            .single()
            .unwrap();
        let dir = run_output_dir(Path::new("runs"), now);
        assert_eq!(dir, PathBuf::from("runs/1700000000.000042"));
    }
}
