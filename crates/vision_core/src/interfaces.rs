use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Per-pixel foreground probabilities for one image, row-major.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    /// Probability of the foreground (road) class for each pixel, in 0..=1.
    pub scores: Vec<f32>,
}

impl SegmentationMask {
    pub fn new(width: u32, height: u32, scores: Vec<f32>) -> Self {
        debug_assert_eq!(scores.len(), (width * height) as usize);
        Self {
            width,
            height,
            scores,
        }
    }

    /// Pixels whose score is strictly above `threshold`.
    pub fn threshold(&self, threshold: f32) -> Vec<bool> {
        self.scores.iter().map(|s| *s > threshold).collect()
    }

    pub fn foreground_fraction(&self, threshold: f32) -> f32 {
        if self.scores.is_empty() {
            return 0.0;
        }
        let hits = self.scores.iter().filter(|s| **s > threshold).count();
        hits as f32 / self.scores.len() as f32
    }
}

/// Runs a segmentation model on an image.
///
/// Implementations resize internally; the returned mask matches the model's
/// working resolution, not necessarily the input image.
pub trait Segmenter {
    fn segment(&mut self, image: &RgbImage) -> SegmentationMask;

    /// Working resolution as (width, height).
    fn input_size(&self) -> (u32, u32);
}
