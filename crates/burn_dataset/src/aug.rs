//! Resize, augmentation, and label encoding pipeline.

use crate::types::{
    BurnDatasetError, DatasetResult, ImageShape, RoadSample, SamplePair, DEFAULT_BACKGROUND,
    NUM_CLASSES,
};
use image::imageops::FilterType;
use image::RgbImage;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Every image and mask is resized to this shape.
    pub image_shape: ImageShape,
    /// Ground-truth colour that marks background pixels.
    pub background_color: [u8; 3],
    /// Probability of flipping image and mask horizontally together.
    pub flip_horizontal_prob: f32,
    /// Shuffle sample order on every pass.
    pub shuffle: bool,
    /// Seed for reproducible shuffling and augmentation.
    pub seed: Option<u64>,
    /// Drop the last partial batch.
    pub drop_last: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            image_shape: ImageShape::default(),
            background_color: DEFAULT_BACKGROUND,
            flip_horizontal_prob: 0.0,
            shuffle: true,
            seed: None,
            drop_last: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformPipeline {
    pub image_shape: ImageShape,
    pub background_color: [u8; 3],
    pub flip_horizontal_prob: f32,
    pub seed: Option<u64>,
}

impl TransformPipeline {
    pub fn from_config(cfg: &DatasetConfig) -> Self {
        Self {
            image_shape: cfg.image_shape,
            background_color: cfg.background_color,
            flip_horizontal_prob: cfg.flip_horizontal_prob,
            seed: cfg.seed,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "shape={}x{} background={:?} flip_p={:.2} seed={}",
            self.image_shape.height,
            self.image_shape.width,
            self.background_color,
            self.flip_horizontal_prob,
            self.seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }

    /// Decode, resize, and encode one pair. `salt` mixes into the seed so each
    /// sample/epoch draws its own augmentation.
    pub fn load(&self, pair: &SamplePair, salt: u64) -> DatasetResult<RoadSample> {
        let image = open_rgb(&pair.image)?;
        let gt = open_rgb(&pair.label)?;
        Ok(self.apply(image, gt, salt))
    }

    pub fn apply(&self, image: RgbImage, gt: RgbImage, salt: u64) -> RoadSample {
        let ImageShape { height, width } = self.image_shape;
        let mut image = resize_image(&image, self.image_shape);
        // Nearest keeps mask colours exact so the background test stays crisp.
        let mut gt = image::imageops::resize(&gt, width, height, FilterType::Nearest);

        if self.flip_horizontal_prob > 0.0 {
            let flip = match self.seed {
                Some(seed) => {
                    rand::rngs::StdRng::seed_from_u64(seed ^ salt).random::<f32>()
                        < self.flip_horizontal_prob
                }
                None => rand::rng().random::<f32>() < self.flip_horizontal_prob,
            };
            if flip {
                image::imageops::flip_horizontal_in_place(&mut image);
                image::imageops::flip_horizontal_in_place(&mut gt);
            }
        }

        RoadSample {
            image_chw: image_to_chw(&image),
            label_hwc: one_hot_labels(&gt, self.background_color),
            shape: self.image_shape,
        }
    }
}

pub(crate) fn open_rgb(path: &std::path::Path) -> DatasetResult<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| BurnDatasetError::Image {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Resize a camera frame to the network shape (no-op when it already matches).
pub fn resize_image(image: &RgbImage, shape: ImageShape) -> RgbImage {
    if image.dimensions() == (shape.width, shape.height) {
        return image.clone();
    }
    image::imageops::resize(image, shape.width, shape.height, FilterType::Triangle)
}

/// Planar CHW floats with raw 0..=255 intensities.
pub fn image_to_chw(image: &RgbImage) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut chw = vec![0.0f32; plane * 3];
    for (x, y, pixel) in image.enumerate_pixels() {
        let base = (y * width + x) as usize;
        chw[base] = pixel[0] as f32;
        chw[plane + base] = pixel[1] as f32;
        chw[2 * plane + base] = pixel[2] as f32;
    }
    chw
}

/// HWC one-hot: channel 0 = background colour, channel 1 = everything else.
pub fn one_hot_labels(gt: &RgbImage, background: [u8; 3]) -> Vec<f32> {
    let mut out = Vec::with_capacity(gt.len() / 3 * NUM_CLASSES);
    for pixel in gt.pixels() {
        if pixel.0 == background {
            out.extend_from_slice(&[1.0, 0.0]);
        } else {
            out.extend_from_slice(&[0.0, 1.0]);
        }
    }
    out
}
