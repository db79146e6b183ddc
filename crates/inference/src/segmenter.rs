use burn::tensor::activation::softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use burn_dataset::aug::{image_to_chw, resize_image};
use burn_dataset::ImageShape;
use image::RgbImage;
use models::Fcn;
use vision_core::interfaces::{SegmentationMask, Segmenter};

/// Index of the road channel in the decoder scores.
const ROAD_CLASS: usize = 1;

/// Wraps a trained [`Fcn`] for per-image road probability.
///
/// Expects a module without autodiff (`model.valid()` after training).
pub struct FcnSegmenter<B: Backend> {
    model: Fcn<B>,
    shape: ImageShape,
    device: B::Device,
}

impl<B: Backend> FcnSegmenter<B> {
    pub fn new(model: Fcn<B>, shape: ImageShape, device: B::Device) -> anyhow::Result<Self> {
        if model.num_classes() <= ROAD_CLASS {
            anyhow::bail!(
                "segmenter needs a road class; model has {} classes",
                model.num_classes()
            );
        }
        Ok(Self {
            model,
            shape,
            device,
        })
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }
}

impl<B: Backend> Segmenter for FcnSegmenter<B> {
    fn segment(&mut self, image: &RgbImage) -> SegmentationMask {
        let resized = resize_image(image, self.shape);
        let (h, w) = (self.shape.height as usize, self.shape.width as usize);
        let input = Tensor::<B, 4>::from_data(
            TensorData::new(image_to_chw(&resized), [1, 3, h, w]),
            &self.device,
        );
        let scores = self.model.forward(input, 1.0);
        let probs = softmax(scores, 1).slice([0..1, ROAD_CLASS..ROAD_CLASS + 1, 0..h, 0..w]);
        let road = probs
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_else(|_| vec![0.0; h * w]);
        SegmentationMask::new(self.shape.width, self.shape.height, road)
    }

    fn input_size(&self) -> (u32, u32) {
        (self.shape.width, self.shape.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArray;
    use image::Rgb;
    use models::{FcnConfig, Vgg16Config};

    type TestBackend = NdArray<f32>;

    fn tiny_model(num_classes: usize) -> Fcn<TestBackend> {
        let cfg = FcnConfig::new(
            Vgg16Config {
                in_channels: 3,
                block_channels: [4, 4, 8, 8, 8],
                fc_channels: 16,
            },
            num_classes,
        );
        cfg.init(&Default::default())
    }

    #[test]
    fn probabilities_cover_working_resolution() {
        let shape = ImageShape::new(32, 64);
        let mut seg =
            FcnSegmenter::new(tiny_model(2), shape, Default::default()).unwrap();
        let image = RgbImage::from_pixel(100, 40, Rgb([120, 60, 30]));
        let mask = seg.segment(&image);
        assert_eq!((mask.width, mask.height), (64, 32));
        assert_eq!(mask.scores.len(), 64 * 32);
        assert!(mask.scores.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(seg.input_size(), (64, 32));
    }

    #[test]
    fn single_class_model_is_rejected() {
        let shape = ImageShape::new(32, 32);
        assert!(FcnSegmenter::new(tiny_model(1), shape, Default::default()).is_err());
    }
}
