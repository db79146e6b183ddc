use crate::decoder::{FcnDecoder, FcnDecoderConfig};
use crate::vgg::{Vgg16, Vgg16Config};
use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcnConfig {
    pub backbone: Vgg16Config,
    pub decoder: FcnDecoderConfig,
}

impl Default for FcnConfig {
    fn default() -> Self {
        Self::new(Vgg16Config::default(), 2)
    }
}

impl FcnConfig {
    pub fn new(backbone: Vgg16Config, num_classes: usize) -> Self {
        let decoder = FcnDecoderConfig::from_backbone(&backbone, num_classes);
        Self { backbone, decoder }
    }

    pub fn with_l2_scale(mut self, l2_scale: f64) -> Self {
        self.decoder.l2_scale = l2_scale;
        self
    }

    /// Randomly initialised backbone and decoder.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Fcn<B> {
        Fcn::new(self.backbone.init(device), self.decoder.init(device))
    }

    /// Fresh decoder on top of an already loaded backbone.
    pub fn init_with_backbone<B: Backend>(
        &self,
        backbone: Vgg16<B>,
        device: &B::Device,
    ) -> Fcn<B> {
        Fcn::new(backbone, self.decoder.init(device))
    }
}

/// Backbone and decoder trained as one module.
#[derive(Debug, Module)]
pub struct Fcn<B: Backend> {
    pub backbone: Vgg16<B>,
    pub decoder: FcnDecoder<B>,
}

impl<B: Backend> Fcn<B> {
    pub fn new(backbone: Vgg16<B>, decoder: FcnDecoder<B>) -> Self {
        Self { backbone, decoder }
    }

    /// Raw class scores `[N, num_classes, H, W]` for `images` `[N, 3, H, W]`.
    pub fn forward(&self, images: Tensor<B, 4>, keep_prob: f64) -> Tensor<B, 4> {
        let endpoints = self.backbone.endpoints(images, keep_prob);
        self.decoder.forward_endpoints(endpoints)
    }

    pub fn num_classes(&self) -> usize {
        self.decoder.num_classes()
    }

    pub fn regularization_loss(&self) -> Tensor<B, 1> {
        self.decoder.regularization_loss()
    }
}
