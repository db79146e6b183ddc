//! FCN-8 decoder: 1x1 class projections, learned upsampling, additive skips.

use crate::error::{ModelError, ModelResult};
use crate::vgg::{Vgg16Config, VggEndpoints};
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig};
use burn::nn::Initializer;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use serde::{Deserialize, Serialize};

/// Total stride of the backbone at `layer7_out`.
pub const DOWNSAMPLE_FACTOR: usize = 32;

/// Height and width must both be multiples of [`DOWNSAMPLE_FACTOR`] for the
/// decoder output to line up with the input.
pub fn check_input_shape(height: usize, width: usize) -> ModelResult<()> {
    if height == 0
        || width == 0
        || height % DOWNSAMPLE_FACTOR != 0
        || width % DOWNSAMPLE_FACTOR != 0
    {
        return Err(ModelError::InputShape {
            height,
            width,
            factor: DOWNSAMPLE_FACTOR,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FcnDecoderConfig {
    pub num_classes: usize,
    pub layer3_channels: usize,
    pub layer4_channels: usize,
    pub layer7_channels: usize,
    /// Weight of the L2 penalty on decoder kernels.
    pub l2_scale: f64,
    /// Std-dev of the normal kernel initializer.
    pub init_std: f64,
}

impl Default for FcnDecoderConfig {
    fn default() -> Self {
        Self::from_backbone(&Vgg16Config::default(), 2)
    }
}

impl FcnDecoderConfig {
    pub fn from_backbone(backbone: &Vgg16Config, num_classes: usize) -> Self {
        Self {
            num_classes,
            layer3_channels: backbone.layer3_channels(),
            layer4_channels: backbone.layer4_channels(),
            layer7_channels: backbone.layer7_channels(),
            l2_scale: 1e-3,
            init_std: 0.01,
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> FcnDecoder<B> {
        FcnDecoder::new(self, device)
    }
}

#[derive(Debug, Module)]
pub struct FcnDecoder<B: Backend> {
    score7: Conv2d<B>,
    up7: ConvTranspose2d<B>,
    score4: Conv2d<B>,
    up4: ConvTranspose2d<B>,
    score3: Conv2d<B>,
    up8: ConvTranspose2d<B>,
    num_classes: usize,
    l2_scale: f64,
}

impl<B: Backend> FcnDecoder<B> {
    pub fn new(cfg: &FcnDecoderConfig, device: &B::Device) -> Self {
        let nc = cfg.num_classes;
        let init = Initializer::Normal {
            mean: 0.0,
            std: cfg.init_std,
        };
        let project = |c_in: usize| {
            Conv2dConfig::new([c_in, nc], [1, 1])
                .with_initializer(init.clone())
                .init(device)
        };
        // kernel 4 / stride 2 / padding 1 doubles H and W exactly.
        let up2 = || {
            ConvTranspose2dConfig::new([nc, nc], [4, 4])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_initializer(init.clone())
                .init(device)
        };

        Self {
            score7: project(cfg.layer7_channels),
            up7: up2(),
            score4: project(cfg.layer4_channels),
            up4: up2(),
            score3: project(cfg.layer3_channels),
            // kernel 16 / stride 8 / padding 4 scales by exactly 8.
            up8: ConvTranspose2dConfig::new([nc, nc], [16, 16])
                .with_stride([8, 8])
                .with_padding([4, 4])
                .with_initializer(init.clone())
                .init(device),
            num_classes: nc,
            l2_scale: cfg.l2_scale,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Class scores `[N, num_classes, H, W]` at input resolution.
    pub fn forward(
        &self,
        layer3_out: Tensor<B, 4>,
        layer4_out: Tensor<B, 4>,
        layer7_out: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.score7.forward(layer7_out);
        let x = self.up7.forward(x) + self.score4.forward(layer4_out);
        let x = self.up4.forward(x) + self.score3.forward(layer3_out);
        self.up8.forward(x)
    }

    pub fn forward_endpoints(&self, endpoints: VggEndpoints<B>) -> Tensor<B, 4> {
        self.forward(
            endpoints.layer3_out,
            endpoints.layer4_out,
            endpoints.layer7_out,
        )
    }

    /// `l2_scale * sum(w^2) / 2` over every decoder kernel.
    pub fn regularization_loss(&self) -> Tensor<B, 1> {
        let device = self.score7.weight.val().device();
        let kernels = [
            self.score7.weight.val(),
            self.up7.weight.val(),
            self.score4.weight.val(),
            self.up4.weight.val(),
            self.score3.weight.val(),
            self.up8.weight.val(),
        ];
        let total = kernels
            .into_iter()
            .fold(Tensor::zeros([1], &device), |acc, w| acc + (w.clone() * w).sum());
        total.mul_scalar(self.l2_scale / 2.0)
    }
}
