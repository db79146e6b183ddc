//! VGG16 backbone and its on-disk bundle.
//!
//! A bundle is a directory holding `manifest.json` (tag, exported tensor names,
//! layer widths) next to `variables.bin` (a Burn record of [`Vgg16`]).

use crate::error::{ModelError, ModelResult};
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::{Distribution, Tensor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const VGG_TAG: &str = "vgg16";
pub const MANIFEST_FILE: &str = "manifest.json";
/// Recorder appends the `.bin` extension.
pub const WEIGHTS_STEM: &str = "variables";

pub const IMAGE_INPUT: &str = "image_input";
pub const KEEP_PROB: &str = "keep_prob";
pub const LAYER3_OUT: &str = "layer3_out";
pub const LAYER4_OUT: &str = "layer4_out";
pub const LAYER7_OUT: &str = "layer7_out";

pub const ENDPOINT_NAMES: [&str; 5] = [IMAGE_INPUT, KEEP_PROB, LAYER3_OUT, LAYER4_OUT, LAYER7_OUT];

/// Convolutions per block, as in VGG16.
const BLOCK_DEPTHS: [usize; 5] = [2, 2, 3, 3, 3];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vgg16Config {
    pub in_channels: usize,
    /// Output channels of the five conv blocks.
    pub block_channels: [usize; 5],
    /// Width of the fully-convolutional fc6/fc7 layers.
    pub fc_channels: usize,
}

impl Default for Vgg16Config {
    fn default() -> Self {
        Self {
            in_channels: 3,
            block_channels: [64, 128, 256, 512, 512],
            fc_channels: 4096,
        }
    }
}

impl Vgg16Config {
    pub fn layer3_channels(&self) -> usize {
        self.block_channels[2]
    }

    pub fn layer4_channels(&self) -> usize {
        self.block_channels[3]
    }

    pub fn layer7_channels(&self) -> usize {
        self.fc_channels
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Vgg16<B> {
        Vgg16::new(self, device)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VggManifest {
    pub tag: String,
    pub tensors: Vec<String>,
    pub config: Vgg16Config,
}

impl VggManifest {
    pub fn new(config: Vgg16Config) -> Self {
        Self {
            tag: VGG_TAG.to_string(),
            tensors: ENDPOINT_NAMES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            config,
        }
    }

    fn validate(&self) -> ModelResult<()> {
        if self.tag != VGG_TAG {
            return Err(ModelError::TagMismatch {
                expected: VGG_TAG.to_string(),
                found: self.tag.clone(),
            });
        }
        for name in ENDPOINT_NAMES {
            if !self.tensors.iter().any(|t| t == name) {
                return Err(ModelError::MissingTensor {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// The five handles the decoder is wired to.
#[derive(Debug, Clone)]
pub struct VggEndpoints<B: Backend> {
    pub image_input: Tensor<B, 4>,
    pub keep_prob: f64,
    /// Stride 8.
    pub layer3_out: Tensor<B, 4>,
    /// Stride 16.
    pub layer4_out: Tensor<B, 4>,
    /// Stride 32, after fc7.
    pub layer7_out: Tensor<B, 4>,
}

impl<B: Backend> VggEndpoints<B> {
    pub const NAMES: [&'static str; 5] = ENDPOINT_NAMES;
}

#[derive(Debug, Module)]
pub struct VggBlock<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: MaxPool2d,
}

impl<B: Backend> VggBlock<B> {
    fn new(c_in: usize, c_out: usize, depth: usize, device: &B::Device) -> Self {
        let convs = (0..depth)
            .map(|i| {
                let c = if i == 0 { c_in } else { c_out };
                Conv2dConfig::new([c, c_out], [3, 3])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .init(device)
            })
            .collect();
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self { convs, pool }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input;
        for conv in &self.convs {
            x = relu(conv.forward(x));
        }
        self.pool.forward(x)
    }
}

#[derive(Debug, Module)]
pub struct Vgg16<B: Backend> {
    blocks: Vec<VggBlock<B>>,
    fc6: Conv2d<B>,
    fc7: Conv2d<B>,
}

impl<B: Backend> Vgg16<B> {
    pub fn new(cfg: &Vgg16Config, device: &B::Device) -> Self {
        let mut c_in = cfg.in_channels;
        let mut blocks = Vec::with_capacity(BLOCK_DEPTHS.len());
        for (depth, c_out) in BLOCK_DEPTHS.iter().zip(cfg.block_channels) {
            blocks.push(VggBlock::new(c_in, c_out, *depth, device));
            c_in = c_out;
        }
        let fc6 = Conv2dConfig::new([c_in, cfg.fc_channels], [7, 7])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .init(device);
        let fc7 = Conv2dConfig::new([cfg.fc_channels, cfg.fc_channels], [1, 1]).init(device);
        Self { blocks, fc6, fc7 }
    }

    /// Run the backbone and expose the named taps.
    ///
    /// `keep_prob` drives dropout after fc6 and fc7; pass 1.0 for inference.
    pub fn endpoints(&self, image_input: Tensor<B, 4>, keep_prob: f64) -> VggEndpoints<B> {
        let mut x = image_input.clone();
        let mut layer3_out = None;
        let mut layer4_out = None;
        for (i, block) in self.blocks.iter().enumerate() {
            x = block.forward(x);
            match i {
                2 => layer3_out = Some(x.clone()),
                3 => layer4_out = Some(x.clone()),
                _ => {}
            }
        }
        let x = dropout(relu(self.fc6.forward(x)), keep_prob);
        let layer7_out = dropout(relu(self.fc7.forward(x)), keep_prob);
        let layer3_out = layer3_out.unwrap_or_else(|| layer7_out.clone());
        let layer4_out = layer4_out.unwrap_or_else(|| layer7_out.clone());

        VggEndpoints {
            image_input,
            keep_prob,
            layer3_out,
            layer4_out,
            layer7_out,
        }
    }
}

/// Inverted dropout with a runtime keep probability.
pub fn dropout<B: Backend, const D: usize>(x: Tensor<B, D>, keep_prob: f64) -> Tensor<B, D> {
    if keep_prob >= 1.0 {
        return x;
    }
    if keep_prob <= 0.0 {
        return x.zeros_like();
    }
    let mask = x.random_like(Distribution::Bernoulli(keep_prob));
    (x * mask).div_scalar(keep_prob)
}

fn read_manifest(dir: &Path) -> ModelResult<VggManifest> {
    let path = dir.join(MANIFEST_FILE);
    let raw = fs::read(&path).map_err(|e| ModelError::Io {
        path: path.clone(),
        source: e,
    })?;
    serde_json::from_slice(&raw).map_err(|e| ModelError::Manifest { path, source: e })
}

/// Load a pretrained backbone bundle from `dir`.
///
/// Returns the module and the widths recorded in its manifest (the decoder
/// needs them to size its skip projections).
pub fn load_vgg<B: Backend>(
    dir: &Path,
    device: &B::Device,
) -> ModelResult<(Vgg16<B>, Vgg16Config)> {
    let manifest = read_manifest(dir)?;
    manifest.validate()?;
    let weights = dir.join(WEIGHTS_STEM);
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let model = Vgg16::<B>::new(&manifest.config, device)
        .load_file(weights.as_path(), &recorder, device)
        .map_err(|e| ModelError::Record {
            path: weights.with_extension("bin"),
            msg: format!("{e}"),
        })?;
    tracing::info!(
        "loaded {} backbone from {} ({} params)",
        manifest.tag,
        dir.display(),
        model.num_params()
    );
    Ok((model, manifest.config))
}

/// Write `model` as a bundle readable by [`load_vgg`].
pub fn save_vgg_bundle<B: Backend>(
    model: &Vgg16<B>,
    config: &Vgg16Config,
    dir: &Path,
) -> ModelResult<()> {
    fs::create_dir_all(dir).map_err(|e| ModelError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    let weights = dir.join(WEIGHTS_STEM);
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(weights.as_path(), &recorder)
        .map_err(|e| ModelError::Record {
            path: weights.with_extension("bin"),
            msg: format!("{e}"),
        })?;
    let manifest_path = dir.join(MANIFEST_FILE);
    let json = serde_json::to_vec_pretty(&VggManifest::new(config.clone())).map_err(|e| {
        ModelError::Manifest {
            path: manifest_path.clone(),
            source: e,
        }
    })?;
    fs::write(&manifest_path, json).map_err(|e| ModelError::Io {
        path: manifest_path,
        source: e,
    })
}
