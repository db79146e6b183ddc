//! Burn modules for road segmentation in the FCN-8 layout.
//!
//! This crate defines the network pieces:
//! - `Vgg16`: convolutional backbone exposing three intermediate feature maps.
//! - `FcnDecoder`: 1x1 projections, transposed convolutions, and additive skips
//!   that bring the deepest features back to input resolution.
//! - `Fcn`: backbone + decoder as a single trainable module.
//!
//! These are pure Burn Modules. Loss, optimizer, and checkpoint handling live in
//! the `training` crate; the `inference` crate wraps `Fcn` into a `Segmenter`.
//!
//! ## Layout Note
//! Tensors are channel-first (`[batch, channels, height, width]`) throughout,
//! so decoder scores come out as `[batch, num_classes, height, width]`.

pub mod decoder;
pub mod error;
pub mod fcn;
pub mod vgg;

pub use decoder::{check_input_shape, FcnDecoder, FcnDecoderConfig, DOWNSAMPLE_FACTOR};
pub use error::{ModelError, ModelResult};
pub use fcn::{Fcn, FcnConfig};
pub use vgg::{load_vgg, save_vgg_bundle, Vgg16, Vgg16Config, VggEndpoints, VggManifest};

pub mod prelude {
    pub use super::{
        load_vgg, Fcn, FcnConfig, FcnDecoder, FcnDecoderConfig, Vgg16, Vgg16Config, VggEndpoints,
    };
}
