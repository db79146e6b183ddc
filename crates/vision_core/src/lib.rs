//! vision_core: shared segmentation interfaces and overlay drawing.

pub mod interfaces;
pub mod overlay;

pub mod prelude {
    pub use crate::interfaces::*;
    pub use crate::overlay::*;
}
