#![recursion_limit = "256"]

pub mod export;
pub mod segmenter;

#[cfg(feature = "backend-wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

pub use export::{run_output_dir, save_inference_samples, ExportSummary, ROAD_THRESHOLD};
pub use segmenter::FcnSegmenter;

pub mod prelude {
    pub use crate::export::{save_inference_samples, ExportSummary};
    pub use crate::segmenter::FcnSegmenter;
    pub use crate::InferenceBackend;
}
