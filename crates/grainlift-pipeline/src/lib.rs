//! grainlift-pipeline: pure conservative image enhancement (sans-IO).
//!
//! Enlarges an RGB buffer with classical interpolation and restores it
//! gently, in a fixed order:
//!
//! denoise (small sources) -> resample -> grain (large results) ->
//! edge sharpening (narrow sources)
//!
//! Which optional stages run is decided up front by [`StageGates`].
//! The crate performs no file or network access; decoding, encoding
//! and batching live in `grainlift-io`.

pub mod blur;
mod canny;
pub mod denoise;
pub mod diagnostics;
pub mod edge;
pub mod gates;
pub mod pipeline;
pub mod resample;
pub mod sharpen;
pub mod texture;
pub mod types;

pub use diagnostics::{EnhanceDiagnostics, StageDiagnostics, StageMetrics};
pub use edge::{EdgeMask, edge_mask};
pub use gates::StageGates;
pub use pipeline::{Enhanced, Pipeline, enhance_buffer};
pub use resample::{ResampleKernel, resample, resample_to, target_dimensions};
pub use types::{
    DenoiseParams, Dimensions, EdgeParams, EnhancementConfig, GrayImage, PipelineError,
    PixelBuffer, RgbImage,
};
