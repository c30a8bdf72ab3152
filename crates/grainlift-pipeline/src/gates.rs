//! Which optional stages run for a given image.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resample::target_dimensions;
use crate::types::{Dimensions, EnhancementConfig, PipelineError};

/// Stage activation decided once per image, before any pixel work.
///
/// Each gate looks at a different size: denoise at the shorter side of
/// the original, texture at both resampled sides, sharpen at the
/// original width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageGates {
    /// Shorter original side below `denoise_below`.
    pub denoise: bool,
    /// Both resampled sides above `texture_above`.
    pub texture: bool,
    /// Original width below `sharpen_below`.
    pub sharpen: bool,
    /// Size after resampling.
    pub resampled: Dimensions,
}

impl StageGates {
    /// Compute the gates for an image of size `original`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDimensions`] if the scale factor
    /// cannot produce a valid size.
    pub fn compute(original: Dimensions, config: &EnhancementConfig) -> Result<Self, PipelineError> {
        let resampled = target_dimensions(original, config.scale_factor)?;
        Ok(Self {
            denoise: original.min_side() < config.denoise_below,
            texture: resampled.width > config.texture_above
                && resampled.height > config.texture_above,
            sharpen: original.width < config.sharpen_below,
            resampled,
        })
    }
}

impl fmt::Display for StageGates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |on: bool| if on { "on" } else { "off" };
        write!(
            f,
            "denoise={} texture={} sharpen={} -> {}",
            flag(self.denoise),
            flag(self.texture),
            flag(self.sharpen),
            self.resampled,
        )
    }
}
