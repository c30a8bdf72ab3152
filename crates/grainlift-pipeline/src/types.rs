//! Shared types for the grainlift enhancement pipeline.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference edge maps
/// without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can build and inspect
/// pixel buffers without depending on `image` directly.
pub use image::RgbImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimensions value.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The shorter of the two sides.
    #[must_use]
    pub const fn min_side(self) -> u32 {
        if self.width < self.height {
            self.width
        } else {
            self.height
        }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A dense, interleaved, 3-channel 8-bit raster.
///
/// Always non-empty: both sides are at least one pixel. Every stage
/// borrows a `PixelBuffer` and returns a new one, so intermediate
/// results are never aliased across stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer(RgbImage);

impl PixelBuffer {
    /// Wrap an RGB image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyBuffer`] if either side is zero.
    pub fn new(image: RgbImage) -> Result<Self, PipelineError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::EmptyBuffer {
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(Self(image))
    }

    /// Convert any decoded image to 8-bit RGB, dropping alpha.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyBuffer`] if either side is zero.
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self, PipelineError> {
        Self::new(image.to_rgb8())
    }

    /// A buffer filled with a single color.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyBuffer`] if either side is zero.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self, PipelineError> {
        Self::new(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Width and height.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.0.width(), self.0.height())
    }

    /// Borrow the underlying image.
    #[must_use]
    pub const fn as_image(&self) -> &RgbImage {
        &self.0
    }

    /// Consume the buffer and return the underlying image.
    #[must_use]
    pub fn into_image(self) -> RgbImage {
        self.0
    }

    /// A new buffer of the same size, built pixel by pixel from this one.
    ///
    /// `f` receives the coordinates and the current pixel. Cannot fail:
    /// the size is inherited from a buffer that is already non-empty.
    #[must_use]
    pub fn map_pixels(&self, mut f: impl FnMut(u32, u32, image::Rgb<u8>) -> image::Rgb<u8>) -> Self {
        Self(RgbImage::from_fn(self.0.width(), self.0.height(), |x, y| {
            f(x, y, *self.0.get_pixel(x, y))
        }))
    }
}

impl TryFrom<RgbImage> for PixelBuffer {
    type Error = PipelineError;

    fn try_from(image: RgbImage) -> Result<Self, Self::Error> {
        Self::new(image)
    }
}

/// Canny thresholds and dilation used to build an
/// [`EdgeMask`](crate::edge::EdgeMask).
///
/// Thresholds are on the 0–255 gradient scale. `dilation` is the number
/// of 3×3 dilation passes applied after detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeParams {
    /// Canny low (hysteresis) threshold.
    pub low_threshold: f32,
    /// Canny high threshold.
    pub high_threshold: f32,
    /// Number of 3×3 dilation passes.
    pub dilation: u8,
}

impl EdgeParams {
    pub const DEFAULT_LOW_THRESHOLD: f32 = 50.0;
    pub const DEFAULT_HIGH_THRESHOLD: f32 = 150.0;
    pub const DEFAULT_DILATION: u8 = 1;

    /// The same thresholds without dilation.
    #[must_use]
    pub const fn undilated(self) -> Self {
        Self {
            dilation: 0,
            ..self
        }
    }
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            low_threshold: Self::DEFAULT_LOW_THRESHOLD,
            high_threshold: Self::DEFAULT_HIGH_THRESHOLD,
            dilation: Self::DEFAULT_DILATION,
        }
    }
}

/// Non-local-means parameters.
///
/// Strengths are the filter parameter `h` on the 0–255 scale: a patch
/// whose mean squared difference equals `h²` contributes with weight
/// `1/e`. Both windows must be odd.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DenoiseParams {
    /// Filter strength for the luma plane.
    pub luma_strength: f32,
    /// Filter strength for the two chroma planes.
    pub chroma_strength: f32,
    /// Side of the square patch compared between pixels.
    pub template_window: u32,
    /// Side of the square area searched for similar patches.
    pub search_window: u32,
}

impl DenoiseParams {
    pub const DEFAULT_LUMA_STRENGTH: f32 = 6.0;
    pub const DEFAULT_CHROMA_STRENGTH: f32 = 6.0;
    pub const DEFAULT_TEMPLATE_WINDOW: u32 = 7;
    pub const DEFAULT_SEARCH_WINDOW: u32 = 21;
}

impl Default for DenoiseParams {
    fn default() -> Self {
        Self {
            luma_strength: Self::DEFAULT_LUMA_STRENGTH,
            chroma_strength: Self::DEFAULT_CHROMA_STRENGTH,
            template_window: Self::DEFAULT_TEMPLATE_WINDOW,
            search_window: Self::DEFAULT_SEARCH_WINDOW,
        }
    }
}

/// Per-run enhancement parameters.
///
/// All fields have defaults matching the conservative profile:
/// 2× bicubic enlargement, grain strength 0.008, sharpen intensity 0.1,
/// denoise and texture thresholds of 300 px, sharpen threshold of 500 px.
///
/// Call [`validate`](Self::validate) before use; the pipeline does so
/// in [`Pipeline::new`](crate::pipeline::Pipeline::new).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Enlargement factor. 1.5, 2.0 and 3.0 are the usual presets but
    /// any finite positive value works.
    pub scale_factor: f64,

    /// Amplitude of the synthetic grain as a fraction of full scale.
    /// 0.005–0.015 keeps the grain below the visible-noise floor.
    pub texture_strength: f32,

    /// Unsharp-mask intensity. Zero or negative disables sharpening.
    pub sharpen_intensity: f32,

    /// Denoise runs when the shorter original side is below this.
    pub denoise_below: u32,

    /// Grain is added when both resampled sides are above this.
    pub texture_above: u32,

    /// Sharpening runs when the original width is below this.
    pub sharpen_below: u32,

    /// Non-local-means parameters.
    pub denoise: DenoiseParams,

    /// Edge detection parameters for the grain mask. Sharpening uses
    /// the same thresholds without dilation.
    pub edges: EdgeParams,

    /// Seed for the grain generator. `None` draws fresh OS entropy for
    /// every image.
    pub grain_seed: Option<u64>,
}

impl EnhancementConfig {
    pub const DEFAULT_SCALE_FACTOR: f64 = 2.0;
    pub const DEFAULT_TEXTURE_STRENGTH: f32 = 0.008;
    pub const DEFAULT_SHARPEN_INTENSITY: f32 = 0.1;
    pub const DEFAULT_DENOISE_BELOW: u32 = 300;
    pub const DEFAULT_TEXTURE_ABOVE: u32 = 300;
    pub const DEFAULT_SHARPEN_BELOW: u32 = 500;

    /// Recommended grain strength range.
    pub const TEXTURE_STRENGTH_RANGE: std::ops::RangeInclusive<f32> = 0.005..=0.015;

    /// The usual scale presets.
    pub const SCALE_PRESETS: [f64; 3] = [1.5, 2.0, 3.0];

    /// Default configuration with a different scale factor.
    #[must_use]
    pub fn with_scale(scale_factor: f64) -> Self {
        Self {
            scale_factor,
            ..Self::default()
        }
    }

    /// Check every parameter for values the stages cannot handle.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// offending field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "scale_factor must be finite and positive, got {}",
                self.scale_factor
            )));
        }
        if !self.texture_strength.is_finite() || self.texture_strength < 0.0 {
            return Err(PipelineError::InvalidConfig(format!(
                "texture_strength must be finite and non-negative, got {}",
                self.texture_strength
            )));
        }
        if !self.sharpen_intensity.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "sharpen_intensity must be finite, got {}",
                self.sharpen_intensity
            )));
        }

        let d = &self.denoise;
        for (name, strength) in [
            ("denoise.luma_strength", d.luma_strength),
            ("denoise.chroma_strength", d.chroma_strength),
        ] {
            if !strength.is_finite() || strength <= 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be finite and positive, got {strength}"
                )));
            }
        }
        for (name, window) in [
            ("denoise.template_window", d.template_window),
            ("denoise.search_window", d.search_window),
        ] {
            if window == 0 || window % 2 == 0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be odd and positive, got {window}"
                )));
            }
        }

        let e = &self.edges;
        if !(e.low_threshold.is_finite() && e.high_threshold.is_finite()) {
            return Err(PipelineError::InvalidConfig(
                "edge thresholds must be finite".to_string(),
            ));
        }
        if e.low_threshold > e.high_threshold {
            return Err(PipelineError::InvalidConfig(format!(
                "edges.low_threshold ({}) exceeds edges.high_threshold ({})",
                e.low_threshold, e.high_threshold
            )));
        }

        Ok(())
    }
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            scale_factor: Self::DEFAULT_SCALE_FACTOR,
            texture_strength: Self::DEFAULT_TEXTURE_STRENGTH,
            sharpen_intensity: Self::DEFAULT_SHARPEN_INTENSITY,
            denoise_below: Self::DEFAULT_DENOISE_BELOW,
            texture_above: Self::DEFAULT_TEXTURE_ABOVE,
            sharpen_below: Self::DEFAULT_SHARPEN_BELOW,
            denoise: DenoiseParams::default(),
            edges: EdgeParams::default(),
            grain_seed: None,
        }
    }
}

/// Errors that can occur inside the enhancement stages.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// A buffer with a zero side was supplied or produced.
    #[error("pixel buffer must be non-empty, got {width}x{height}")]
    EmptyBuffer {
        /// Offending width.
        width: u32,
        /// Offending height.
        height: u32,
    },

    /// A resample target could not be represented.
    #[error("cannot resample {width}x{height} by {scale}")]
    InvalidDimensions {
        /// Source width.
        width: u32,
        /// Source height.
        height: u32,
        /// Requested scale factor.
        scale: f64,
    },

    /// The configuration failed validation.
    #[error("invalid enhancement configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EnhancementConfig::default().validate().is_ok());
    }

    #[test]
    fn default_config_matches_conservative_profile() {
        let config = EnhancementConfig::default();
        assert!((config.scale_factor - 2.0).abs() < f64::EPSILON);
        assert!((config.texture_strength - 0.008).abs() < f32::EPSILON);
        assert!((config.sharpen_intensity - 0.1).abs() < f32::EPSILON);
        assert_eq!(config.denoise_below, 300);
        assert_eq!(config.texture_above, 300);
        assert_eq!(config.sharpen_below, 500);
        assert_eq!(config.denoise.template_window, 7);
        assert_eq!(config.denoise.search_window, 21);
        assert_eq!(config.grain_seed, None);
        assert!(EnhancementConfig::TEXTURE_STRENGTH_RANGE.contains(&config.texture_strength));
    }

    #[test]
    fn presets_validate() {
        for scale in EnhancementConfig::SCALE_PRESETS {
            assert!(EnhancementConfig::with_scale(scale).validate().is_ok());
        }
    }

    #[test]
    fn arbitrary_positive_scale_is_valid() {
        assert!(EnhancementConfig::with_scale(1.25).validate().is_ok());
        assert!(EnhancementConfig::with_scale(0.5).validate().is_ok());
    }

    #[test]
    fn rejects_bad_scale() {
        for scale in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            let err = EnhancementConfig::with_scale(scale).validate().unwrap_err();
            assert!(matches!(err, PipelineError::InvalidConfig(_)), "{scale}");
        }
    }

    #[test]
    fn rejects_negative_texture_strength() {
        let config = EnhancementConfig {
            texture_strength: -0.01,
            ..EnhancementConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_sharpen_intensity_is_allowed() {
        let config = EnhancementConfig {
            sharpen_intensity: -1.0,
            ..EnhancementConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_even_windows() {
        let config = EnhancementConfig {
            denoise: DenoiseParams {
                template_window: 6,
                ..DenoiseParams::default()
            },
            ..EnhancementConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("template_window"));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let config = EnhancementConfig {
            edges: EdgeParams {
                low_threshold: 200.0,
                high_threshold: 100.0,
                dilation: 1,
            },
            ..EnhancementConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_serde_round_trip() {
        let config = EnhancementConfig {
            scale_factor: 3.0,
            grain_seed: Some(42),
            ..EnhancementConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: EnhancementConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn partial_config_json_uses_defaults() {
        let config: EnhancementConfig = serde_json::from_str(r#"{"scale_factor": 1.5}"#).unwrap();
        assert!((config.scale_factor - 1.5).abs() < f64::EPSILON);
        assert_eq!(config.sharpen_below, 500);
    }

    #[test]
    fn pixel_buffer_rejects_empty() {
        let err = PixelBuffer::new(RgbImage::new(0, 5)).unwrap_err();
        assert_eq!(
            err,
            PipelineError::EmptyBuffer {
                width: 0,
                height: 5
            }
        );
    }

    #[test]
    fn pixel_buffer_from_dynamic_drops_alpha() {
        let rgba = image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 40]));
        let buffer = PixelBuffer::from_dynamic(&DynamicImage::ImageRgba8(rgba)).unwrap();
        assert_eq!(buffer.dimensions(), Dimensions::new(3, 2));
        assert_eq!(buffer.as_image().get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn map_pixels_keeps_size_and_sees_coordinates() {
        let buffer = PixelBuffer::filled(5, 3, [10, 20, 30]).unwrap();
        let out = buffer.map_pixels(|x, y, p| {
            image::Rgb([p.0[0] + u8::try_from(x).unwrap(), p.0[1] + u8::try_from(y).unwrap(), p.0[2]])
        });
        assert_eq!(out.dimensions(), buffer.dimensions());
        assert_eq!(out.as_image().get_pixel(4, 2).0, [14, 22, 30]);
        assert_eq!(out.as_image().get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn dimensions_helpers() {
        let d = Dimensions::new(640, 480);
        assert_eq!(d.min_side(), 480);
        assert_eq!(d.pixel_count(), 307_200);
        assert_eq!(d.to_string(), "640x480");
    }

    #[test]
    fn undilated_keeps_thresholds() {
        let params = EdgeParams::default().undilated();
        assert_eq!(params.dilation, 0);
        assert!((params.low_threshold - 50.0).abs() < f32::EPSILON);
        assert!((params.high_threshold - 150.0).abs() < f32::EPSILON);
    }
}
