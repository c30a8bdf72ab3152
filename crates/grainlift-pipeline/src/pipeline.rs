//! Typestate enhancement pipeline.
//!
//! Each stage method consumes `self` and returns the next state, so
//! stages cannot be skipped or reordered:
//!
//! ```rust
//! # use grainlift_pipeline::{EnhancementConfig, Pipeline, PipelineError, PixelBuffer};
//! # use rand::SeedableRng;
//! # fn run() -> Result<(), PipelineError> {
//! let buffer = PixelBuffer::filled(64, 48, [120, 130, 140])?;
//! let mut rng = rand::rngs::StdRng::seed_from_u64(7);
//! let enhanced = Pipeline::new(buffer, EnhancementConfig::default())?
//!     .denoise()
//!     .resample()?
//!     .texture(&mut rng)
//!     .sharpen()
//!     .finish();
//! assert_eq!(enhanced.buffer.width(), 128);
//! # Ok(())
//! # }
//! ```
//!
//! Gates are computed once in [`Pipeline::new`]. A stage whose gate is
//! off passes the buffer through untouched and records no diagnostics.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::diagnostics::{EnhanceDiagnostics, StageDiagnostics, StageMetrics, changed_pixels};
use crate::gates::StageGates;
use crate::resample::ResampleKernel;
use crate::types::{Dimensions, EnhancementConfig, PipelineError, PixelBuffer};

/// State shared by every stage.
struct Carry {
    config: EnhancementConfig,
    gates: StageGates,
    original: Dimensions,
    buffer: PixelBuffer,
    diagnostics: EnhanceDiagnostics,
}

fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let out = f();
    (out, start.elapsed())
}

/// Entry point for the typestate pipeline.
pub struct Pipeline;

impl Pipeline {
    /// Validate `config` and compute the gates for `buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the configuration is
    /// rejected by [`EnhancementConfig::validate`], or
    /// [`PipelineError::InvalidDimensions`] if the scale factor cannot
    /// produce a valid size for this buffer.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer: PixelBuffer, config: EnhancementConfig) -> Result<Pending, PipelineError> {
        config.validate()?;
        let original = buffer.dimensions();
        let gates = StageGates::compute(original, &config)?;
        tracing::debug!(%original, %gates, "pipeline gates");
        Ok(Pending(Carry {
            config,
            gates,
            original,
            buffer,
            diagnostics: EnhanceDiagnostics::default(),
        }))
    }
}

/// Before denoising.
#[must_use = "pipeline stages are consumed by advancing, call .denoise() to continue"]
pub struct Pending(Carry);

impl Pending {
    /// The decoded buffer.
    #[must_use]
    pub const fn buffer(&self) -> &PixelBuffer {
        &self.0.buffer
    }

    /// Gates decided for this image.
    #[must_use]
    pub const fn gates(&self) -> StageGates {
        self.0.gates
    }

    /// Run non-local-means if the denoise gate is on.
    pub fn denoise(self) -> Denoised {
        let mut carry = self.0;
        if carry.gates.denoise {
            let params = carry.config.denoise;
            let (out, duration) = timed(|| crate::denoise::denoise(&carry.buffer, &params));
            tracing::debug!(?duration, "denoise");
            carry.diagnostics.denoise = Some(StageDiagnostics {
                duration,
                metrics: StageMetrics::Denoise {
                    luma_strength: params.luma_strength,
                    chroma_strength: params.chroma_strength,
                    changed_pixels: changed_pixels(&carry.buffer, &out),
                    pixel_count: out.dimensions().pixel_count(),
                },
            });
            carry.buffer = out;
        }
        Denoised(carry)
    }
}

/// After the optional denoise.
#[must_use = "pipeline stages are consumed by advancing, call .resample() to continue"]
pub struct Denoised(Carry);

impl Denoised {
    /// The (possibly) denoised buffer.
    #[must_use]
    pub const fn buffer(&self) -> &PixelBuffer {
        &self.0.buffer
    }

    /// Enlarge to the size recorded in the gates.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidDimensions`] if the target size
    /// is zero.
    pub fn resample(self) -> Result<Resampled, PipelineError> {
        let mut carry = self.0;
        let kernel = ResampleKernel::for_scale(carry.config.scale_factor);
        let target = carry.gates.resampled;
        let (out, duration) =
            timed(|| crate::resample::resample_to(&carry.buffer, target, kernel));
        let out = out?;
        tracing::debug!(?duration, %kernel, %target, "resample");
        carry.diagnostics.resample = Some(StageDiagnostics {
            duration,
            metrics: StageMetrics::Resample {
                kernel,
                from: carry.buffer.dimensions(),
                to: out.dimensions(),
            },
        });
        carry.buffer = out;
        Ok(Resampled(carry))
    }
}

/// After resampling.
#[must_use = "pipeline stages are consumed by advancing, call .texture() to continue"]
pub struct Resampled(Carry);

impl Resampled {
    /// The enlarged buffer.
    #[must_use]
    pub const fn buffer(&self) -> &PixelBuffer {
        &self.0.buffer
    }

    /// Add grain if the texture gate is on, drawing noise from `rng`.
    pub fn texture<R: Rng + ?Sized>(self, rng: &mut R) -> Textured {
        let mut carry = self.0;
        if carry.gates.texture {
            let strength = carry.config.texture_strength;
            let edges = carry.config.edges;
            let (out, duration) =
                timed(|| crate::texture::add_grain(&carry.buffer, strength, &edges, rng));
            tracing::debug!(?duration, strength, "texture");
            carry.diagnostics.texture = Some(StageDiagnostics {
                duration,
                metrics: StageMetrics::Texture {
                    strength,
                    changed_pixels: changed_pixels(&carry.buffer, &out),
                    pixel_count: out.dimensions().pixel_count(),
                },
            });
            carry.buffer = out;
        }
        Textured(carry)
    }
}

/// After the optional grain.
#[must_use = "pipeline stages are consumed by advancing, call .sharpen() to continue"]
pub struct Textured(Carry);

impl Textured {
    /// The (possibly) textured buffer.
    #[must_use]
    pub const fn buffer(&self) -> &PixelBuffer {
        &self.0.buffer
    }

    /// Unsharp-mask the edges if the sharpen gate is on.
    pub fn sharpen(self) -> Sharpened {
        let mut carry = self.0;
        if carry.gates.sharpen {
            let intensity = carry.config.sharpen_intensity;
            let edges = carry.config.edges;
            let (out, duration) =
                timed(|| crate::sharpen::sharpen(&carry.buffer, intensity, &edges));
            tracing::debug!(?duration, intensity, "sharpen");
            carry.diagnostics.sharpen = Some(StageDiagnostics {
                duration,
                metrics: StageMetrics::Sharpen {
                    intensity,
                    changed_pixels: changed_pixels(&carry.buffer, &out),
                    pixel_count: out.dimensions().pixel_count(),
                },
            });
            carry.buffer = out;
        }
        Sharpened(carry)
    }
}

/// After the optional sharpen.
#[must_use = "call .finish() to take the result"]
pub struct Sharpened(Carry);

impl Sharpened {
    /// The final buffer.
    #[must_use]
    pub const fn buffer(&self) -> &PixelBuffer {
        &self.0.buffer
    }

    /// Take the final buffer with its gates and diagnostics.
    pub fn finish(self) -> Enhanced {
        let carry = self.0;
        Enhanced {
            buffer: carry.buffer,
            original: carry.original,
            gates: carry.gates,
            diagnostics: carry.diagnostics,
        }
    }
}

/// A fully enhanced image.
#[derive(Debug, Clone)]
pub struct Enhanced {
    pub buffer: PixelBuffer,
    /// Size before enhancement.
    pub original: Dimensions,
    pub gates: StageGates,
    pub diagnostics: EnhanceDiagnostics,
}

/// Run every stage in order.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] or
/// [`PipelineError::InvalidDimensions`] as [`Pipeline::new`] and
/// [`Denoised::resample`] do.
pub fn enhance_buffer<R: Rng + ?Sized>(
    buffer: PixelBuffer,
    config: EnhancementConfig,
    rng: &mut R,
) -> Result<Enhanced, PipelineError> {
    Ok(Pipeline::new(buffer, config)?
        .denoise()
        .resample()?
        .texture(rng)
        .sharpen()
        .finish())
}
