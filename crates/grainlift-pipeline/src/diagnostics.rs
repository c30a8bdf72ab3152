//! Per-stage timing and metrics for one enhanced image.
//!
//! The pipeline fills in the pixel stages; the I/O layer adds decode
//! and encode. Durations serialize as fractional seconds because
//! [`std::time::Duration`] has no serde representation of its own.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resample::ResampleKernel;
use crate::types::{Dimensions, PixelBuffer};

/// Serde support for `Duration` as fractional seconds.
pub mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize as `f64` seconds.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize from `f64` seconds.
    ///
    /// # Errors
    ///
    /// Fails on negative, non-finite or out-of-range values.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom("duration must be finite, non-negative seconds")
        })
    }
}

/// Diagnostics for one image.
///
/// Optional stages are `None` when their gate was off. `decode` and
/// `encode` are `None` until the I/O layer records them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhanceDiagnostics {
    pub decode: Option<StageDiagnostics>,
    pub denoise: Option<StageDiagnostics>,
    pub resample: Option<StageDiagnostics>,
    pub texture: Option<StageDiagnostics>,
    pub sharpen: Option<StageDiagnostics>,
    pub encode: Option<StageDiagnostics>,
}

/// Duration and metrics of a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock time (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    pub metrics: StageMetrics,
}

/// Stage-specific numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    Decode {
        /// Size of the source file.
        input_bytes: u64,
        /// Decoded size.
        dimensions: Dimensions,
    },
    Denoise {
        luma_strength: f32,
        chroma_strength: f32,
        /// Pixels whose value changed.
        changed_pixels: u64,
        pixel_count: u64,
    },
    Resample {
        kernel: ResampleKernel,
        from: Dimensions,
        to: Dimensions,
    },
    Texture {
        strength: f32,
        changed_pixels: u64,
        pixel_count: u64,
    },
    Sharpen {
        intensity: f32,
        changed_pixels: u64,
        pixel_count: u64,
    },
    Encode {
        /// Output format name, e.g. `"jpeg"`.
        format: String,
        output_bytes: u64,
    },
}

impl EnhanceDiagnostics {
    /// Sum of all recorded stage durations.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.stages().iter().map(|(_, d)| d.duration).sum()
    }

    /// Recorded stages in execution order.
    #[must_use]
    pub fn stages(&self) -> Vec<(&'static str, &StageDiagnostics)> {
        [
            ("Decode", &self.decode),
            ("Denoise", &self.denoise),
            ("Resample", &self.resample),
            ("Texture", &self.texture),
            ("Sharpen", &self.sharpen),
            ("Encode", &self.encode),
        ]
        .into_iter()
        .filter_map(|(name, d)| d.as_ref().map(|d| (name, d)))
        .collect()
    }

    /// Human-readable table of the recorded stages.
    #[must_use]
    pub fn report(&self) -> String {
        let total_ms = duration_ms(self.total_duration());
        let mut lines = vec![
            format!("{:<12} {:>12} {:>8}  {}", "Stage", "Duration", "% Total", "Details"),
            "-".repeat(64),
        ];
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 { ms / total_ms * 100.0 } else { 0.0 };
            lines.push(format!(
                "{name:<12} {ms:>10.3}ms {pct:>7.1}%  {}",
                format_metrics(&diag.metrics)
            ));
        }
        lines.push(format!("Total: {total_ms:.3}ms"));
        lines.join("\n")
    }
}

/// Number of pixels that differ between two same-sized buffers.
pub(crate) fn changed_pixels(before: &PixelBuffer, after: &PixelBuffer) -> u64 {
    before
        .as_image()
        .pixels()
        .zip(after.as_image().pixels())
        .map(|(a, b)| u64::from(a != b))
        .sum()
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[allow(clippy::cast_precision_loss)]
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            dimensions,
        } => format!("{input_bytes} bytes -> {dimensions}"),
        StageMetrics::Denoise {
            luma_strength,
            chroma_strength,
            changed_pixels,
            pixel_count,
        } => format!(
            "h={luma_strength:.1}/{chroma_strength:.1} changed={changed_pixels} ({:.1}%)",
            percent(*changed_pixels, *pixel_count)
        ),
        StageMetrics::Resample { kernel, from, to } => format!("{kernel} {from} -> {to}"),
        StageMetrics::Texture {
            strength,
            changed_pixels,
            pixel_count,
        } => format!(
            "strength={strength:.4} changed={changed_pixels} ({:.1}%)",
            percent(*changed_pixels, *pixel_count)
        ),
        StageMetrics::Sharpen {
            intensity,
            changed_pixels,
            pixel_count,
        } => format!(
            "intensity={intensity:.2} changed={changed_pixels} ({:.1}%)",
            percent(*changed_pixels, *pixel_count)
        ),
        StageMetrics::Encode {
            format,
            output_bytes,
        } => format!("{format} {output_bytes} bytes"),
    }
}
