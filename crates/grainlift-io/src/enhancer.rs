//! File-to-file enhancement of a single image.

use std::any::Any;
use std::fmt;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;

use grainlift_pipeline::{
    EnhanceDiagnostics, EnhancementConfig, PipelineError, StageDiagnostics, StageGates,
    StageMetrics, enhance_buffer,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::codec::{self, OutputFormat};
use crate::error::EnhanceError;

/// Final state of one work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    Processed,
    /// The source could not be decoded.
    Skipped,
    Failed,
    /// The run was cancelled before the item started.
    Cancelled,
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Processed => "processed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        })
    }
}

/// What a successful [`ConservativeEnhancer::enhance`] produced.
#[derive(Debug, Clone)]
pub struct EnhancedFile {
    /// Bytes written to the destination.
    pub output_bytes: u64,
    pub gates: StageGates,
    pub diagnostics: EnhanceDiagnostics,
}

/// Result of enhancing one file.
pub type ItemOutcome = Result<EnhancedFile, EnhanceError>;

/// Decodes, enhances and re-encodes one file at a time.
///
/// Holds a validated [`EnhancementConfig`] and is shared read-only
/// between workers.
#[derive(Debug, Clone)]
pub struct ConservativeEnhancer {
    config: EnhancementConfig,
}

impl ConservativeEnhancer {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// validation.
    pub fn new(config: EnhancementConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &EnhancementConfig {
        &self.config
    }

    /// Enhance `source` into `destination`.
    ///
    /// The output format follows the destination extension. Panics
    /// inside the pixel stages are caught and reported as
    /// [`EnhanceError::StagePanic`].
    ///
    /// # Errors
    ///
    /// [`EnhanceError::Decode`] if the source cannot be read or decoded,
    /// [`EnhanceError::Encode`] if the destination format is unknown or
    /// writing fails, [`EnhanceError::Stage`] or
    /// [`EnhanceError::StagePanic`] if a stage fails.
    pub fn enhance(&self, source: &Path, destination: &Path) -> ItemOutcome {
        let start = Instant::now();
        let buffer = codec::decode(source).map_err(EnhanceError::Decode)?;
        let decode_time = start.elapsed();
        let format = OutputFormat::from_path(destination).map_err(EnhanceError::Encode)?;
        let dimensions = buffer.dimensions();

        let config = self.config.clone();
        let enhanced = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut rng = match config.grain_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            enhance_buffer(buffer, config, &mut rng)
        }))
        .map_err(|payload| EnhanceError::StagePanic(panic_message(&*payload)))??;

        let start = Instant::now();
        let output_bytes =
            codec::encode(&enhanced.buffer, destination, format).map_err(EnhanceError::Encode)?;
        let encode_time = start.elapsed();

        let mut diagnostics = enhanced.diagnostics;
        diagnostics.decode = Some(StageDiagnostics {
            duration: decode_time,
            metrics: StageMetrics::Decode {
                input_bytes: fs::metadata(source).map_or(0, |m| m.len()),
                dimensions,
            },
        });
        diagnostics.encode = Some(StageDiagnostics {
            duration: encode_time,
            metrics: StageMetrics::Encode {
                format: format.name().to_string(),
                output_bytes,
            },
        });

        tracing::debug!(
            source = %source.display(),
            gates = %enhanced.gates,
            output_bytes,
            "enhanced",
        );
        Ok(EnhancedFile {
            output_bytes,
            gates: enhanced.gates,
            diagnostics,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
