//! Error types for file-level work.

use std::io;
use std::path::PathBuf;

use grainlift_pipeline::PipelineError;

use crate::enhancer::ItemStatus;

/// Reading or writing one image file.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The file was read but is not a decodable image.
    #[error("cannot decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },

    /// The file could not be opened or read.
    #[error("cannot read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    /// The destination extension does not map to a known encoder.
    #[error("unsupported output format for {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    /// The encoder rejected the buffer.
    #[error("{format} encoding failed: {message}")]
    Encode {
        format: &'static str,
        message: String,
    },

    /// The encoded bytes could not be written to their destination.
    #[error("cannot write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Why one image did not make it through the enhancer.
#[derive(Debug, thiserror::Error)]
pub enum EnhanceError {
    #[error("decode failed: {0}")]
    Decode(#[source] CodecError),

    #[error("encode failed: {0}")]
    Encode(#[source] CodecError),

    #[error("enhancement failed: {0}")]
    Stage(#[from] PipelineError),

    /// A stage panicked; the payload message is kept.
    #[error("enhancement panicked: {0}")]
    StagePanic(String),
}

impl EnhanceError {
    /// Unreadable sources are skipped; everything else is a failure.
    #[must_use]
    pub const fn status(&self) -> ItemStatus {
        match self {
            Self::Decode(_) => ItemStatus::Skipped,
            Self::Encode(_) | Self::Stage(_) | Self::StagePanic(_) => ItemStatus::Failed,
        }
    }
}

/// Errors that stop a whole run.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// The source directory could not be listed.
    #[error("cannot read source directory {}: {source}", path.display())]
    Discovery { path: PathBuf, source: io::Error },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    InvalidConfig(#[from] PipelineError),
}
