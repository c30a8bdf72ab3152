//! Decoding source files and writing enhanced outputs.
//!
//! Outputs are encoded fully in memory, written to a temporary file next
//! to the destination and renamed into place, so a failed run never
//! leaves a truncated image behind.

use std::fmt;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use grainlift_pipeline::PixelBuffer;
use image::ImageFormat;
use image::codecs::jpeg::JpegEncoder;
use image::error::{ParameterError, ParameterErrorKind};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::CodecError;

/// Encoder chosen from the destination extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    WebP { quality: u8 },
    Png,
    Bmp,
    Tiff,
}

impl OutputFormat {
    pub const JPEG_QUALITY: u8 = 92;
    pub const WEBP_QUALITY: u8 = 90;

    /// Format for a file extension, compared case-insensitively.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg {
                quality: Self::JPEG_QUALITY,
            }),
            "webp" => Some(Self::WebP {
                quality: Self::WEBP_QUALITY,
            }),
            "png" => Some(Self::Png),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    /// Format implied by `path`'s extension.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedFormat`] if the extension is
    /// missing or unknown.
    pub fn from_path(path: &Path) -> Result<Self, CodecError> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| CodecError::UnsupportedFormat {
                path: path.to_path_buf(),
            })
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpeg",
            Self::WebP { .. } => "webp",
            Self::Png => "png",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jpeg { quality } | Self::WebP { quality } => {
                write!(f, "{} (quality {quality})", self.name())
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Decode `path` into an RGB buffer. The format is sniffed from the
/// content, not the extension.
///
/// # Errors
///
/// [`CodecError::Read`] if the file cannot be opened, and
/// [`CodecError::Decode`] if its content is not a supported image.
pub fn decode(path: &Path) -> Result<PixelBuffer, CodecError> {
    let read_err = |source| CodecError::Read {
        path: path.to_path_buf(),
        source,
    };
    let image = image::ImageReader::open(path)
        .map_err(read_err)?
        .with_guessed_format()
        .map_err(read_err)?
        .decode()
        .map_err(|source| CodecError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    PixelBuffer::from_dynamic(&image).map_err(|_| CodecError::Decode {
        path: path.to_path_buf(),
        source: image::ImageError::Parameter(ParameterError::from_kind(
            ParameterErrorKind::DimensionMismatch,
        )),
    })
}

/// Encode `buffer` in memory.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if the encoder fails.
pub fn encode_to_vec(buffer: &PixelBuffer, format: OutputFormat) -> Result<Vec<u8>, CodecError> {
    let encode_err = |message: String| CodecError::Encode {
        format: format.name(),
        message,
    };
    let image = buffer.as_image();

    match format {
        OutputFormat::Jpeg { quality } => {
            let mut out = Vec::new();
            image
                .write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
                .map_err(|e| encode_err(e.to_string()))?;
            Ok(out)
        }
        OutputFormat::WebP { quality } => {
            // `image` only writes lossless WebP.
            let encoder = webp::Encoder::from_rgb(image.as_raw(), image.width(), image.height());
            let mut config = webp::WebPConfig::new()
                .map_err(|()| encode_err("cannot create encoder config".to_string()))?;
            config.quality = f32::from(quality);
            let memory = encoder
                .encode_advanced(&config)
                .map_err(|e| encode_err(format!("{e:?}")))?;
            Ok(memory.to_vec())
        }
        OutputFormat::Png | OutputFormat::Bmp | OutputFormat::Tiff => {
            let image_format = match format {
                OutputFormat::Png => ImageFormat::Png,
                OutputFormat::Bmp => ImageFormat::Bmp,
                _ => ImageFormat::Tiff,
            };
            let mut cursor = Cursor::new(Vec::new());
            image
                .write_to(&mut cursor, image_format)
                .map_err(|e| encode_err(e.to_string()))?;
            Ok(cursor.into_inner())
        }
    }
}

/// Encode `buffer` and atomically write it to `path`, creating missing
/// parent directories. Returns the number of bytes written.
///
/// # Errors
///
/// [`CodecError::Encode`] if encoding fails, [`CodecError::Write`] if
/// the directory, temporary file or final rename fails.
pub fn encode(buffer: &PixelBuffer, path: &Path, format: OutputFormat) -> Result<u64, CodecError> {
    let bytes = encode_to_vec(buffer, format)?;

    let write_err = |at: &Path, source| CodecError::Write {
        path: at.to_path_buf(),
        source,
    };
    let parent: PathBuf = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| write_err(&parent, e))?;

    let mut temp = NamedTempFile::new_in(&parent).map_err(|e| write_err(&parent, e))?;
    temp.write_all(&bytes).map_err(|e| write_err(temp.path(), e))?;
    temp.as_file().sync_all().map_err(|e| write_err(path, e))?;
    temp.persist(path).map_err(|e| write_err(path, e.error))?;

    Ok(bytes.len() as u64)
}
