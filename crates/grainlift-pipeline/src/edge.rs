//! Edge masks: where the image has hard boundaries.
//!
//! Grain synthesis and sharpening both confine their edits with an
//! [`EdgeMask`]: grain goes only where the mask is clear, sharpening
//! only where it is set. A mask is always computed from the buffer it
//! is applied to, never reused across a resample.

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;

use crate::canny;
use crate::types::{EdgeParams, PixelBuffer};

/// Minimum allowed Canny threshold.
///
/// A threshold of zero turns every pixel with any gradient into an
/// edge candidate.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Mask value for edge pixels.
const SET: u8 = 255;

/// Binary edge map aligned 1:1 with a [`PixelBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeMask(GrayImage);

impl EdgeMask {
    /// Wrap a binary map. Any non-zero value counts as an edge.
    #[must_use]
    pub fn from_gray(map: GrayImage) -> Self {
        let mut map = map;
        for p in map.pixels_mut() {
            if p.0[0] != 0 {
                p.0[0] = SET;
            }
        }
        Self(map)
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

    /// Whether `(x, y)` lies on an edge.
    #[must_use]
    pub fn is_edge(&self, x: u32, y: u32) -> bool {
        self.0.get_pixel(x, y).0[0] == SET
    }

    /// Edge weight at `(x, y)`: 1.0 on edges, 0.0 elsewhere.
    #[must_use]
    pub fn weight(&self, x: u32, y: u32) -> f32 {
        f32::from(self.0.get_pixel(x, y).0[0]) / f32::from(SET)
    }

    /// Number of edge pixels.
    #[must_use]
    pub fn edge_pixel_count(&self) -> u64 {
        self.0.pixels().map(|p| u64::from(p.0[0] == SET)).sum()
    }

    /// Swap edge and background.
    #[must_use = "returns the inverted mask"]
    pub fn inverted(&self) -> Self {
        Self(GrayImage::from_fn(self.width(), self.height(), |x, y| {
            image::Luma([!self.0.get_pixel(x, y).0[0]])
        }))
    }

    /// Borrow the underlying 0/255 map.
    #[must_use]
    pub const fn as_gray(&self) -> &GrayImage {
        &self.0
    }
}

/// Detect edges on the luma of `buffer`.
///
/// Runs [`canny`] with the configured thresholds, then applies
/// `params.dilation` passes of a 3×3 square dilation to widen each
/// edge's influence.
#[must_use = "returns the edge mask"]
pub fn edge_mask(buffer: &PixelBuffer, params: &EdgeParams) -> EdgeMask {
    let luma = image::DynamicImage::ImageRgb8(buffer.as_image().clone()).into_luma8();
    let edges = canny(&luma, params.low_threshold, params.high_threshold);
    let edges = if params.dilation > 0 {
        dilate(&edges, Norm::LInf, params.dilation)
    } else {
        edges
    };
    EdgeMask(edges)
}

/// Canny with both thresholds clamped to at least [`MIN_THRESHOLD`] and
/// `low_threshold` clamped to at most `high_threshold`.
///
/// Returns a binary image: 255 for edge pixels, 0 elsewhere.
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let high = high_threshold.max(MIN_THRESHOLD);
    let low = low_threshold.max(MIN_THRESHOLD).min(high);
    canny::canny(image, low, high)
}
