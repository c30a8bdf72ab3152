//! Edge-restricted unsharp masking.
//!
//! Small originals lose crispness when enlarged. The detail layer
//! `image * (1 + i) - blur * i` is blended back only where the
//! undilated edge mask is set, so flat areas and grain are left alone.

use crate::blur::gaussian_blur;
use crate::edge::edge_mask;
use crate::types::{EdgeParams, PixelBuffer};

/// Blur used to build the detail layer.
pub const BLUR_SIGMA: f32 = 1.0;

/// Sharpen the edges of `buffer`.
///
/// `intensity <= 0` returns an exact copy. Pixels off the edge mask are
/// returned unchanged; edge pixels become
/// `image * (1 - i) + details * i`, clamped to the pixel range.
#[must_use = "returns the sharpened buffer"]
pub fn sharpen(buffer: &PixelBuffer, intensity: f32, edges: &EdgeParams) -> PixelBuffer {
    if intensity.is_nan() || intensity <= 0.0 {
        return buffer.clone();
    }

    let blurred = gaussian_blur(buffer.as_image(), BLUR_SIGMA);
    let mask = edge_mask(buffer, &edges.undilated());

    buffer.map_pixels(|x, y, pixel| {
        let e = mask.weight(x, y) * intensity;
        if e <= 0.0 {
            return pixel;
        }
        let soft = blurred.get_pixel(x, y);
        image::Rgb(std::array::from_fn(|c| {
            let (v, b) = (f32::from(pixel.0[c]), f32::from(soft.0[c]));
            let details = v.mul_add(1.0 + intensity, -b * intensity);
            to_u8(v.mul_add(1.0 - e, details * e))
        }))
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::RgbImage;

    fn step_buffer() -> PixelBuffer {
        PixelBuffer::new(RgbImage::from_fn(20, 20, |x, _| {
            if x < 10 {
                image::Rgb([60, 60, 60])
            } else {
                image::Rgb([180, 180, 180])
            }
        }))
        .unwrap()
    }

    #[test]
    fn zero_or_negative_intensity_is_bit_identical() {
        let buffer = step_buffer();
        assert_eq!(sharpen(&buffer, 0.0, &EdgeParams::default()), buffer);
        assert_eq!(sharpen(&buffer, -0.5, &EdgeParams::default()), buffer);
    }

    #[test]
    fn flat_buffer_is_unchanged() {
        let buffer = PixelBuffer::filled(16, 16, [90, 100, 110]).unwrap();
        assert_eq!(sharpen(&buffer, 1.0, &EdgeParams::default()), buffer);
    }

    #[test]
    fn only_edge_pixels_change() {
        let buffer = step_buffer();
        let mask = edge_mask(&buffer, &EdgeParams::default().undilated());
        let out = sharpen(&buffer, 1.0, &EdgeParams::default());
        for (x, y, p) in out.as_image().enumerate_pixels() {
            if !mask.is_edge(x, y) {
                assert_eq!(p, buffer.as_image().get_pixel(x, y), "({x},{y}) changed");
            }
        }
    }

    #[test]
    fn edge_contrast_increases() {
        let buffer = step_buffer();
        let mask = edge_mask(&buffer, &EdgeParams::default().undilated());
        let out = sharpen(&buffer, 1.0, &EdgeParams::default());

        let mut changed = false;
        for (x, y, p) in out.as_image().enumerate_pixels() {
            if !mask.is_edge(x, y) {
                continue;
            }
            let v = p.0[0];
            if x < 10 {
                assert!(v <= 60, "dark side brightened at ({x},{y}): {v}");
            } else {
                assert!(v >= 180, "bright side darkened at ({x},{y}): {v}");
            }
            changed |= v != buffer.as_image().get_pixel(x, y).0[0];
        }
        assert!(changed);
    }

    #[test]
    fn nan_intensity_is_ignored() {
        let buffer = step_buffer();
        assert_eq!(sharpen(&buffer, f32::NAN, &EdgeParams::default()), buffer);
    }
}
