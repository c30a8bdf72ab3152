//! Synthetic grain for smooth regions.
//!
//! Interpolation leaves large flat areas looking plastic. A faint layer
//! of slightly blurred Gaussian noise, kept off the edges, restores the
//! look of film or sensor grain without adding visible noise.

use image::Rgb32FImage;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::blur::gaussian_blur;
use crate::edge::edge_mask;
use crate::types::{EdgeParams, PixelBuffer};

/// Low-pass applied to each noise plane so grain has some body.
pub const NOISE_SIGMA: f32 = 0.5;

/// Add grain to the non-edge pixels of `buffer`.
///
/// Each channel gets its own standard-normal noise plane, blurred with
/// [`NOISE_SIGMA`] and scaled by `strength * 255`. The noise is
/// multiplied by the inverted (dilated) edge mask of `buffer`, so edge
/// pixels come back unchanged. A non-positive `strength` returns a copy
/// without drawing from `rng`.
#[must_use = "returns the textured buffer"]
pub fn add_grain<R: Rng + ?Sized>(
    buffer: &PixelBuffer,
    strength: f32,
    edges: &EdgeParams,
    rng: &mut R,
) -> PixelBuffer {
    if strength <= 0.0 {
        return buffer.clone();
    }

    let smooth = edge_mask(buffer, edges).inverted();
    let noise = Rgb32FImage::from_fn(buffer.width(), buffer.height(), |_, _| {
        image::Rgb(std::array::from_fn(|_| StandardNormal.sample(&mut *rng)))
    });
    let noise = gaussian_blur(&noise, NOISE_SIGMA);

    let amplitude = strength * 255.0;
    buffer.map_pixels(|x, y, pixel| {
        let weight = smooth.weight(x, y) * amplitude;
        if weight <= 0.0 {
            return pixel;
        }
        let grain = noise.get_pixel(x, y);
        image::Rgb(std::array::from_fn(|c| {
            to_u8(grain.0[c].mul_add(weight, f32::from(pixel.0[c])))
        }))
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
