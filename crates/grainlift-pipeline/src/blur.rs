//! Gaussian blur.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`], which is generic over
//! the pixel type. 8-bit images come back clamped to the pixel range;
//! `f32` images (grain noise) keep their sign since the clamp for `f32`
//! is the identity.

use image::Pixel;
use imageproc::definitions::{Clamp, Image};

/// Blur every channel of `image` with a Gaussian of standard deviation
/// `sigma`. Non-positive or NaN `sigma` returns a copy, since
/// `imageproc` panics on it.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur<P>(image: &Image<P>, sigma: f32) -> Image<P>
where
    P: Pixel,
    <P as Pixel>::Subpixel: Into<f32> + Clamp<f32>,
{
    if sigma.is_nan() || sigma <= 0.0 {
        return image.clone();
    }
    imageproc::filter::gaussian_blur_f32(image, sigma)
}
