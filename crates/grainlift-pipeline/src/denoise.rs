//! Color-preserving non-local-means denoising.
//!
//! The buffer is split into luma and chroma (full-range BT.601 YCbCr).
//! Luma is filtered on its own; the two chroma planes are filtered
//! together so their weights agree and hues do not drift.
//!
//! For each pixel, every candidate in the search window contributes
//! with weight `exp(-d² / h²)`, where `d²` is the mean squared
//! difference between the two surrounding template patches. Patch
//! distances for one search offset are read from a summed-area table
//! of the per-pixel differences at that offset, so the cost per offset
//! is linear in the pixel count regardless of template size.
//!
//! Rows are split into bands that run in parallel on rayon's pool. Each
//! band visits the offsets in the same order, so the output does not
//! depend on the thread count.

use std::ops::Range;

use rayon::prelude::*;

use crate::types::{DenoiseParams, PixelBuffer, RgbImage};

/// Apply non-local-means to `buffer`.
///
/// Borders are handled by replicating the nearest pixel. The result has
/// the same dimensions as the input.
#[must_use = "returns the denoised buffer"]
pub fn denoise(buffer: &PixelBuffer, params: &DenoiseParams) -> PixelBuffer {
    let grid = Grid {
        width: buffer.width() as usize,
        height: buffer.height() as usize,
    };
    let [y, cb, cr] = to_ycbcr(buffer.as_image());

    let window = Window::new(params.template_window, params.search_window);
    let [y] = non_local_means(grid, &[y], params.luma_strength, window);
    let [cb, cr] = non_local_means(grid, &[cb, cr], params.chroma_strength, window);

    buffer.map_pixels(|px, py, _| {
        let i = py as usize * grid.width + px as usize;
        ycbcr_to_rgb(y[i], cb[i], cr[i])
    })
}

#[derive(Clone, Copy)]
struct Grid {
    width: usize,
    height: usize,
}

impl Grid {
    const fn len(self) -> usize {
        self.width * self.height
    }

    /// Index of `(x + dx, y + dy)` with both coordinates clamped.
    fn shifted(self, x: usize, y: usize, dx: isize, dy: isize) -> usize {
        let sx = x.saturating_add_signed(dx).min(self.width - 1);
        let sy = y.saturating_add_signed(dy).min(self.height - 1);
        sy * self.width + sx
    }
}

/// Half-sizes of the template and search windows.
#[derive(Clone, Copy)]
struct Window {
    patch: usize,
    reach: isize,
}

impl Window {
    #[allow(clippy::cast_possible_wrap)]
    const fn new(template: u32, search: u32) -> Self {
        Self {
            patch: (template / 2) as usize,
            reach: (search / 2) as isize,
        }
    }

    fn offsets(self) -> Vec<(isize, isize)> {
        let r = self.reach;
        (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
            .collect()
    }
}

/// Rows per parallel work unit.
const BAND_ROWS: usize = 16;

/// Filter `planes` jointly: one weight per pixel pair shared by all planes.
fn non_local_means<const N: usize>(
    grid: Grid,
    planes: &[Vec<f32>; N],
    strength: f32,
    window: Window,
) -> [Vec<f32>; N] {
    let offsets = window.offsets();
    let inv_h2 = 1.0 / f64::from(strength * strength);

    let starts: Vec<usize> = (0..grid.height).step_by(BAND_ROWS).collect();
    let bands: Vec<Vec<Vec<f32>>> = starts
        .into_par_iter()
        .map(|y| {
            let rows = y..(y + BAND_ROWS).min(grid.height);
            filter_band(grid, planes, &offsets, window.patch, inv_h2, rows)
        })
        .collect();

    let mut out: [Vec<f32>; N] = std::array::from_fn(|_| Vec::with_capacity(grid.len()));
    for band in bands {
        for (plane, part) in out.iter_mut().zip(band) {
            plane.extend(part);
        }
    }
    out
}

/// Filter the pixels of `rows`, visiting every offset in a fixed order.
///
/// Patch distances for one offset come from a summed-area table of
/// squared differences over the band plus `patch` rows of margin.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn filter_band(
    grid: Grid,
    planes: &[Vec<f32>],
    offsets: &[(isize, isize)],
    patch: usize,
    inv_h2: f64,
    rows: Range<usize>,
) -> Vec<Vec<f32>> {
    let Grid { width, height } = grid;
    let top = rows.start.saturating_sub(patch);
    let bottom = (rows.end + patch).min(height);
    let stride = width + 1;
    let band_len = rows.len() * width;
    let channels = planes.len() as f64;

    let mut weights = vec![0.0f64; band_len];
    let mut sums = vec![vec![0.0f64; band_len]; planes.len()];
    // Row and column zero stay zero.
    let mut table = vec![0.0f64; stride * (bottom - top + 1)];

    for &(dx, dy) in offsets {
        for y in top..bottom {
            let t = y - top;
            let mut row = 0.0;
            for x in 0..width {
                let i = y * width + x;
                let j = grid.shifted(x, y, dx, dy);
                row += planes
                    .iter()
                    .map(|p| {
                        let d = f64::from(p[i] - p[j]);
                        d * d
                    })
                    .sum::<f64>();
                table[(t + 1) * stride + x + 1] = table[t * stride + x + 1] + row;
            }
        }

        for y in rows.clone() {
            let y0 = y.saturating_sub(patch) - top;
            let y1 = (y + patch).min(height - 1) + 1 - top;
            for x in 0..width {
                let x0 = x.saturating_sub(patch);
                let x1 = (x + patch).min(width - 1) + 1;
                let sum = table[y1 * stride + x1] - table[y0 * stride + x1]
                    - table[y1 * stride + x0]
                    + table[y0 * stride + x0];
                let count = ((x1 - x0) * (y1 - y0)) as f64 * channels;
                let weight = (-(sum / count).max(0.0) * inv_h2).exp();

                let i = (y - rows.start) * width + x;
                let j = grid.shifted(x, y, dx, dy);
                weights[i] += weight;
                for (acc, plane) in sums.iter_mut().zip(planes) {
                    acc[i] += weight * f64::from(plane[j]);
                }
            }
        }
    }

    let first = rows.start * width;
    planes
        .iter()
        .zip(&sums)
        .map(|(plane, acc)| {
            acc.iter()
                .zip(&weights)
                .enumerate()
                .map(|(k, (&sum, &weight))| {
                    if weight > 0.0 {
                        (sum / weight) as f32
                    } else {
                        plane[first + k]
                    }
                })
                .collect()
        })
        .collect()
}

/// Split into Y, Cb, Cr planes (full-range BT.601, 0–255).
fn to_ycbcr(image: &RgbImage) -> [Vec<f32>; 3] {
    let len = image.as_raw().len() / 3;
    let mut planes = [
        Vec::with_capacity(len),
        Vec::with_capacity(len),
        Vec::with_capacity(len),
    ];
    for p in image.pixels() {
        let [r, g, b] = p.0.map(f32::from);
        planes[0].push(0.114f32.mul_add(b, 0.299f32.mul_add(r, 0.587 * g)));
        planes[1].push(0.5f32.mul_add(b, (-0.168_736f32).mul_add(r, -0.331_264 * g)) + 128.0);
        planes[2].push((-0.081_312f32).mul_add(b, 0.5f32.mul_add(r, -0.418_688 * g)) + 128.0);
    }
    planes
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

fn ycbcr_to_rgb(l: f32, cb: f32, cr: f32) -> image::Rgb<u8> {
    let (b, r) = (cb - 128.0, cr - 128.0);
    image::Rgb([
        to_u8(1.402f32.mul_add(r, l)),
        to_u8((-0.714_136f32).mul_add(r, (-0.344_136f32).mul_add(b, l))),
        to_u8(1.772f32.mul_add(b, l)),
    ])
}
