//! Canny edge detection.
//!
//! Follows `imageproc::edges::canny` (Gaussian pre-blur with sigma 1.4,
//! Sobel gradients, non-maximum suppression, hysteresis) with two
//! corrections to the hysteresis walk:
//!
//! 1. Neighbor coordinates are bounds-checked before they are read, so
//!    a walk that reaches column or row zero cannot underflow and panic
//!    (imageproc#705).
//! 2. All eight neighbors are followed. Upstream skips north and
//!    north-east (imageproc#746), which truncates edges that run
//!    upward.
//!
//! Works on flat row-major buffers instead of per-pixel image accessors
//! so no unchecked access is needed.

use image::{GrayImage, Luma};
use imageproc::definitions::Image;
use imageproc::filter::{filter_clamped, gaussian_blur_f32};
use imageproc::kernel;

/// Pre-blur applied before the gradient step.
const PRE_BLUR_SIGMA: f32 = 1.4;

/// Edge value written to the output map.
const EDGE: u8 = 255;

/// Run Canny on a grayscale image.
///
/// Returns a binary map: 255 on edges, 0 elsewhere. `low_threshold` is
/// clamped to at most `high_threshold`. Images narrower or shorter than
/// three pixels have no interior and produce an empty map.
#[must_use = "returns the binary edge map"]
pub fn canny(image: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 {
        return GrayImage::new(width, height);
    }
    let low = low_threshold.min(high_threshold);

    let blurred = gaussian_blur_f32(image, PRE_BLUR_SIGMA);
    let gx: Image<Luma<i16>> = filter_clamped(&blurred, kernel::SOBEL_HORIZONTAL_3X3);
    let gy: Image<Luma<i16>> = filter_clamped(&blurred, kernel::SOBEL_VERTICAL_3X3);

    let grid = Grid::new(width, height);
    let magnitude: Vec<f32> = gx
        .iter()
        .zip(gy.iter())
        .map(|(&h, &v)| f32::from(h).hypot(f32::from(v)))
        .collect();

    let thinned = non_maximum_suppression(grid, &magnitude, gx.as_raw(), gy.as_raw());
    let edges = hysteresis(grid, &thinned, low, high_threshold);

    GrayImage::from_fn(width, height, |x, y| Luma([edges[grid.index(x as usize, y as usize)]]))
}

/// Row-major index helper.
#[derive(Clone, Copy)]
struct Grid {
    width: usize,
    height: usize,
}

impl Grid {
    const fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as usize,
            height: height as usize,
        }
    }

    const fn len(self) -> usize {
        self.width * self.height
    }

    const fn index(self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Offset `(x, y)` by `(dx, dy)`, or `None` outside the grid.
    fn offset(self, x: usize, y: usize, dx: isize, dy: isize) -> Option<(usize, usize)> {
        let nx = x.checked_add_signed(dx)?;
        let ny = y.checked_add_signed(dy)?;
        (nx < self.width && ny < self.height).then_some((nx, ny))
    }
}

/// Keep only pixels that are maximal along their gradient direction.
///
/// The one-pixel border is always suppressed.
fn non_maximum_suppression(grid: Grid, magnitude: &[f32], gx: &[i16], gy: &[i16]) -> Vec<f32> {
    let mut out = vec![0.0; grid.len()];
    for y in 1..grid.height - 1 {
        for x in 1..grid.width - 1 {
            let i = grid.index(x, y);
            let mut angle = f32::from(gy[i]).atan2(f32::from(gx[i])).to_degrees();
            if angle < 0.0 {
                angle += 180.0;
            }

            // Neighbor pair across the edge, by quantized direction.
            let ((ax, ay), (bx, by)) = if !(22.5..157.5).contains(&angle) {
                ((x - 1, y), (x + 1, y))
            } else if angle < 67.5 {
                ((x + 1, y + 1), (x - 1, y - 1))
            } else if angle < 112.5 {
                ((x, y - 1), (x, y + 1))
            } else {
                ((x - 1, y + 1), (x + 1, y - 1))
            };

            let m = magnitude[i];
            if m >= magnitude[grid.index(ax, ay)] && m >= magnitude[grid.index(bx, by)] {
                out[i] = m;
            }
        }
    }
    out
}

/// Neighbor offsets followed by the hysteresis walk.
const NEIGHBORS: [(isize, isize); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (1, -1),
];

/// Promote strong pixels to edges and grow them through weak ones.
fn hysteresis(grid: Grid, thinned: &[f32], low: f32, high: f32) -> Vec<u8> {
    let mut out = vec![0u8; grid.len()];
    let mut stack = Vec::new();

    for y in 1..grid.height - 1 {
        for x in 1..grid.width - 1 {
            let i = grid.index(x, y);
            if thinned[i] < high || out[i] == EDGE {
                continue;
            }
            out[i] = EDGE;
            stack.push((x, y));

            while let Some((cx, cy)) = stack.pop() {
                for (dx, dy) in NEIGHBORS {
                    let Some((nx, ny)) = grid.offset(cx, cy, dx, dy) else {
                        continue;
                    };
                    let n = grid.index(nx, ny);
                    if thinned[n] >= low && out[n] == 0 {
                        out[n] = EDGE;
                        stack.push((nx, ny));
                    }
                }
            }
        }
    }
    out
}
