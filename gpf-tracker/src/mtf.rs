//! MTF (modulation transfer function) estimation (spec.md §4.2 step 6,
//! optional): compares the measured black/white mean intensities on a
//! strip of known reference squares to their nominal full-scale
//! extremes.
//!
//! Grounded on `calculate_average` in
//! `examples/original_source/src/unboxer/frametrackerutil.c`, which
//! averages a rectangular patch of the sampled matrix around each
//! reference square.

use gpf_primitives::GrayImage;

/// Horizontal and vertical MTF figures, each `(measured range) /
/// (nominal 0..255 range)`; `1.0` is a perfect, undegraded transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MtfEstimate {
    pub horizontal: f64,
    pub vertical: f64,
}

const NOMINAL_RANGE: f64 = 255.0;

/// Splits a strip `[x, x+width) x [y, y+height)` into `cells` equal
/// columns, classifies each by whether its mean sits above or below
/// the strip's median, and returns `(white_mean, black_mean)`.
fn cell_means(image: &GrayImage, x: usize, y: usize, width: usize, height: usize, cells: usize) -> (f64, f64) {
    let cell_width = (width / cells.max(1)).max(1);
    let means: Vec<f64> = (0..cells)
        .map(|cell| {
            let cx = x + cell * cell_width;
            let histogram = image.strip_histogram(cx, y, cell_width, height);
            if histogram.is_empty() {
                0.0
            } else {
                histogram.iter().map(|&v| v as u32).sum::<u32>() as f64 / histogram.len() as f64
            }
        })
        .collect();

    let mut sorted = means.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let median = sorted[sorted.len() / 2];

    let (mut white_sum, mut white_n, mut black_sum, mut black_n) = (0.0, 0u32, 0.0, 0u32);
    for &mean in &means {
        if mean >= median {
            white_sum += mean;
            white_n += 1;
        } else {
            black_sum += mean;
            black_n += 1;
        }
    }
    let white_mean = if white_n > 0 {
        white_sum / white_n as f64
    } else {
        NOMINAL_RANGE
    };
    let black_mean = if black_n > 0 { black_sum / black_n as f64 } else { 0.0 };
    (white_mean, black_mean)
}

/// Estimates MTF from a horizontal calibration strip and a vertical
/// reference strip, each containing `cells` alternating black/white
/// reference squares at their nominal full-scale extremes.
pub fn estimate(
    image: &GrayImage,
    horizontal_strip: (usize, usize, usize, usize),
    vertical_strip: (usize, usize, usize, usize),
    cells: usize,
) -> MtfEstimate {
    let (hx, hy, hw, hh) = horizontal_strip;
    let (vx, vy, vw, vh) = vertical_strip;
    let (h_white, h_black) = cell_means(image, hx, hy, hw, hh, cells);
    let (v_white, v_black) = cell_means(image, vx, vy, vw, vh, cells);
    MtfEstimate {
        horizontal: (h_white - h_black) / NOMINAL_RANGE,
        vertical: (v_white - v_black) / NOMINAL_RANGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard_strip(width: usize, height: usize, period: usize) -> GrayImage {
        let mut image = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let value = if (x / period) % 2 == 0 { 0 } else { 255 };
                image.set(x, y, value);
            }
        }
        image
    }

    #[test]
    fn a_full_contrast_strip_estimates_near_unity() {
        let image = checkerboard_strip(64, 16, 8);
        let estimate = super::estimate(&image, (0, 0, 64, 16), (0, 0, 64, 16), 8);
        assert!(estimate.horizontal > 0.9);
        assert!(estimate.vertical > 0.9);
    }

    #[test]
    fn a_washed_out_strip_estimates_low_mtf() {
        let mut image = checkerboard_strip(64, 16, 8);
        for y in 0..16 {
            for x in 0..64 {
                let v = image.get(x, y);
                image.set(x, y, 100 + v / 4);
            }
        }
        let estimate = super::estimate(&image, (0, 0, 64, 16), (0, 0, 64, 16), 8);
        assert!(estimate.horizontal < 0.6);
    }
}
