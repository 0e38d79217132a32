//! Border detection (spec.md §4.2 step 1), corner-mark refinement
//! (step 2) and columnwise border tracking (step 4).
//!
//! Grounded on `examples/original_source/src/unboxer/frametrackerutil.c`:
//! `boxing_frame_tracker_util_find_vertical_border` /
//! `find_horizontal_border` for the threshold-crossing walk,
//! `boxing_frame_tracker_util_find_corner_mark` for the summed-area
//! table search, and `find_max_location_rate` /
//! `boxing_frame_tracker_util_track_vertical_border` for the
//! differentiator-correlate-then-refine border track.

use crate::dsp::find_max_location_rate;
use crate::{Point2D, TrackerError};
use gpf_primitives::GrayImage;

/// The four detected edges of the frame, in absolute image pixel
/// coordinates (not yet corner-mark-refined).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BorderBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Percentile-based crossing threshold for a local strip, per
/// spec.md §4.2 step 1: 30% of the 5th-to-95th-percentile range above
/// the 5th percentile.
fn crossing_threshold(histogram: &[u8]) -> f64 {
    let p5 = GrayImage::percentile(histogram, 0.05) as f64;
    let p95 = GrayImage::percentile(histogram, 0.95) as f64;
    p5 + 0.3 * (p95 - p5)
}

/// Walks from `start` in `step` (±1) increments along `axis` (0 = walk
/// along x i.e. a horizontal walk at fixed y, 1 = walk along y at
/// fixed column), returning the offset in walked steps of the first
/// pixel whose value crosses `threshold` relative to the starting
/// pixel's side of the threshold. `None` if no crossing occurs within
/// `max_steps`.
#[allow(clippy::too_many_arguments)]
fn walk_to_crossing(
    image: &GrayImage,
    fixed: usize,
    start: i64,
    step: i64,
    axis_is_y: bool,
    threshold: f64,
    max_steps: i64,
) -> Option<i64> {
    let sample = |pos: i64| -> Option<u8> {
        if axis_is_y {
            image.try_get(fixed as i64, pos)
        } else {
            image.try_get(pos, fixed as i64)
        }
    };

    let initial = sample(start)? as f64;
    let initial_side = initial >= threshold;

    let mut pos = start;
    for offset in 1..=max_steps {
        pos += step;
        let value = sample(pos)? as f64;
        if (value >= threshold) != initial_side {
            return Some(offset);
        }
    }
    None
}

/// Detects the frame border along all four edges, at three regularly
/// spaced positions each, keeping the most inset (worst) of the three
/// per edge. Fails if any of the twelve walks does not find a
/// crossing.
pub fn detect_border(image: &GrayImage) -> Result<BorderBox, TrackerError> {
    let width = image.width();
    let height = image.height();
    let strip_half = 100usize;
    let probe_depth = 20usize;
    let max_steps = (width.min(height) / 2) as i64;

    let positions = |extent: usize| -> [usize; 3] {
        [extent / 4, extent / 2, (3 * extent) / 4]
    };

    // Top edge: walk down at three x positions.
    let mut top_offsets = Vec::with_capacity(3);
    for x in positions(width).iter() {
        let x0 = x.saturating_sub(strip_half);
        let histogram = image.strip_histogram(x0, 0, 2 * strip_half, probe_depth);
        let threshold = crossing_threshold(&histogram);
        let offset = walk_to_crossing(image, *x, 0, 1, true, threshold, max_steps)
            .ok_or(TrackerError::BorderTrackingFailed)?;
        top_offsets.push(offset);
    }

    // Bottom edge: walk up at three x positions.
    let mut bottom_offsets = Vec::with_capacity(3);
    for x in positions(width).iter() {
        let x0 = x.saturating_sub(strip_half);
        let y0 = height.saturating_sub(probe_depth);
        let histogram = image.strip_histogram(x0, y0, 2 * strip_half, probe_depth);
        let threshold = crossing_threshold(&histogram);
        let offset = walk_to_crossing(
            image,
            *x,
            height as i64 - 1,
            -1,
            true,
            threshold,
            max_steps,
        )
        .ok_or(TrackerError::BorderTrackingFailed)?;
        bottom_offsets.push(offset);
    }

    // Left edge: walk right at three y positions.
    let mut left_offsets = Vec::with_capacity(3);
    for y in positions(height).iter() {
        let y0 = y.saturating_sub(strip_half);
        let histogram = image.strip_histogram(0, y0, probe_depth, 2 * strip_half);
        let threshold = crossing_threshold(&histogram);
        let offset = walk_to_crossing(image, *y, 0, 1, false, threshold, max_steps)
            .ok_or(TrackerError::BorderTrackingFailed)?;
        left_offsets.push(offset);
    }

    // Right edge: walk left at three y positions.
    let mut right_offsets = Vec::with_capacity(3);
    for y in positions(height).iter() {
        let y0 = y.saturating_sub(strip_half);
        let x0 = width.saturating_sub(probe_depth);
        let histogram = image.strip_histogram(x0, y0, probe_depth, 2 * strip_half);
        let threshold = crossing_threshold(&histogram);
        let offset = walk_to_crossing(
            image,
            *y,
            width as i64 - 1,
            -1,
            false,
            threshold,
            max_steps,
        )
        .ok_or(TrackerError::BorderTrackingFailed)?;
        right_offsets.push(offset);
    }

    let worst = |offsets: &[i64]| -> i64 { *offsets.iter().max().unwrap() };

    Ok(BorderBox {
        top: worst(&top_offsets) as f64,
        bottom: (height as i64 - 1 - worst(&bottom_offsets)) as f64,
        left: worst(&left_offsets) as f64,
        right: (width as i64 - 1 - worst(&right_offsets)) as f64,
    })
}

/// Minimizes the checkerboard squared-error score over every
/// candidate center in a `3 * corner_mark_size`-wide search box around
/// `nominal`, using a summed-area table for O(1) quadrant sums per
/// candidate. `top_left` selects which diagonal carries the dark
/// quadrants (`true`: NW/SE dark, NE/SW light), matching the
/// checkerboard's orientation at each of the frame's four corners.
/// `corner_mark_gap` is the quiet-zone margin left un-painted around
/// the checkerboard within the mark's bounding box
/// (`referencepoint.c`'s `render`: `tile_size = (size - 2*gap) / 2`,
/// each dark tile drawn at a `gap`-inset offset), so the patch searched
/// per quadrant is sized to the actual painted tile, not the full mark.
pub fn refine_corner_mark(
    image: &GrayImage,
    nominal: Point2D,
    corner_mark_size: i64,
    corner_mark_gap: i64,
    dark_diagonal_is_nw_se: bool,
) -> Point2D {
    let integral = image.integral_image();
    let patch = ((corner_mark_size - 2 * corner_mark_gap) / 2).max(1) as usize;
    let search_radius = corner_mark_size; // a 3x corner-mark-sized box, i.e. +/- 1.5x, rounded to +/- corner_mark_size here for an integer step grid
    let half_patch = patch as i64 / 2;

    let cx = nominal.x.round() as i64;
    let cy = nominal.y.round() as i64;

    let box_x0 = (cx - search_radius).max(half_patch) as usize;
    let box_y0 = (cy - search_radius).max(half_patch) as usize;
    let box_x1 = (cx + search_radius).min(image.width() as i64 - half_patch - 1) as usize;
    let box_y1 = (cy + search_radius).min(image.height() as i64 - half_patch - 1) as usize;

    let strip = image.strip_histogram(
        box_x0.saturating_sub(patch),
        box_y0.saturating_sub(patch),
        (box_x1 + patch).saturating_sub(box_x0.saturating_sub(patch)),
        (box_y1 + patch).saturating_sub(box_y0.saturating_sub(patch)),
    );
    let hist_min = GrayImage::percentile(&strip, 0.05) as f64;
    let hist_max = GrayImage::percentile(&strip, 0.95) as f64;

    let quadrant_mean = |x: i64, y: i64| -> f64 {
        if x < 0 || y < 0 {
            return 0.0;
        }
        let sum = integral.rect_sum(x as usize, y as usize, patch, patch);
        sum as f64 / (patch * patch) as f64
    };

    let mut best_center = nominal;
    let mut best_score = f64::INFINITY;

    for y in box_y0..=box_y1 {
        for x in box_x0..=box_x1 {
            let (x, y) = (x as i64, y as i64);
            let nw = quadrant_mean(x - patch as i64, y - patch as i64);
            let ne = quadrant_mean(x, y - patch as i64);
            let sw = quadrant_mean(x - patch as i64, y);
            let se = quadrant_mean(x, y);

            let (dark, light) = if dark_diagonal_is_nw_se {
                ([nw, se], [ne, sw])
            } else {
                ([ne, sw], [nw, se])
            };

            let score: f64 = dark.iter().map(|v| (v - hist_min).powi(2)).sum::<f64>()
                + light.iter().map(|v| (v - hist_max).powi(2)).sum::<f64>();

            if score < best_score {
                best_score = score;
                best_center = Point2D::new(x as f64, y as f64);
            }
        }
    }

    best_center
}

/// Per-row sub-pixel x position of a vertical border (left or right
/// edge of the content area), between image rows `[row_start,
/// row_end)`, columns near `nominal_x`. `scan_left_to_right` selects
/// the `[1, -1]` vs `[-1, 1]` differentiator polarity (the original's
/// `scan_direction`), matching whether the border is approached from
/// the dark or light side.
pub fn track_vertical_border(
    image: &GrayImage,
    row_start: usize,
    row_end: usize,
    nominal_x: f64,
    search_radius: usize,
    scan_left_to_right: bool,
) -> Vec<f64> {
    let window = 15usize;
    let half_window = window / 2;
    let x0 = (nominal_x as i64 - search_radius as i64).max(1) as usize;
    let width = 2 * search_radius + 1;

    let height = row_end - row_start;
    let mut data = vec![0.0f64; width * height];

    let (a_coeff, b_coeff) = if scan_left_to_right {
        (1.0, -1.0)
    } else {
        (-1.0, 1.0)
    };

    for (row, y) in (row_start..row_end).enumerate() {
        for col in 0..width {
            let x = x0 + col;
            let mut a = 0.0f64;
            let mut b = 0.0f64;
            for j in 0..window {
                let sample_y = y as i64 + j as i64 - half_window as i64;
                a += image.try_get(x as i64 - 1, sample_y).unwrap_or(0) as f64;
                b += image.try_get(x as i64 + 1, sample_y).unwrap_or(0) as f64;
            }
            a /= window as f64;
            b /= window as f64;
            data[row * width + col] = a_coeff * a + b_coeff * b;
        }
    }

    let reference = nominal_x - x0 as f64;
    let positions = find_max_location_rate(&data, width, height, reference, 1.0);
    positions.into_iter().map(|p| p + x0 as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(width: usize, height: usize, border: u8) -> GrayImage {
        let mut image = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                image.set(x, y, border);
            }
        }
        for y in 5..height - 5 {
            for x in 5..width - 5 {
                image.set(x, y, 200);
            }
        }
        image
    }

    #[test]
    fn detect_border_finds_a_uniform_inset_border() {
        let image = checkerboard(200, 200, 10);
        let border = detect_border(&image).unwrap();
        assert!((border.top - 5.0).abs() <= 1.0);
        assert!((border.left - 5.0).abs() <= 1.0);
        assert!((border.right - 194.0).abs() <= 1.0);
        assert!((border.bottom - 194.0).abs() <= 1.0);
    }

    #[test]
    fn detect_border_fails_on_a_blank_image() {
        let image = GrayImage::new(100, 100);
        assert!(detect_border(&image).is_err());
    }

    #[test]
    fn refine_corner_mark_locks_onto_an_exact_checkerboard() {
        let size = 32i64;
        let mut image = GrayImage::new(128, 128);
        let (cx, cy) = (32i64, 32i64);
        for y in 0..128i64 {
            for x in 0..128i64 {
                let dark_quadrant = (x < cx) == (y < cy);
                let within = (x - cx).abs() <= size && (y - cy).abs() <= size;
                if within {
                    image.set(x as usize, y as usize, if dark_quadrant { 0 } else { 255 });
                } else {
                    image.set(x as usize, y as usize, 128);
                }
            }
        }
        let refined = refine_corner_mark(&image, Point2D::new(33.0, 31.0), size, 0, true);
        assert!((refined.x - 32.0).abs() <= 1.0);
        assert!((refined.y - 32.0).abs() <= 1.0);
    }
}
