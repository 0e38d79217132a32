//! Reference-bar tracking (spec.md §4.2 step 3): a narrow bandpass
//! filter isolates the bar's alternating carrier, then the shared
//! `find_max_location_rate` phase-refine (also used for columnwise
//! border tracking in `border.rs`) locates each bar point to sub-pixel
//! precision along the bar's long axis.
//!
//! Grounded on `boxing_frame_tracker_util_track_reference_bar` /
//! `track_reference_bar_location` in
//! `examples/original_source/src/unboxer/frametrackerutil.c`: bilinear
//! perpendicular-line sampling along the bar and a 0.5-centered,
//! 0.18-wide bandpass filter sized at `22 * sampling_rate` taps.

use crate::dsp::{bandpass_fir, fir_filter, find_max_location_rate};
use crate::{Point2D, TrackerError};
use gpf_primitives::GrayImage;

fn bilinear_sample(image: &GrayImage, x: f64, y: f64) -> f64 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let get = |xi: i64, yi: i64| image.try_get(xi, yi).unwrap_or(0) as f64;
    let (x0i, y0i) = (x0 as i64, y0 as i64);
    let top = get(x0i, y0i) * (1.0 - fx) + get(x0i + 1, y0i) * fx;
    let bottom = get(x0i, y0i + 1) * (1.0 - fx) + get(x0i + 1, y0i + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Average of `2*perpendicular_samples+1` bilinear samples along
/// `normal` (expected to be a unit vector), centered at `point`.
fn sample_perpendicular_average(
    image: &GrayImage,
    point: Point2D,
    normal: (f64, f64),
    perpendicular_samples: i64,
) -> f64 {
    let mut sum = 0.0;
    let mut count = 0i64;
    for k in -perpendicular_samples..=perpendicular_samples {
        let x = point.x + normal.0 * k as f64;
        let y = point.y + normal.1 * k as f64;
        sum += bilinear_sample(image, x, y);
        count += 1;
    }
    sum / count as f64
}

/// Tracks `num_points` sub-pixel positions of a reference bar's
/// checkerboard carrier between `start` and `end`, one `Point2D` per
/// point along the bar's long axis.
pub fn track_reference_bar(
    image: &GrayImage,
    start: Point2D,
    end: Point2D,
    num_points: usize,
    perpendicular_samples: i64,
) -> Result<Vec<Point2D>, TrackerError> {
    if num_points < 3 {
        return Err(TrackerError::ReferenceBarTrackingFailed);
    }
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length = (dx * dx + dy * dy).sqrt();
    if length < 1.0 {
        return Err(TrackerError::ReferenceBarTrackingFailed);
    }
    let direction = (dx / length, dy / length);
    let normal = (direction.1, -direction.0);
    let sample_rate = length / (num_points - 1) as f64;

    let sample_count = (length.round() as usize).max(num_points);
    let samples: Vec<f64> = (0..sample_count)
        .map(|i| {
            let point = Point2D::new(
                start.x + direction.0 * i as f64,
                start.y + direction.1 * i as f64,
            );
            sample_perpendicular_average(image, point, normal, perpendicular_samples)
        })
        .collect();

    let mut filter_order = (22.0 * sample_rate).round() as usize;
    if filter_order % 2 == 0 {
        filter_order += 1;
    }
    filter_order = filter_order.max(3);
    let center_freq = 1.0 / (2.0 * sample_rate);
    let bandwidth = 0.18 / sample_rate;
    let taps = bandpass_fir(filter_order, center_freq, bandwidth);
    let filtered = fir_filter(&samples, &taps);

    let half_window = (sample_rate / 2.0).ceil().max(2.0) as i64;
    let width = (2 * half_window + 1) as usize;
    let mut data = vec![0.0f64; width * num_points];
    for point_index in 0..num_points {
        let predicted = (point_index as f64 * sample_rate).round() as i64;
        for col in 0..width {
            let idx = predicted - half_window + col as i64;
            data[point_index * width + col] = if idx >= 0 && (idx as usize) < filtered.len() {
                filtered[idx as usize]
            } else {
                0.0
            };
        }
    }

    let reference = half_window as f64;
    let refined = find_max_location_rate(&data, width, num_points, reference, sample_rate);

    let points = refined
        .into_iter()
        .enumerate()
        .map(|(point_index, offset_in_window)| {
            let predicted = (point_index as f64 * sample_rate).round();
            let absolute = predicted - half_window as f64 + offset_in_window;
            Point2D::new(
                start.x + direction.0 * absolute,
                start.y + direction.1 * absolute,
            )
        })
        .collect();

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar_image(width: usize, height: usize, period: usize) -> GrayImage {
        let mut image = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let value = if (x / period) % 2 == 0 { 30 } else { 220 };
                image.set(x, y, value);
            }
        }
        image
    }

    #[test]
    fn tracks_points_along_a_periodic_bar() {
        let image = bar_image(300, 40, 8);
        let points = track_reference_bar(
            &image,
            Point2D::new(10.0, 20.0),
            Point2D::new(290.0, 20.0),
            20,
            5,
        )
        .unwrap();
        assert_eq!(points.len(), 20);
        for p in &points {
            assert!((p.y - 20.0).abs() < 2.0);
        }
    }

    #[test]
    fn rejects_a_degenerate_bar() {
        let image = GrayImage::new(50, 50);
        let result = track_reference_bar(
            &image,
            Point2D::new(5.0, 5.0),
            Point2D::new(5.0, 5.0),
            10,
            3,
        );
        assert!(result.is_err());
    }
}
