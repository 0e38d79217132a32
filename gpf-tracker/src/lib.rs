//! The frame tracker (spec.md §4.2): given a scanned 8-bit image and a
//! frame's declarative geometry, locates the border, corner marks,
//! reference bars, and (optionally) a finer sync-point grid and an MTF
//! figure, producing the coordinate matrices `gpf-sampler` resamples
//! each container through.
//!
//! Grounded throughout on
//! `examples/original_source/src/unboxer/frametrackerutil.c`. The
//! orchestration here replaces that file's sequence of standalone
//! `boxing_frame_tracker_util_*` calls (each threading its own subset
//! of output pointers) with a single `Tracker::track` returning one
//! `TrackerOutput`.

pub mod border;
pub mod dsp;
pub mod mtf;
pub mod referencebar;
pub mod syncpoint;

use std::error;
use std::fmt;

use gpf_frame::{FrameLayout, Region};
use gpf_primitives::GrayImage;
use log::{debug, warn};

pub use border::BorderBox;
pub use mtf::MtfEstimate;
pub use syncpoint::SyncDisplacement;

/// A 2D point in image pixel coordinates (as opposed to `gpf_frame::Point`,
/// which is integer design-space geometry).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Point2D { x, y }
    }
}

#[derive(Debug)]
pub enum TrackerError {
    /// None of the twelve border-crossing walks found a threshold
    /// crossing; the image is not a recognisable scanned frame.
    BorderTrackingFailed,
    /// A reference bar's sampled span was degenerate or too short to
    /// carry a usable carrier.
    ReferenceBarTrackingFailed,
}

impl error::Error for TrackerError {}
impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrackerError::BorderTrackingFailed => {
                write!(f, "could not find the frame border in the scanned image")
            }
            TrackerError::ReferenceBarTrackingFailed => {
                write!(f, "could not track a reference bar")
            }
        }
    }
}

/// Which of the optional tracking stages to run; mirrors the bitset
/// the original frame tracker accepts to skip stages a caller already
/// knows are unusable (spec.md §3 tracker state bitflags).
#[derive(Debug, Clone, Copy)]
pub struct TrackerFlags {
    pub reference_marks: bool,
    pub reference_bars: bool,
    pub calibration_bar: bool,
    pub horizontal_shift: bool,
    pub sync_points: bool,
    pub simulated: bool,
}

impl Default for TrackerFlags {
    fn default() -> Self {
        TrackerFlags {
            reference_marks: true,
            reference_bars: true,
            calibration_bar: true,
            horizontal_shift: true,
            sync_points: true,
            simulated: false,
        }
    }
}

/// Which optional stages actually produced a result; the border stage
/// is foundational and its failure aborts `track` entirely, so it has
/// no corresponding flag here.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackerResultFlags {
    pub corner_marks_refined: bool,
    pub reference_bars_found: bool,
    pub sync_points_found: bool,
    pub mtf_estimated: bool,
}

/// The four corner-mark centers, refined or nominal depending on
/// `TrackerFlags::reference_marks`.
#[derive(Debug, Clone, Copy)]
pub struct CornerMarks {
    pub top_left: Point2D,
    pub top_right: Point2D,
    pub bottom_left: Point2D,
    pub bottom_right: Point2D,
}

/// A coordinate grid for one named container (content, metadata,
/// calibration bar, or a reference bar), row-major, `columns * rows`
/// points. The base case is a 2x2 quad of the container's four
/// corners; `sync_points` tracking can refine the content grid further.
#[derive(Debug, Clone)]
pub struct CoordinateMatrix {
    pub columns: usize,
    pub rows: usize,
    pub points: Vec<Point2D>,
}

impl CoordinateMatrix {
    pub fn get(&self, col: usize, row: usize) -> Point2D {
        self.points[row * self.columns + col]
    }
}

/// One reference bar's tracked points, if that stage ran and succeeded.
#[derive(Debug, Clone, Default)]
pub struct ReferenceBarTracks {
    pub top: Option<Vec<Point2D>>,
    pub bottom: Option<Vec<Point2D>>,
    pub left: Option<Vec<Point2D>>,
    pub right: Option<Vec<Point2D>>,
}

/// Everything `Tracker::track` recovers from one scanned image.
#[derive(Debug, Clone)]
pub struct TrackerOutput {
    pub border: BorderBox,
    pub corner_marks: CornerMarks,
    pub content: CoordinateMatrix,
    pub metadata: CoordinateMatrix,
    pub calibration: Option<CoordinateMatrix>,
    pub reference_bars: ReferenceBarTracks,
    pub sync_grid: Option<CoordinateMatrix>,
    pub mtf: Option<MtfEstimate>,
    pub flags: TrackerResultFlags,
}

fn bilinear_at(corners: [Point2D; 4], u: f64, v: f64) -> Point2D {
    // corners = [top_left, top_right, bottom_left, bottom_right]
    let top_x = corners[0].x + (corners[1].x - corners[0].x) * u;
    let top_y = corners[0].y + (corners[1].y - corners[0].y) * u;
    let bottom_x = corners[2].x + (corners[3].x - corners[2].x) * u;
    let bottom_y = corners[2].y + (corners[3].y - corners[2].y) * u;
    Point2D::new(top_x + (bottom_x - top_x) * v, top_y + (bottom_y - top_y) * v)
}

/// Maps `region`'s four corners into image coordinates by bilinear
/// interpolation within the overall frame quad, normalized by the
/// frame's nominal full size (border included).
fn region_quad(frame_corners: [Point2D; 4], frame_size: gpf_frame::Point, region: &Region) -> CoordinateMatrix {
    let u0 = region.position.x as f64 / frame_size.x as f64;
    let u1 = (region.position.x + region.size.x) as f64 / frame_size.x as f64;
    let v0 = region.position.y as f64 / frame_size.y as f64;
    let v1 = (region.position.y + region.size.y) as f64 / frame_size.y as f64;

    CoordinateMatrix {
        columns: 2,
        rows: 2,
        points: vec![
            bilinear_at(frame_corners, u0, v0),
            bilinear_at(frame_corners, u1, v0),
            bilinear_at(frame_corners, u0, v1),
            bilinear_at(frame_corners, u1, v1),
        ],
    }
}

/// Number of sync-mark sample points to place along a bar of `length`
/// pixels, spaced roughly `sync_distance` design-space pixels apart.
fn reference_bar_point_count(length: f64, sync_distance: i32) -> usize {
    let distance = (sync_distance.max(1)) as f64;
    ((length / distance).round() as usize + 1).max(3)
}

/// Builds per-edge sync-displacement samples from a reference bar's
/// tracked points against the straight quad it would occupy if
/// untracked, placed at `(u, fixed_v)` (for a horizontal bar) or
/// `(fixed_u, v)` (for a vertical bar).
fn displacement_samples_from_bar(
    nominal_start: Point2D,
    nominal_end: Point2D,
    tracked: &[Point2D],
    horizontal: bool,
    fixed_coord: f64,
) -> Vec<SyncDisplacement> {
    let n = tracked.len();
    if n < 2 {
        return Vec::new();
    }
    tracked
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let t = i as f64 / (n - 1) as f64;
            let nominal = Point2D::new(
                nominal_start.x + (nominal_end.x - nominal_start.x) * t,
                nominal_start.y + (nominal_end.y - nominal_start.y) * t,
            );
            let (u, v) = if horizontal { (t, fixed_coord) } else { (fixed_coord, t) };
            SyncDisplacement {
                u,
                v,
                dx: point.x - nominal.x,
                dy: point.y - nominal.y,
            }
        })
        .collect()
}

/// Tracks one frame against a resolved `FrameLayout`.
pub struct Tracker<'a> {
    layout: &'a FrameLayout,
}

impl<'a> Tracker<'a> {
    pub fn new(layout: &'a FrameLayout) -> Self {
        Tracker { layout }
    }

    /// Runs the full tracking pipeline (spec.md §4.2 steps 1-6) against
    /// `image`, honouring `mode` for the optional stages. Border
    /// detection is foundational: its failure aborts with
    /// `TrackerError::BorderTrackingFailed` regardless of `mode`.
    pub fn track(&self, image: &GrayImage, mode: TrackerFlags) -> Result<TrackerOutput, TrackerError> {
        let layout = self.layout;
        let frame_size = layout.size();

        // Step 1: border.
        let border = border::detect_border(image)?;
        debug!("detected border {:?}", border);

        let scale_x = (border.right - border.left) / frame_size.x as f64;
        let scale_y = (border.bottom - border.top) / frame_size.y as f64;
        let to_image = |p: gpf_frame::Point| {
            Point2D::new(
                border.left + p.x as f64 * scale_x,
                border.top + p.y as f64 * scale_y,
            )
        };
        let region_center = |region: &Region| {
            to_image(gpf_frame::Point::new(
                region.position.x + region.size.x / 2,
                region.position.y + region.size.y / 2,
            ))
        };

        // Step 2: corner marks.
        let mut corner_marks_refined = false;
        let corner_mark_size = layout.params.corner_mark_size as i64;
        let corner_mark_gap = layout.corner_mark_gap as i64;
        let nominal_corners = [
            region_center(&layout.top_left_corner_mark),
            region_center(&layout.top_right_corner_mark),
            region_center(&layout.bottom_left_corner_mark),
            region_center(&layout.bottom_right_corner_mark),
        ];
        let corner_marks = if mode.reference_marks {
            corner_marks_refined = true;
            CornerMarks {
                top_left: border::refine_corner_mark(image, nominal_corners[0], corner_mark_size, corner_mark_gap, true),
                top_right: border::refine_corner_mark(image, nominal_corners[1], corner_mark_size, corner_mark_gap, false),
                bottom_left: border::refine_corner_mark(image, nominal_corners[2], corner_mark_size, corner_mark_gap, false),
                bottom_right: border::refine_corner_mark(image, nominal_corners[3], corner_mark_size, corner_mark_gap, true),
            }
        } else {
            CornerMarks {
                top_left: nominal_corners[0],
                top_right: nominal_corners[1],
                bottom_left: nominal_corners[2],
                bottom_right: nominal_corners[3],
            }
        };

        // The outer frame quad used to place every other container;
        // axis-aligned from the detected border (no perspective/rotation
        // correction, consistent with the original's scan-line model).
        let frame_corners = [
            Point2D::new(border.left, border.top),
            Point2D::new(border.right, border.top),
            Point2D::new(border.left, border.bottom),
            Point2D::new(border.right, border.bottom),
        ];

        let content = region_quad(frame_corners, frame_size, &layout.content_container);
        let metadata = region_quad(frame_corners, frame_size, &layout.metadata_bar);
        let calibration = layout
            .calibration_bar
            .as_ref()
            .map(|region| region_quad(frame_corners, frame_size, region));

        // Step 3: reference bars.
        let mut reference_bars = ReferenceBarTracks::default();
        let mut reference_bars_found = false;
        if mode.reference_bars {
            let sync_distance = layout.params.reference_bar_sync_distance;
            let perpendicular_samples = (layout.params.corner_mark_size / 8).max(2) as i64;

            let mut track_edge = |start: Point2D, end: Point2D| -> Option<Vec<Point2D>> {
                let length = ((end.x - start.x).powi(2) + (end.y - start.y).powi(2)).sqrt();
                let num_points = reference_bar_point_count(length, sync_distance);
                match referencebar::track_reference_bar(image, start, end, num_points, perpendicular_samples) {
                    Ok(points) => Some(points),
                    Err(err) => {
                        warn!("reference bar tracking failed: {}", err);
                        None
                    }
                }
            };

            let top_start = region_center(&layout.top_left_corner_mark);
            let top_end = region_center(&layout.top_right_corner_mark);
            reference_bars.top = track_edge(top_start, top_end);

            let bottom_start = region_center(&layout.bottom_left_corner_mark);
            let bottom_end = region_center(&layout.bottom_right_corner_mark);
            reference_bars.bottom = track_edge(bottom_start, bottom_end);

            let left_start = region_center(&layout.top_left_corner_mark);
            let left_end = region_center(&layout.bottom_left_corner_mark);
            reference_bars.left = track_edge(left_start, left_end);

            let right_start = region_center(&layout.top_right_corner_mark);
            let right_end = region_center(&layout.bottom_right_corner_mark);
            reference_bars.right = track_edge(right_start, right_end);

            reference_bars_found = reference_bars.top.is_some()
                || reference_bars.bottom.is_some()
                || reference_bars.left.is_some()
                || reference_bars.right.is_some();
        }

        // Step 5: sync-point grid, built from whichever reference bars
        // were tracked; falls back to the plain content quad untouched.
        let mut sync_points_found = false;
        let sync_grid = if mode.sync_points && reference_bars_found {
            let mut samples = Vec::new();
            if let Some(points) = &reference_bars.top {
                samples.extend(displacement_samples_from_bar(
                    corner_marks.top_left,
                    corner_marks.top_right,
                    points,
                    true,
                    0.0,
                ));
            }
            if let Some(points) = &reference_bars.bottom {
                samples.extend(displacement_samples_from_bar(
                    corner_marks.bottom_left,
                    corner_marks.bottom_right,
                    points,
                    true,
                    1.0,
                ));
            }
            if let Some(points) = &reference_bars.left {
                samples.extend(displacement_samples_from_bar(
                    corner_marks.top_left,
                    corner_marks.bottom_left,
                    points,
                    false,
                    0.0,
                ));
            }
            if let Some(points) = &reference_bars.right {
                samples.extend(displacement_samples_from_bar(
                    corner_marks.top_right,
                    corner_marks.bottom_right,
                    points,
                    false,
                    1.0,
                ));
            }
            if samples.is_empty() {
                None
            } else {
                sync_points_found = true;
                let tiles = layout.params.tiles_per_column.max(1) as usize;
                Some(syncpoint::refine_grid(&content, &samples, tiles + 1, tiles + 1))
            }
        } else {
            None
        };

        // Step 6: MTF, from the calibration bar if present and enabled.
        let mut mtf_estimated = false;
        let mtf = if mode.calibration_bar {
            layout.calibration_bar.as_ref().map(|calibration_region| {
                mtf_estimated = true;
                let horizontal_strip = (
                    calibration_region.position.x as usize,
                    calibration_region.position.y as usize,
                    calibration_region.size.x as usize,
                    calibration_region.size.y as usize,
                );
                let vertical_strip = (
                    layout.top_reference_bar.position.x as usize,
                    layout.top_reference_bar.position.y as usize,
                    layout.top_reference_bar.size.x as usize,
                    layout.top_reference_bar.size.y as usize,
                );
                let cells = layout.params.reference_bar_freq_divider.max(2) as usize;
                mtf::estimate(image, horizontal_strip, vertical_strip, cells)
            })
        } else {
            None
        };

        Ok(TrackerOutput {
            border,
            corner_marks,
            content,
            metadata,
            calibration,
            reference_bars,
            sync_grid,
            mtf,
            flags: TrackerResultFlags {
                corner_marks_refined,
                reference_bars_found,
                sync_points_found,
                mtf_estimated,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpf_frame::{FrameFormatParams, FrameFormatVersion};

    fn params() -> FrameFormatParams {
        FrameFormatParams {
            width: 400,
            height: 300,
            border: 2,
            border_gap: 1,
            corner_mark_size: 24,
            corner_mark_gap: 2,
            tiles_per_column: 2,
            max_levels_per_symbol: 2,
            reference_bar_freq_divider: 8,
            analog_content_symbol_size: 4,
            digital_content_symbol_size: 4,
            reference_bar_sync_distance: 16,
            reference_bar_sync_offset: 0,
        }
    }

    fn synthetic_frame(layout: &FrameLayout) -> GrayImage {
        let size = layout.size();
        let mut image = GrayImage::new(size.x as usize, size.y as usize);
        for y in 0..size.y {
            for x in 0..size.x {
                image.set(x as usize, y as usize, 210);
            }
        }
        let fill = |image: &mut GrayImage, region: &Region, value: u8| {
            for y in region.position.y..(region.position.y + region.size.y) {
                for x in region.position.x..(region.position.x + region.size.x) {
                    image.set(x as usize, y as usize, value);
                }
            }
        };
        fill(&mut image, &layout.content_container, 40);
        fill(&mut image, &layout.top_left_corner_mark, 10);
        fill(&mut image, &layout.top_right_corner_mark, 10);
        fill(&mut image, &layout.bottom_left_corner_mark, 10);
        fill(&mut image, &layout.bottom_right_corner_mark, 10);
        image
    }

    #[test]
    fn tracks_border_and_containers_on_a_synthetic_frame() {
        let layout = FrameLayout::for_version(FrameFormatVersion::V1_0, params()).unwrap();
        let image = synthetic_frame(&layout);
        let tracker = Tracker::new(&layout);
        let output = tracker.track(&image, TrackerFlags::default()).unwrap();

        assert!(output.border.left < output.border.right);
        assert!(output.border.top < output.border.bottom);
        assert_eq!(output.content.columns, 2);
        assert_eq!(output.content.rows, 2);
    }

    #[test]
    fn skips_corner_refinement_when_disabled() {
        let layout = FrameLayout::for_version(FrameFormatVersion::V1_0, params()).unwrap();
        let image = synthetic_frame(&layout);
        let tracker = Tracker::new(&layout);
        let mut mode = TrackerFlags::default();
        mode.reference_marks = false;
        mode.reference_bars = false;
        mode.sync_points = false;
        mode.calibration_bar = false;
        let output = tracker.track(&image, mode).unwrap();
        assert!(!output.flags.corner_marks_refined);
        assert!(!output.flags.reference_bars_found);
        assert!(output.sync_grid.is_none());
        assert!(output.mtf.is_none());
    }

    #[test]
    fn fails_on_a_blank_uniform_image() {
        let layout = FrameLayout::for_version(FrameFormatVersion::V1_0, params()).unwrap();
        let image = GrayImage::new(layout.size().x as usize, layout.size().y as usize);
        let tracker = Tracker::new(&layout);
        assert!(tracker.track(&image, TrackerFlags::default()).is_err());
    }
}
