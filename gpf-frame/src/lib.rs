//! Declarative GPF 1.x frame geometry: border, corner marks, reference
//! bars, calibration bar, content container and metadata bar, laid out
//! as a flat tree of non-overlapping rectangular regions.
//!
//! Grounded on `examples/original_source/src/graphics/genericframegpf_1.c`
//! (`boxing_generic_frame_gpf_1_set_size`) for the region arithmetic and
//! `genericframefactory.c` (`boxing_generic_frame_factory_create`) for
//! the version-dispatch shape, adapted from that file's parent/child
//! component tree with back-pointers into a single owning struct with
//! no cyclic references (spec.md §9 REDESIGN FLAGS).

use log::debug;
use std::error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormatVersion {
    V1_0,
    V1_1,
    V1_2,
}

impl FrameFormatVersion {
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "GPFv1.0" => Some(FrameFormatVersion::V1_0),
            "GPFv1.1" => Some(FrameFormatVersion::V1_1),
            "GPFv1.2" => Some(FrameFormatVersion::V1_2),
            _ => None,
        }
    }

    /// GPFv1.2 replaces the analog calibration bar with a wider
    /// metadata bar; earlier versions keep it for MTF/LUT estimation.
    fn has_calibration_bar(self) -> bool {
        !matches!(self, FrameFormatVersion::V1_2)
    }

    /// GPFv1.0 allows a gapless corner mark; v1.1 onward enforce a
    /// minimum gap of a quarter the mark size so the reference bars
    /// photograph with a visible quiet zone next to the mark.
    fn effective_corner_mark_gap(self, configured: i32, corner_mark_size: i32) -> i32 {
        match self {
            FrameFormatVersion::V1_0 => configured,
            _ => configured.max(corner_mark_size / 4),
        }
    }
}

#[derive(Debug)]
pub enum FrameError {
    /// Frame dimensions cannot accommodate the border and corner marks
    /// (would produce a zero or negative content area).
    DimensionsTooSmall { width: i32, height: i32 },
    /// `tiles_per_column` does not evenly partition the metadata band
    /// height, or is non-positive.
    InvalidTilesPerColumn { tiles_per_column: i32 },
    /// Two regions that the layout invariant requires to be disjoint
    /// overlap (a geometry bug, not a caller input error).
    OverlappingRegions {
        first: &'static str,
        second: &'static str,
    },
}

impl error::Error for FrameError {}
impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrameError::DimensionsTooSmall { width, height } => write!(
                f,
                "frame dimensions {}x{} cannot accommodate the configured border and corner marks",
                width, height
            ),
            FrameError::InvalidTilesPerColumn { tiles_per_column } => write!(
                f,
                "tilesPerColumn {} does not evenly divide the metadata band height",
                tiles_per_column
            ),
            FrameError::OverlappingRegions { first, second } => {
                write!(f, "region '{}' overlaps region '{}'", first, second)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

/// An axis-aligned rectangular region, addressed by type rather than
/// by a parent/peer pointer pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub position: Point,
    pub size: Point,
}

impl Region {
    fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Region {
            position: Point::new(x, y),
            size: Point::new(width, height),
        }
    }

    fn right(&self) -> i32 {
        self.position.x + self.size.x
    }

    fn bottom(&self) -> i32 {
        self.position.y + self.size.y
    }

    fn intersects(&self, other: &Region) -> bool {
        self.position.x < other.right()
            && other.position.x < self.right()
            && self.position.y < other.bottom()
            && other.position.y < self.bottom()
    }
}

/// Geometry parameters for a GPF 1.x frame, per the `FrameFormat`
/// configuration group (spec.md §6).
#[derive(Debug, Clone, Copy)]
pub struct FrameFormatParams {
    pub width: i32,
    pub height: i32,
    pub border: i32,
    pub border_gap: i32,
    pub corner_mark_size: i32,
    pub corner_mark_gap: i32,
    pub tiles_per_column: i32,
    pub max_levels_per_symbol: i32,
    pub reference_bar_freq_divider: i32,
    pub analog_content_symbol_size: i32,
    pub digital_content_symbol_size: i32,
    pub reference_bar_sync_distance: i32,
    pub reference_bar_sync_offset: i32,
}

/// The fully resolved geometry of one GPF 1.x frame: every sub-region
/// positioned in absolute frame coordinates.
#[derive(Debug, Clone)]
pub struct FrameLayout {
    pub version: FrameFormatVersion,
    pub params: FrameFormatParams,
    pub corner_mark_gap: i32,

    pub border: Region,
    pub top_left_corner_mark: Region,
    pub top_right_corner_mark: Region,
    pub bottom_left_corner_mark: Region,
    pub bottom_right_corner_mark: Region,
    pub top_reference_bar: Region,
    pub bottom_reference_bar: Region,
    pub left_reference_bar: Region,
    pub right_reference_bar: Region,
    pub calibration_bar: Option<Region>,
    pub content_container: Region,
    pub metadata_bar: Region,
    pub metadata_tile_size: Point,
}

impl FrameLayout {
    /// Builds a layout for `version`, mirroring
    /// `boxing_generic_frame_factory_create`'s version dispatch but
    /// returning a single flat struct rather than a distinct type per
    /// version.
    pub fn for_version(
        version: FrameFormatVersion,
        params: FrameFormatParams,
    ) -> Result<Self, FrameError> {
        let corner_mark_gap =
            version.effective_corner_mark_gap(params.corner_mark_gap, params.corner_mark_size);

        let content_origin = params.border + params.border_gap;
        let viewport_width = (params.width - 2 * content_origin).max(0);
        let viewport_height = (params.height - 2 * content_origin).max(0);

        let corner = params.corner_mark_size;
        if viewport_width <= 2 * corner || viewport_height <= 2 * corner {
            return Err(FrameError::DimensionsTooSmall {
                width: params.width,
                height: params.height,
            });
        }

        let calibration_band_width = viewport_width - 2 * corner;
        let calibration_band_height = corner / 2;
        let metadata_band_width = viewport_width - 2 * corner;
        let metadata_band_height = corner / 2;
        let content_width = viewport_width - 2 * corner;
        let content_height = viewport_height - 2 * corner;
        let reference_band_width = corner / 2;
        let horizontal_reference_band_length = viewport_width - 2 * corner;
        let vertical_reference_band_length = viewport_height - 2 * corner;

        if params.tiles_per_column <= 0 || metadata_band_height % params.tiles_per_column != 0 {
            return Err(FrameError::InvalidTilesPerColumn {
                tiles_per_column: params.tiles_per_column,
            });
        }

        let at = |x: i32, y: i32, w: i32, h: i32| -> Region {
            Region::new(content_origin + x, content_origin + y, w, h)
        };

        let top_left_corner_mark = at(0, 0, corner, corner);
        let top_right_corner_mark = at(viewport_width - corner, 0, corner, corner);
        let bottom_left_corner_mark = at(0, viewport_height - corner, corner, corner);
        let bottom_right_corner_mark =
            at(viewport_width - corner, viewport_height - corner, corner, corner);

        let top_reference_bar = at(
            corner,
            corner / 2,
            horizontal_reference_band_length,
            reference_band_width,
        );
        let bottom_reference_bar = at(
            corner,
            viewport_height - corner,
            horizontal_reference_band_length,
            reference_band_width,
        );
        let left_reference_bar = at(
            corner / 2,
            corner,
            reference_band_width,
            vertical_reference_band_length,
        );
        let right_reference_bar = at(
            viewport_width - corner,
            corner,
            reference_band_width,
            vertical_reference_band_length,
        );

        let calibration_bar = if version.has_calibration_bar() {
            Some(at(corner, 0, calibration_band_width, calibration_band_height))
        } else {
            None
        };

        let content_container = at(corner, corner, content_width, content_height);

        let metadata_bar = at(
            corner,
            viewport_height - corner / 2,
            metadata_band_width,
            metadata_band_height,
        );
        // A single square tile side length, per
        // `boxing_metadata_bar_set_tile_size`; the bar's actual column
        // and row counts (`tiles_per_row = width/tile_size,
        // tiles_per_column = height/tile_size`) are derived from this
        // scalar by whoever lays out the column-major cell grid, not
        // stored here.
        let metadata_tile = metadata_band_height / params.tiles_per_column;
        let metadata_tile_size = Point::new(metadata_tile, metadata_tile);

        let border = Region::new(0, 0, params.width, params.height);

        let layout = FrameLayout {
            version,
            params,
            corner_mark_gap,
            border,
            top_left_corner_mark,
            top_right_corner_mark,
            bottom_left_corner_mark,
            bottom_right_corner_mark,
            top_reference_bar,
            bottom_reference_bar,
            left_reference_bar,
            right_reference_bar,
            calibration_bar,
            content_container,
            metadata_bar,
            metadata_tile_size,
        };

        layout.check_non_overlapping()?;
        debug!(
            "built frame layout {:?} ({}x{}, corner mark {}, content {:?})",
            version, params.width, params.height, corner, layout.content_container
        );
        Ok(layout)
    }

    /// Validates the non-overlap invariant (spec.md §3) among every
    /// named region: the content container, the four corner marks, the
    /// four reference bars, and the calibration/metadata bars (when
    /// present), which occupy the corner-mark margin but on a disjoint
    /// horizontal span.
    fn check_non_overlapping(&self) -> Result<(), FrameError> {
        let mut primary: Vec<(&'static str, &Region)> = vec![
            ("content_container", &self.content_container),
            ("top_left_corner_mark", &self.top_left_corner_mark),
            ("top_right_corner_mark", &self.top_right_corner_mark),
            ("bottom_left_corner_mark", &self.bottom_left_corner_mark),
            ("bottom_right_corner_mark", &self.bottom_right_corner_mark),
            ("top_reference_bar", &self.top_reference_bar),
            ("bottom_reference_bar", &self.bottom_reference_bar),
            ("left_reference_bar", &self.left_reference_bar),
            ("right_reference_bar", &self.right_reference_bar),
            ("metadata_bar", &self.metadata_bar),
        ];
        if let Some(calibration_bar) = &self.calibration_bar {
            primary.push(("calibration_bar", calibration_bar));
        }

        for i in 0..primary.len() {
            for j in (i + 1)..primary.len() {
                let (name_a, region_a) = primary[i];
                let (name_b, region_b) = primary[j];
                if region_a.intersects(region_b) {
                    return Err(FrameError::OverlappingRegions {
                        first: name_a,
                        second: name_b,
                    });
                }
            }
        }
        Ok(())
    }

    /// Whole-frame dimensions, border included.
    pub fn size(&self) -> Point {
        Point::new(self.params.width, self.params.height)
    }

    /// Usable amplitude levels per symbol (2, 4 or 6), the color depth
    /// the dispatcher resolves `"auto"` `NumBitsPerPixel` properties
    /// against.
    pub fn max_levels_per_symbol(&self) -> i32 {
        self.params.max_levels_per_symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FrameFormatParams {
        FrameFormatParams {
            width: 2480,
            height: 3508,
            border: 4,
            border_gap: 2,
            corner_mark_size: 96,
            corner_mark_gap: 8,
            tiles_per_column: 4,
            max_levels_per_symbol: 2,
            reference_bar_freq_divider: 8,
            analog_content_symbol_size: 4,
            digital_content_symbol_size: 4,
            reference_bar_sync_distance: 16,
            reference_bar_sync_offset: 0,
        }
    }

    #[test]
    fn v1_0_has_a_calibration_bar_and_honours_configured_gap() {
        let layout = FrameLayout::for_version(FrameFormatVersion::V1_0, params()).unwrap();
        assert!(layout.calibration_bar.is_some());
        assert_eq!(layout.corner_mark_gap, 8);
    }

    #[test]
    fn v1_2_drops_the_calibration_bar() {
        let layout = FrameLayout::for_version(FrameFormatVersion::V1_2, params()).unwrap();
        assert!(layout.calibration_bar.is_none());
    }

    #[test]
    fn v1_1_enforces_a_minimum_corner_mark_gap() {
        let mut p = params();
        p.corner_mark_gap = 1;
        let layout = FrameLayout::for_version(FrameFormatVersion::V1_1, p).unwrap();
        assert_eq!(layout.corner_mark_gap, p.corner_mark_size / 4);
    }

    #[test]
    fn corner_marks_sit_at_the_four_viewport_corners() {
        let layout = FrameLayout::for_version(FrameFormatVersion::V1_0, params()).unwrap();
        let origin = layout.top_left_corner_mark.position;
        assert_eq!(origin, Point::new(6, 6));
        assert_eq!(
            layout.top_right_corner_mark.position.x + layout.top_right_corner_mark.size.x,
            6 + (2480 - 2 * 6)
        );
    }

    #[test]
    fn content_container_and_corner_marks_do_not_overlap() {
        let layout = FrameLayout::for_version(FrameFormatVersion::V1_0, params()).unwrap();
        assert!(!layout
            .content_container
            .intersects(&layout.top_left_corner_mark));
        assert!(!layout
            .content_container
            .intersects(&layout.top_reference_bar));
    }

    #[test]
    fn metadata_tile_size_divides_the_band_evenly() {
        let layout = FrameLayout::for_version(FrameFormatVersion::V1_0, params()).unwrap();
        assert_eq!(
            layout.metadata_tile_size.y * params().tiles_per_column,
            layout.metadata_bar.size.y
        );
    }

    #[test]
    fn rejects_tiles_per_column_that_does_not_divide_evenly() {
        let mut p = params();
        p.tiles_per_column = 5;
        assert!(FrameLayout::for_version(FrameFormatVersion::V1_0, p).is_err());
    }

    #[test]
    fn rejects_dimensions_too_small_for_the_corner_marks() {
        let mut p = params();
        p.width = 100;
        p.height = 100;
        assert!(FrameLayout::for_version(FrameFormatVersion::V1_0, p).is_err());
    }

    #[test]
    fn parses_version_tokens() {
        assert_eq!(
            FrameFormatVersion::parse("GPFv1.0"),
            Some(FrameFormatVersion::V1_0)
        );
        assert_eq!(
            FrameFormatVersion::parse("GPFv1.2"),
            Some(FrameFormatVersion::V1_2)
        );
        assert_eq!(FrameFormatVersion::parse("bogus"), None);
    }
}
