//! Sampler and quantizer (spec.md §4.3): resamples a container's
//! coordinate matrix against the scanned image and converts sampled
//! intensities to symbols.
//!
//! Grounded on `examples/original_source/src/unboxer/sampleutil.c`
//! (`boxing_sampleutil_pixel`'s 2nd-order parabolic interpolation over
//! a 3x3 neighbourhood) for resampling, and on the tile-based
//! quantization `extract_digital_content` in
//! `examples/original_source/src/unboxer/unboxerv1.c` delegates to
//! (`boxing_datapoints_quantize`, not itself present in the retrieved
//! source — its 32x32-tile, histogram-normalized contract is taken
//! from spec.md §4.3 directly).

use gpf_primitives::GrayImage;
use gpf_tracker::dsp::fir_filter;
use gpf_tracker::CoordinateMatrix;

const PIXEL_MIN: f64 = 0.0;
const PIXEL_MAX: f64 = 255.0;

/// `Ai`, the inverse of the parabola's Vandermonde-like design matrix
/// `A = [[0,0,1],[1,1,1],[4,2,1]]`, exactly as
/// `boxing_sampleutil_pixel` hard-codes it.
const AI: [[f64; 3]; 3] = [
    [0.5, -1.0, 0.5],
    [-1.5, 2.0, -0.5],
    [1.0, 0.0, 0.0],
];

/// Samples `image` at fractional pixel coordinate `(x, y)` using a
/// 2nd-order parabolic fit over the 3x3 neighbourhood of the nearest
/// integer pixel, clamped to `[0, 255]`. Out-of-bounds neighbours read
/// as 0, matching `IMAGE8_PIXEL`'s implicit zero-padding at the image
/// edge.
pub fn sample_pixel(image: &GrayImage, x: f64, y: f64) -> f64 {
    let ix = x.floor() as i64;
    let iy = y.floor() as i64;

    let mut m = [[0.0f64; 3]; 3];
    for (row, dy) in (-1..=1).enumerate() {
        for (col, dx) in (-1..=1).enumerate() {
            m[row][col] = image.try_get(ix + dx, iy + dy).unwrap_or(0) as f64;
        }
    }

    let x_ = x - ix as f64 + 1.0;
    let y_ = y - iy as f64 + 1.0;
    let yv = [y_ * y_, y_, 1.0];
    let xv = [x_ * x_, x_, 1.0];

    // Z[col] = Y . (Ai^T * m[:,col]) — fit a parabola down each column
    // first, then fit a parabola across the three resulting values.
    let mut z = [0.0f64; 3];
    for col in 0..3 {
        let b = [
            m[0][col] * AI[0][0] + m[1][col] * AI[0][1] + m[2][col] * AI[0][2],
            m[0][col] * AI[1][0] + m[1][col] * AI[1][1] + m[2][col] * AI[1][2],
            m[0][col] * AI[2][0],
        ];
        z[col] = yv[0] * b[0] + yv[1] * b[1] + yv[2] * b[2];
    }

    let b = [
        z[0] * AI[0][0] + z[1] * AI[0][1] + z[2] * AI[0][2],
        z[0] * AI[1][0] + z[1] * AI[1][1] + z[2] * AI[1][2],
        z[0] * AI[2][0] + z[1] * AI[2][1] + z[2] * AI[2][2],
    ];
    let result = xv[0] * b[0] + xv[1] * b[1] + xv[2] * b[2];
    result.max(PIXEL_MIN).min(PIXEL_MAX)
}

/// Bilinearly interpolates a point inside the quad `[top_left,
/// top_right, bottom_left, bottom_right]` at normalized `(u, v)`.
fn bilinear(corners: [(f64, f64); 4], u: f64, v: f64) -> (f64, f64) {
    let top_x = corners[0].0 + (corners[1].0 - corners[0].0) * u;
    let top_y = corners[0].1 + (corners[1].1 - corners[0].1) * u;
    let bottom_x = corners[2].0 + (corners[3].0 - corners[2].0) * u;
    let bottom_y = corners[2].1 + (corners[3].1 - corners[2].1) * u;
    (top_x + (bottom_x - top_x) * v, top_y + (bottom_y - top_y) * v)
}

/// Resamples `image` along `coords` into a `columns x rows` grid of
/// 8-bit intensities. If `coords` already carries exactly `columns x
/// rows` points (e.g. a sync-point-refined content grid), each cell
/// samples at its own point directly; otherwise `coords` is treated as
/// a 2x2 quad of corners and every cell's position is bilinearly
/// interpolated within it before sampling (spec.md §4.3).
pub fn sample_grid(coords: &CoordinateMatrix, image: &GrayImage, columns: usize, rows: usize) -> GrayImage {
    let mut out = GrayImage::new(columns, rows);

    if coords.columns == columns && coords.rows == rows {
        for row in 0..rows {
            for col in 0..columns {
                let point = coords.get(col, row);
                out.set(col, row, sample_pixel(image, point.x, point.y).round() as u8);
            }
        }
        return out;
    }

    let corners = [
        (coords.get(0, 0).x, coords.get(0, 0).y),
        (coords.get(1, 0).x, coords.get(1, 0).y),
        (coords.get(0, 1).x, coords.get(0, 1).y),
        (coords.get(1, 1).x, coords.get(1, 1).y),
    ];

    for row in 0..rows {
        // Cell centers sit at the midpoint of their [row, row+1) span
        // so the outermost cells don't sample exactly on the quad's
        // boundary edge.
        let v = (row as f64 + 0.5) / rows as f64;
        for col in 0..columns {
            let u = (col as f64 + 0.5) / columns as f64;
            let (x, y) = bilinear(corners, u, v);
            out.set(col, row, sample_pixel(image, x, y).round() as u8);
        }
    }
    out
}

/// Histogram-normalized thresholding quantizer: splits `image` into
/// `tile_width x tile_height` tiles, and within each tile maps pixel
/// intensity linearly from `[tile_min, tile_max]` onto `{0, ...,
/// levels-1}` (spec.md §4.3). A degenerate (uniform) tile quantizes
/// every pixel to level 0.
pub fn quantize_tiles(image: &GrayImage, tile_width: usize, tile_height: usize, levels: u32) -> Vec<u8> {
    let width = image.width();
    let height = image.height();
    let mut symbols = vec![0u8; width * height];
    let tile_width = tile_width.max(1);
    let tile_height = tile_height.max(1);

    let mut tile_y = 0;
    while tile_y < height {
        let th = tile_height.min(height - tile_y);
        let mut tile_x = 0;
        while tile_x < width {
            let tw = tile_width.min(width - tile_x);
            let histogram = image.strip_histogram(tile_x, tile_y, tw, th);
            let min = *histogram.first().unwrap_or(&0) as f64;
            let max = *histogram.last().unwrap_or(&0) as f64;
            let range = (max - min).max(1.0);

            for y in tile_y..tile_y + th {
                for x in tile_x..tile_x + tw {
                    let value = image.get(x, y) as f64;
                    let normalized = ((value - min) / range).max(0.0).min(0.999_999);
                    let level = (normalized * levels as f64) as u32;
                    symbols[y * width + x] = level.min(levels - 1) as u8;
                }
            }
            tile_x += tw;
        }
        tile_y += th;
    }
    symbols
}

/// A calibration-bar-derived lookup table mapping a raw sampled
/// intensity to a corrected one, used for analog content (spec.md
/// §4.5 step 6). `samples` is the calibration bar's own sampled
/// gradient, one entry per LUT bucket, low-to-high.
pub fn calibration_lut(samples: &[u8]) -> Vec<u8> {
    samples.to_vec()
}

/// Applies a calibration LUT to a raw sampled intensity by locating
/// the bucket whose stored value is nearest `raw` and returning that
/// bucket's index, rescaled onto `0..=255`.
pub fn apply_lut(lut: &[u8], raw: u8) -> u8 {
    if lut.is_empty() {
        return raw;
    }
    let mut best_index = 0usize;
    let mut best_distance = u32::MAX;
    for (index, &level) in lut.iter().enumerate() {
        let distance = (level as i32 - raw as i32).unsigned_abs();
        if distance < best_distance {
            best_distance = distance;
            best_index = index;
        }
    }
    ((best_index as f64 / (lut.len() - 1).max(1) as f64) * 255.0).round() as u8
}

/// Binomial approximation of a 5-tap Gaussian, normalized to sum to 1.
const GAUSSIAN_5_TAP: [f64; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Separable 5x5 Gaussian-like blur: rows then columns through the
/// tracker's shared `fir_filter` (spec.md §4.5 step 5's "fixed
/// Gaussian-like 5x5 kernel" for analog content).
fn gaussian_blur(image: &GrayImage) -> GrayImage {
    let (width, height) = (image.width(), image.height());
    let mut rows_filtered = GrayImage::new(width, height);
    for y in 0..height {
        let row: Vec<f64> = (0..width).map(|x| image.get(x, y) as f64).collect();
        let filtered = fir_filter(&row, &GAUSSIAN_5_TAP);
        for (x, &v) in filtered.iter().enumerate() {
            rows_filtered.set(x, y, v.round().max(0.0).min(255.0) as u8);
        }
    }

    let mut out = GrayImage::new(width, height);
    for x in 0..width {
        let column: Vec<f64> = (0..height).map(|y| rows_filtered.get(x, y) as f64).collect();
        let filtered = fir_filter(&column, &GAUSSIAN_5_TAP);
        for (y, &v) in filtered.iter().enumerate() {
            out.set(x, y, v.round().max(0.0).min(255.0) as u8);
        }
    }
    out
}

/// Pre-sampling MTF-compensating filter (spec.md §4.5 step 5). Analog
/// content is only ever denoised with the fixed Gaussian-like kernel;
/// digital content is unsharp-masked with a mix factor derived from the
/// inverse of the measured MTF, so a heavily blurred scan (`mtf` well
/// below 1.0) gets proportionally more high-frequency boost, aiming for
/// unity gain once the blur and the compensating sharpen combine.
/// `mtf` is clamped away from zero to avoid unbounded amplification on
/// a degenerate (near-zero-contrast) calibration read.
pub fn sharpen_content(image: &GrayImage, mtf: f64, analog: bool) -> GrayImage {
    let blurred = gaussian_blur(image);
    if analog {
        return blurred;
    }

    let mix = (1.0 / mtf.max(0.2) - 1.0).max(0.0).min(1.0);
    let (width, height) = (image.width(), image.height());
    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let original = image.get(x, y) as f64;
            let blur = blurred.get(x, y) as f64;
            let sharpened = original + mix * (original - blur);
            out.set(x, y, sharpened.round().max(0.0).min(255.0) as u8);
        }
    }
    out
}

/// Packs `symbols` (each `< 2^bits_per_symbol`) MSB-first into bytes,
/// per the dispatcher's declared symbol alignment (spec.md §4.3, §6).
pub fn pack_symbols_msb_first(symbols: &[u8], bits_per_symbol: usize) -> Vec<u8> {
    if bits_per_symbol == 0 {
        return Vec::new();
    }
    let total_bits = symbols.len() * bits_per_symbol;
    let mut out = vec![0u8; (total_bits + 7) / 8];
    let mut bit_index = 0usize;
    for &symbol in symbols {
        for shift in (0..bits_per_symbol).rev() {
            let bit = (symbol >> shift) & 1;
            if bit != 0 {
                out[bit_index / 8] |= 1 << (7 - (bit_index % 8));
            }
            bit_index += 1;
        }
    }
    out
}

/// Inverse of `pack_symbols_msb_first`: unpacks `count` symbols of
/// `bits_per_symbol` bits each from `bytes`, MSB-first.
pub fn unpack_symbols_msb_first(bytes: &[u8], bits_per_symbol: usize, count: usize) -> Vec<u8> {
    if bits_per_symbol == 0 {
        return vec![0; count];
    }
    let mut out = Vec::with_capacity(count);
    let mut bit_index = 0usize;
    for _ in 0..count {
        let mut symbol = 0u8;
        for _ in 0..bits_per_symbol {
            let byte = bytes.get(bit_index / 8).copied().unwrap_or(0);
            let bit = (byte >> (7 - (bit_index % 8))) & 1;
            symbol = (symbol << 1) | bit;
            bit_index += 1;
        }
        out.push(symbol);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpf_tracker::Point2D;

    #[test]
    fn sample_pixel_returns_the_exact_value_of_a_uniform_image() {
        let mut image = GrayImage::new(8, 8);
        for y in 0..8 {
            for x in 0..8 {
                image.set(x, y, 120);
            }
        }
        let value = sample_pixel(&image, 3.5, 3.5);
        assert!((value - 120.0).abs() < 1e-6);
    }

    #[test]
    fn sample_pixel_clamps_to_the_valid_range() {
        let mut image = GrayImage::new(4, 4);
        for y in 0..4 {
            image.set(0, y, 255);
            image.set(1, y, 0);
            image.set(2, y, 255);
            image.set(3, y, 0);
        }
        let value = sample_pixel(&image, 1.0, 1.0);
        assert!(value >= 0.0 && value <= 255.0);
    }

    #[test]
    fn sample_grid_from_a_quad_interpolates_interior_cells() {
        let mut image = GrayImage::new(20, 20);
        for y in 0..20 {
            for x in 0..20 {
                image.set(x, y, 200);
            }
        }
        let quad = CoordinateMatrix {
            columns: 2,
            rows: 2,
            points: vec![
                Point2D::new(2.0, 2.0),
                Point2D::new(18.0, 2.0),
                Point2D::new(2.0, 18.0),
                Point2D::new(18.0, 18.0),
            ],
        };
        let sampled = sample_grid(&quad, &image, 4, 4);
        assert_eq!(sampled.width(), 4);
        assert_eq!(sampled.height(), 4);
        assert_eq!(sampled.get(0, 0), 200);
    }

    #[test]
    fn sample_grid_uses_points_directly_when_shapes_match() {
        let image = GrayImage::new(10, 10);
        let refined = CoordinateMatrix {
            columns: 2,
            rows: 1,
            points: vec![Point2D::new(1.0, 1.0), Point2D::new(8.0, 1.0)],
        };
        let sampled = sample_grid(&refined, &image, 2, 1);
        assert_eq!(sampled.width(), 2);
        assert_eq!(sampled.height(), 1);
    }

    #[test]
    fn quantize_tiles_resolves_two_levels_within_a_tile() {
        let mut image = GrayImage::new(32, 32);
        for y in 0..32 {
            for x in 0..32 {
                image.set(x, y, if x < 16 { 20 } else { 220 });
            }
        }
        let symbols = quantize_tiles(&image, 32, 32, 2);
        assert_eq!(symbols[0], 0);
        assert_eq!(symbols[31], 1);
    }

    #[test]
    fn quantize_tiles_handles_a_uniform_tile_without_panicking() {
        let image = GrayImage::new(8, 8);
        let symbols = quantize_tiles(&image, 8, 8, 4);
        assert!(symbols.iter().all(|&s| s == 0));
    }

    #[test]
    fn pack_and_unpack_round_trip_arbitrary_bit_depths() {
        for bits in [1usize, 2, 4, 6] {
            let max_level = (1u16 << bits) - 1;
            let symbols: Vec<u8> = (0..37).map(|i| (i as u16 % (max_level + 1)) as u8).collect();
            let packed = pack_symbols_msb_first(&symbols, bits);
            let unpacked = unpack_symbols_msb_first(&packed, bits, symbols.len());
            assert_eq!(unpacked, symbols);
        }
    }

    #[test]
    fn apply_lut_maps_raw_intensity_to_nearest_bucket() {
        let lut = calibration_lut(&[10, 130, 250]);
        assert_eq!(apply_lut(&lut, 5), 0);
        assert_eq!(apply_lut(&lut, 255), 255);
    }

    fn checkerboard(width: usize, height: usize, period: usize) -> GrayImage {
        let mut image = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                image.set(x, y, if (x / period + y / period) % 2 == 0 { 0 } else { 255 });
            }
        }
        image
    }

    #[test]
    fn sharpen_content_leaves_a_uniform_image_unchanged() {
        let mut image = GrayImage::new(16, 16);
        for y in 0..16 {
            for x in 0..16 {
                image.set(x, y, 128);
            }
        }
        let sharpened = sharpen_content(&image, 0.5, false);
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(sharpened.get(x, y), 128);
            }
        }
    }

    #[test]
    fn sharpen_content_increases_contrast_for_low_mtf_digital_content() {
        let image = checkerboard(16, 16, 4);
        let blurred = gaussian_blur(&image);
        let sharpened = sharpen_content(&image, 0.4, false);

        let blurred_range = blurred.strip_histogram(0, 0, 16, 16);
        let sharpened_range = sharpened.strip_histogram(0, 0, 16, 16);
        let blurred_spread = *blurred_range.last().unwrap() as i32 - *blurred_range.first().unwrap() as i32;
        let sharpened_spread =
            *sharpened_range.last().unwrap() as i32 - *sharpened_range.first().unwrap() as i32;
        assert!(sharpened_spread >= blurred_spread);
    }

    #[test]
    fn sharpen_content_for_analog_returns_the_blurred_image_unchanged_by_mtf() {
        let image = checkerboard(16, 16, 4);
        let analog_low = sharpen_content(&image, 0.2, true);
        let analog_high = sharpen_content(&image, 0.9, true);
        assert_eq!(analog_low.pixels(), analog_high.pixels());
    }
}
