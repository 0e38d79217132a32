//! Sync-point grid refinement (spec.md §4.2 step 5, optional): the
//! coarse four-corner coordinate matrix is subdivided into a finer
//! grid, with each point nudged by an inverse-distance-weighted blend
//! of measured sync-mark displacements.
//!
//! Grounded on `vertical_displacement` / `calculate_average` in
//! `examples/original_source/src/unboxer/frametrackerutil.c`, which
//! blend neighbouring measured displacements by distance to a query
//! point rather than a strict four-neighbour bilinear lookup.

use crate::{CoordinateMatrix, Point2D};

/// A measured displacement (`dx`, `dy`, in image pixels) of a sync mark
/// from its nominal position, located at normalized grid coordinates
/// `(u, v)` in `[0, 1] x [0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct SyncDisplacement {
    pub u: f64,
    pub v: f64,
    pub dx: f64,
    pub dy: f64,
}

fn bilinear(p00: Point2D, p10: Point2D, p01: Point2D, p11: Point2D, u: f64, v: f64) -> Point2D {
    let top = Point2D::new(p00.x + (p10.x - p00.x) * u, p00.y + (p10.y - p00.y) * u);
    let bottom = Point2D::new(p01.x + (p11.x - p01.x) * u, p01.y + (p11.y - p01.y) * u);
    Point2D::new(top.x + (bottom.x - top.x) * v, top.y + (bottom.y - top.y) * v)
}

/// Inverse-distance-weighted displacement at `(u, v)`; zero if
/// `samples` is empty.
fn interpolate_displacement(samples: &[SyncDisplacement], u: f64, v: f64) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let mut weight_sum = 0.0;
    let mut dx_sum = 0.0;
    let mut dy_sum = 0.0;
    for sample in samples {
        let d2 = (sample.u - u).powi(2) + (sample.v - v).powi(2);
        let weight = 1.0 / (d2 + 1e-6);
        weight_sum += weight;
        dx_sum += weight * sample.dx;
        dy_sum += weight * sample.dy;
    }
    (dx_sum / weight_sum, dy_sum / weight_sum)
}

/// Builds a `grid_cols x grid_rows` coordinate matrix from `base` (a
/// 2x2 matrix of the container's four corners), displacing every grid
/// point by the blended displacement measured at its normalized
/// position.
pub fn refine_grid(
    base: &CoordinateMatrix,
    samples: &[SyncDisplacement],
    grid_cols: usize,
    grid_rows: usize,
) -> CoordinateMatrix {
    let p00 = base.get(0, 0);
    let p10 = base.get(1, 0);
    let p01 = base.get(0, 1);
    let p11 = base.get(1, 1);

    let mut points = Vec::with_capacity(grid_cols * grid_rows);
    for row in 0..grid_rows {
        let v = row as f64 / (grid_rows - 1).max(1) as f64;
        for col in 0..grid_cols {
            let u = col as f64 / (grid_cols - 1).max(1) as f64;
            let nominal = bilinear(p00, p10, p01, p11, u, v);
            let (dx, dy) = interpolate_displacement(samples, u, v);
            points.push(Point2D::new(nominal.x + dx, nominal.y + dy));
        }
    }

    CoordinateMatrix {
        columns: grid_cols,
        rows: grid_rows,
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> CoordinateMatrix {
        CoordinateMatrix {
            columns: 2,
            rows: 2,
            points: vec![
                Point2D::new(0.0, 0.0),
                Point2D::new(100.0, 0.0),
                Point2D::new(0.0, 100.0),
                Point2D::new(100.0, 100.0),
            ],
        }
    }

    #[test]
    fn refining_without_samples_stays_on_the_bilinear_grid() {
        let grid = refine_grid(&quad(), &[], 3, 3);
        let center = grid.get(1, 1);
        assert!((center.x - 50.0).abs() < 1e-9);
        assert!((center.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn a_nearby_displacement_sample_pulls_the_grid_toward_it() {
        let samples = vec![SyncDisplacement {
            u: 0.5,
            v: 0.5,
            dx: 3.0,
            dy: -2.0,
        }];
        let grid = refine_grid(&quad(), &samples, 3, 3);
        let center = grid.get(1, 1);
        assert!((center.x - 53.0).abs() < 1e-6);
        assert!((center.y - 48.0).abs() < 1e-6);
    }
}
