//! Drape 2D lines on a raster surface
//!
//! Z values are bilinearly interpolated between cell centres. The grid is
//! padded by one cell on each side with mirrored edge values, so that
//! coordinates in the outer half-cells still interpolate smoothly.

use swn_core::vector::LineStringZ;
use swn_core::{Error, Raster, Result};

/// Interpolate Z for each vertex of `lines` from `grid`.
///
/// The grid must be north-up, with positive cell width and negative cell
/// height. Any vertex outside the grid is an error.
pub fn interp_2d_to_3d(lines: &[LineStringZ], grid: &Raster<f64>) -> Result<Vec<LineStringZ>> {
    let gt = grid.transform();
    gt.require_north_up()?;
    let (ny, nx) = grid.shape();
    let data = grid.data();

    let (x0, dx, y0, dy) = (gt.origin_x, gt.pixel_width, gt.origin_y, gt.pixel_height);
    let (hx, hy) = (dx / 2.0, dy / 2.0);
    let div = dx * dy;
    let (max_x, min_y) = (x0 + nx as f64 * dx, y0 + ny as f64 * dy);

    // Mirrored padding: padded index 0 and n + 1 repeat the edge cells
    let padded = |row: i64, col: i64| -> f64 {
        let r = (row - 1).clamp(0, ny as i64 - 1) as usize;
        let c = (col - 1).clamp(0, nx as i64 - 1) as usize;
        data[(r, c)]
    };

    let outside: usize = lines
        .iter()
        .flat_map(|l| l.coords().iter())
        .filter(|c| c.x < x0 || c.x > max_x || c.y > y0 || c.y < min_y)
        .count();
    if outside > 0 {
        return Err(Error::InvalidGeometry(format!("{} coordinates are outside grid", outside)));
    }

    lines
        .iter()
        .map(|line| {
            let z = line
                .coords()
                .iter()
                .map(|c| {
                    let fx = (c.x - (x0 + hx)) / dx;
                    let fy = (c.y - (y0 + hy)) / dy;
                    let ix1 = fx.floor() as i64;
                    let iy1 = fy.floor() as i64;
                    let (ix2, iy2) = (ix1 + 1, iy1 + 1);
                    let dx1 = c.x - (x0 + ix1 as f64 * dx + hx);
                    let dy1 = c.y - (y0 + iy1 as f64 * dy + hy);
                    let dx2 = (x0 + ix2 as f64 * dx + hx) - c.x;
                    let dy2 = (y0 + iy2 as f64 * dy + hy) - c.y;
                    // Shift by one into the padded grid
                    let (ix1, ix2, iy1, iy2) = (ix1 + 1, ix2 + 1, iy1 + 1, iy2 + 1);
                    padded(iy1, ix1) * dx2 * dy2 / div
                        + padded(iy1, ix2) * dx1 * dy2 / div
                        + padded(iy2, ix1) * dx2 * dy1 / div
                        + padded(iy2, ix2) * dx1 * dy1 / div
                })
                .collect();
            LineStringZ::new(line.xy().clone(), Some(z))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use swn_core::GeoTransform;

    fn ramp() -> Raster<f64> {
        // 3 x 2 grid of 10 m cells, origin (0, 30); values rise to the east
        Raster::from_vec(vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0], 3, 2)
            .unwrap()
            .with_transform(GeoTransform::new(0.0, 30.0, 10.0, -10.0))
    }

    #[test]
    fn test_cell_centres_and_midpoint() {
        let line = LineStringZ::from_xy(vec![(5.0, 25.0), (10.0, 15.0), (15.0, 5.0)]).unwrap();
        let draped = interp_2d_to_3d(&[line], &ramp()).unwrap();
        let z = draped[0].z().unwrap();
        assert_relative_eq!(z[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(z[1], 1.5, epsilon = 1e-10);
        assert_relative_eq!(z[2], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_edges_use_padding() {
        let line = LineStringZ::from_xy(vec![(0.0, 30.0), (20.0, 0.0)]).unwrap();
        let draped = interp_2d_to_3d(&[line], &ramp()).unwrap();
        assert_eq!(draped[0].z(), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn test_outside_grid() {
        let line = LineStringZ::from_xy(vec![(5.0, 25.0), (25.0, 5.0), (-1.0, 5.0)]).unwrap();
        let err = interp_2d_to_3d(&[line], &ramp()).unwrap_err();
        assert!(err.to_string().contains("2 coordinates are outside grid"));
    }

    #[test]
    fn test_requires_north_up() {
        let grid = ramp().with_transform(GeoTransform::new(0.0, 0.0, 10.0, 10.0));
        let line = LineStringZ::from_xy(vec![(5.0, 5.0), (6.0, 6.0)]).unwrap();
        assert!(interp_2d_to_3d(&[line], &grid).is_err());
    }
}
