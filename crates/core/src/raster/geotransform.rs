//! Georeferencing of regular grids

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Affine placement of a grid, in GDAL coefficient order.
///
/// A cell at (row, col) has its upper-left corner at
/// `origin + col * (pixel_width, col_rotation) + row * (row_rotation, pixel_height)`.
/// Stream grids are expected to be north-up: no rotation and a negative
/// `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// Left edge
    pub origin_x: f64,
    /// Top edge
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Negative for north-up grids
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    /// North-up transform from the upper-left corner and cell sizes
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    pub fn from_gdal(c: [f64; 6]) -> Self {
        Self {
            origin_x: c[0],
            pixel_width: c[1],
            row_rotation: c[2],
            origin_y: c[3],
            col_rotation: c[4],
            pixel_height: c[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        let t = self;
        [t.origin_x, t.pixel_width, t.row_rotation, t.origin_y, t.col_rotation, t.pixel_height]
    }

    /// Coordinates of the centre of cell (row, col)
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let (c, r) = (col as f64 + 0.5, row as f64 + 0.5);
        (
            self.origin_x + c * self.pixel_width + r * self.row_rotation,
            self.origin_y + c * self.col_rotation + r * self.pixel_height,
        )
    }

    /// Error unless the grid is north-up with positive cell width
    pub fn require_north_up(&self) -> Result<()> {
        let invalid = |name: &'static str, value: String, reason: &str| Error::InvalidParameter {
            name,
            value,
            reason: reason.into(),
        };
        if !(self.pixel_width > 0.0) {
            return Err(invalid("pixel_width", self.pixel_width.to_string(), "must be positive"));
        }
        if self.row_rotation != 0.0 || self.col_rotation != 0.0 {
            let value = format!("({}, {})", self.row_rotation, self.col_rotation);
            return Err(invalid("rotation", value, "rotated grids not supported"));
        }
        if !(self.pixel_height < 0.0) {
            return Err(invalid("pixel_height", self.pixel_height.to_string(), "must be negative"));
        }
        Ok(())
    }

    /// Extent (min_x, min_y, max_x, max_y) of a grid with `ncols` by `nrows`
    /// cells, ignoring rotation
    pub fn bounds(&self, ncols: usize, nrows: usize) -> (f64, f64, f64, f64) {
        let x1 = self.origin_x + self.pixel_width * ncols as f64;
        let y1 = self.origin_y + self.pixel_height * nrows as f64;
        (
            self.origin_x.min(x1),
            self.origin_y.min(y1),
            self.origin_x.max(x1),
            self.origin_y.max(y1),
        )
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cell_center() {
        let gt = GeoTransform::new(30.0, 130.0, 20.0, -20.0);
        let (x, y) = gt.cell_center(2, 1);
        assert_relative_eq!(x, 60.0);
        assert_relative_eq!(y, 80.0);
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(30.0, 130.0, 20.0, -20.0);
        assert_eq!(gt.bounds(2, 3), (30.0, 70.0, 70.0, 130.0));
    }

    #[test]
    fn test_gdal_order() {
        let c = [1000.0, 25.0, 0.0, 2000.0, 0.0, -25.0];
        let gt = GeoTransform::from_gdal(c);
        assert_eq!(gt, GeoTransform::new(1000.0, 2000.0, 25.0, -25.0));
        assert_eq!(gt.to_gdal(), c);
    }

    #[test]
    fn test_require_north_up() {
        assert!(GeoTransform::new(0.0, 0.0, 10.0, -10.0).require_north_up().is_ok());
        let err = GeoTransform::new(0.0, 0.0, 10.0, 10.0).require_north_up().unwrap_err();
        assert!(err.to_string().contains("pixel_height"));
        let rotated = GeoTransform::from_gdal([0.0, 10.0, 1.0, 0.0, 0.0, -10.0]);
        assert!(rotated.require_north_up().is_err());
    }
}
