//! Georeferenced raster of cell values

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::Array2;

/// A north-up grid of values, such as a DEM used to drape stream lines.
///
/// Data is indexed (row, col) with row 0 along the top edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T: RasterElement> {
    data: Array2<T>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Raster from values listed row by row, top row first
    pub fn from_vec(values: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 || values.len() != rows * cols {
            return Err(Error::InvalidDimensions { width: cols, height: rows });
        }
        Array2::from_shape_vec((rows, cols), values)
            .map(Self::from_array)
            .map_err(|e| Error::Other(e.to_string()))
    }

    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        let (rows, cols) = self.shape();
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds { row, col, rows, cols })
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Number of cells holding data
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| !self.is_nodata(**v)).count()
    }

    /// Smallest and largest valid values, or None if every cell is nodata
    pub fn value_range(&self) -> Option<(T, T)> {
        self.data
            .iter()
            .copied()
            .filter(|v| !self.is_nodata(*v))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((
                    if v < lo { v } else { lo },
                    if v > hi { v } else { hi },
                )),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dem() -> Raster<f64> {
        let mut r = Raster::from_vec(vec![15.0, 15.0, 14.0, -9999.0, 13.0, 12.0], 3, 2)
            .unwrap()
            .with_transform(GeoTransform::new(30.0, 130.0, 20.0, -20.0));
        r.set_nodata(Some(-9999.0));
        r
    }

    #[test]
    fn test_from_vec_dimensions() {
        assert!(Raster::from_vec(vec![1.0, 2.0, 3.0], 2, 2).is_err());
        assert!(Raster::<f64>::from_vec(vec![], 0, 0).is_err());
        let r = dem();
        assert_eq!(r.shape(), (3, 2));
        assert_eq!(r.get(2, 0).unwrap(), 13.0);
        assert!(r.get(3, 0).is_err());
    }

    #[test]
    fn test_nodata_and_range() {
        let r = dem();
        assert_eq!(r.valid_count(), 5);
        assert_eq!(r.value_range(), Some((12.0, 15.0)));
        assert_eq!(r.bounds(), (30.0, 70.0, 70.0, 130.0));

        let mut empty = Raster::from_vec(vec![-1_i32; 4], 2, 2).unwrap();
        empty.set_nodata(Some(-1));
        assert_eq!(empty.value_range(), None);
    }
}
