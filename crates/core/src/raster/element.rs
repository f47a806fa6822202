//! Cell value types

use num_traits::NumCast;
use std::fmt::Debug;

/// A value that can be stored in a [`Raster`](super::Raster) cell.
///
/// Elevations are `f64`; activity flags such as IBOUND are `i32`.
pub trait RasterElement: Copy + Debug + PartialOrd + NumCast + Send + Sync + 'static {
    /// Whether this value is missing, given the raster's nodata marker
    fn is_nodata(&self, nodata: Option<Self>) -> bool;
}

impl RasterElement for i32 {
    fn is_nodata(&self, nodata: Option<Self>) -> bool {
        nodata == Some(*self)
    }
}

impl RasterElement for f64 {
    /// NaN is always missing. ASCII grids often round the marker, so a
    /// small relative tolerance is allowed.
    fn is_nodata(&self, nodata: Option<Self>) -> bool {
        self.is_nan() || nodata.map_or(false, |nd| (self - nd).abs() <= nd.abs() * 1e-12)
    }
}
