//! # swn-core
//!
//! Core types, traits and I/O for the surface water network library.
//!
//! This crate provides:
//! - `LineStringZ`: stream line geometry with optional Z per vertex
//! - `Raster<T>` and `GeoTransform`: georeferenced grids (DEMs, model tops)
//! - `CRS`: coordinate reference system identifiers
//! - WKT, GeoJSON and ESRI ASCII grid readers
//! - `PackageDescriptor`: the distribution metadata of this build

pub mod crs;
pub mod error;
pub mod io;
pub mod package;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use vector::LineStringZ;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection, Geometry, LineStringZ};
    pub use crate::Algorithm;
}

/// A named operation with typed input and tunable parameters.
///
/// Network construction implements this so it can be driven generically
/// with default or explicit parameters.
pub trait Algorithm {
    type Input;
    type Output;
    type Params: Default;
    type Error: std::error::Error;

    fn name(&self) -> &'static str;

    /// One-line summary for help output
    fn description(&self) -> &'static str;

    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
    ) -> std::result::Result<Self::Output, Self::Error>;

    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
