//! Reading and writing vector and raster data
//!
//! - WKT text for single geometries
//! - GeoJSON feature collections
//! - ESRI ASCII grids for elevation models

mod ascii_grid;
mod geojson;
mod wkt;

pub use ascii_grid::{parse_ascii_grid, read_ascii_grid};
pub use geojson::{feature_collection_to_geojson, geometry_to_geojson, parse_geojson, read_geojson, write_geojson};
pub use wkt::{parse_wkt, parse_wkt_list, to_wkt};
