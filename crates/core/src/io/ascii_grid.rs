//! ESRI ASCII grid reader
//!
//! ```text
//! ncols        4
//! nrows        3
//! xllcorner    0.0
//! yllcorner    0.0
//! cellsize     10.0
//! NODATA_value -9999
//! 15 14 13 12
//! ...
//! ```

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const HEADER_KEYS: [&str; 8] = [
    "ncols",
    "nrows",
    "xllcorner",
    "yllcorner",
    "xllcenter",
    "yllcenter",
    "cellsize",
    "nodata_value",
];

/// Read an ESRI ASCII grid file
pub fn read_ascii_grid<P: AsRef<Path>>(path: P) -> Result<Raster<f64>> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_ascii_grid(&text)
}

/// Parse the text of an ESRI ASCII grid
pub fn parse_ascii_grid(text: &str) -> Result<Raster<f64>> {
    let mut header: HashMap<String, f64> = HashMap::new();
    let mut tokens = text.split_whitespace().peekable();

    while let Some(&key) = tokens.peek() {
        let key = key.to_ascii_lowercase();
        if !HEADER_KEYS.contains(&key.as_str()) {
            break;
        }
        tokens.next();
        let value = tokens
            .next()
            .ok_or_else(|| Error::Parse(format!("missing value for {}", key)))?;
        let value = value
            .parse::<f64>()
            .map_err(|_| Error::Parse(format!("invalid value {:?} for {}", value, key)))?;
        header.insert(key, value);
    }

    let get = |key: &str| {
        header
            .get(key)
            .copied()
            .ok_or_else(|| Error::Parse(format!("ASCII grid header missing {}", key)))
    };
    let ncols = get("ncols")? as usize;
    let nrows = get("nrows")? as usize;
    let cellsize = get("cellsize")?;
    let (xll, yll) = match (header.get("xllcorner"), header.get("yllcorner")) {
        (Some(&x), Some(&y)) => (x, y),
        _ => (
            get("xllcenter")? - cellsize / 2.0,
            get("yllcenter")? - cellsize / 2.0,
        ),
    };

    let data = tokens
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| Error::Parse(format!("invalid grid value {:?}", t)))
        })
        .collect::<Result<Vec<_>>>()?;
    if data.len() != nrows * ncols {
        return Err(Error::Parse(format!(
            "expected {} grid values, found {}",
            nrows * ncols,
            data.len()
        )));
    }

    let top = yll + cellsize * nrows as f64;
    let mut raster = Raster::from_vec(data, nrows, ncols)?
        .with_transform(GeoTransform::new(xll, top, cellsize, -cellsize));
    raster.set_nodata(header.get("nodata_value").copied());
    Ok(raster)
}
