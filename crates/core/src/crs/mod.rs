//! Coordinate reference systems
//!
//! A CRS here is an identifier carried with lines, polygons and grids. It can
//! be parsed and compared, but coordinates are never reprojected.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Leading keywords of WKT1 and WKT2 definitions
const WKT_KEYWORDS: [&str; 8] = [
    "PROJCS[", "GEOGCS[", "GEOCCS[", "COMPD_CS[", "PROJCRS[", "GEOGCRS[", "GEODCRS[", "COMPOUNDCRS[",
];

/// One of an EPSG code, a WKT definition or a PROJ string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CRS {
    Epsg(u32),
    Wkt(String),
    Proj(String),
}

impl CRS {
    pub fn from_epsg(code: u32) -> Self {
        CRS::Epsg(code)
    }

    /// Geographic lon/lat, the GeoJSON default
    pub fn wgs84() -> Self {
        CRS::Epsg(4326)
    }

    /// Parse a CRS from any of the common textual forms.
    ///
    /// Accepted: a bare EPSG integer (`"2193"`), an authority string
    /// (`"EPSG:2193"`, `"epsg:2193"`), a legacy init string
    /// (`"+init=epsg:2193"`), a PROJ string (`"+proj=tmerc ..."`) or WKT.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Parse("empty CRS string".into()));
        }
        if let Ok(code) = s.parse::<u32>() {
            return Ok(CRS::Epsg(code));
        }
        let s = s.strip_prefix("+init=").unwrap_or(s);
        if let Some(code) = s.get(..5).filter(|p| p.eq_ignore_ascii_case("epsg:")).map(|_| &s[5..]) {
            return code
                .trim()
                .parse()
                .map(CRS::Epsg)
                .map_err(|_| Error::Parse(format!("invalid EPSG code in {:?}", s)));
        }
        if s.starts_with('+') {
            return Ok(CRS::Proj(s.to_string()));
        }
        let upper = s.to_ascii_uppercase();
        if WKT_KEYWORDS.iter().any(|kw| upper.starts_with(kw)) {
            return Ok(CRS::Wkt(s.to_string()));
        }
        Err(Error::Parse(format!("unrecognised CRS: {:?}", s)))
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            CRS::Epsg(code) => Some(*code),
            _ => None,
        }
    }

    pub fn wkt(&self) -> Option<&str> {
        match self {
            CRS::Wkt(s) => Some(s),
            _ => None,
        }
    }

    pub fn proj(&self) -> Option<&str> {
        match self {
            CRS::Proj(s) => Some(s),
            _ => None,
        }
    }

    /// Full textual form, which [`CRS::parse`] reads back
    pub fn identifier(&self) -> String {
        match self {
            CRS::Epsg(code) => format!("EPSG:{}", code),
            CRS::Wkt(s) | CRS::Proj(s) => s.clone(),
        }
    }

    /// Same CRS, ignoring whitespace in WKT and term order in PROJ strings.
    ///
    /// Different forms are never equivalent, since resolving EPSG codes
    /// needs a projection database.
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        match (self, other) {
            (CRS::Epsg(a), CRS::Epsg(b)) => a == b,
            (CRS::Wkt(a), CRS::Wkt(b)) => a.split_whitespace().eq(b.split_whitespace()),
            (CRS::Proj(a), CRS::Proj(b)) => proj_terms(a) == proj_terms(b),
            _ => false,
        }
    }
}

fn proj_terms(s: &str) -> Vec<String> {
    let mut terms: Vec<String> = s
        .split_whitespace()
        .map(str::to_ascii_lowercase)
        .filter(|t| t != "+no_defs" && t != "+type=crs")
        .collect();
    terms.sort();
    terms
}

/// Parse and compare two optional CRS strings.
///
/// Two missing CRS are equal; one missing is not.
pub fn compare_crs(a: Option<&str>, b: Option<&str>) -> Result<(Option<CRS>, Option<CRS>, bool)> {
    let crs1 = a.map(CRS::parse).transpose()?;
    let crs2 = b.map(CRS::parse).transpose()?;
    let are_eq = match (&crs1, &crs2) {
        (Some(x), Some(y)) => x.is_equivalent(y),
        (None, None) => true,
        _ => false,
    };
    Ok((crs1, crs2, are_eq))
}

impl fmt::Display for CRS {
    /// `EPSG:code`, the PROJ string, or the first 50 characters of WKT
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CRS::Epsg(code) => write!(f, "EPSG:{}", code),
            CRS::Proj(s) => f.write_str(s),
            CRS::Wkt(s) => {
                let end = s.char_indices().nth(50).map_or(s.len(), |(i, _)| i);
                write!(f, "WKT:{}", &s[..end])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(CRS::parse("2193").unwrap(), CRS::Epsg(2193));
        assert_eq!(CRS::parse("EPSG:2193").unwrap().epsg(), Some(2193));
        assert_eq!(CRS::parse("epsg:2193").unwrap().epsg(), Some(2193));
        assert_eq!(CRS::parse("+init=epsg:2193").unwrap().epsg(), Some(2193));
        let proj = CRS::parse("+proj=tmerc +lat_0=0 +lon_0=173").unwrap();
        assert_eq!(proj.proj(), Some("+proj=tmerc +lat_0=0 +lon_0=173"));
        let wkt = CRS::parse("PROJCS[\"NZGD2000 / New Zealand Transverse Mercator 2000\"]").unwrap();
        assert!(wkt.wkt().is_some());
        assert!(CRS::parse("").is_err());
        assert!(CRS::parse("EPSG:abc").is_err());
        assert!(CRS::parse("nonsense").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(CRS::from_epsg(2193).to_string(), "EPSG:2193");
        let long = format!("GEOGCS[\"{}\"]", "x".repeat(80));
        let wkt = CRS::parse(&long).unwrap();
        assert_eq!(wkt.to_string().len(), 54);
        assert_eq!(CRS::parse(&wkt.identifier()).unwrap(), wkt);
    }

    #[test]
    fn test_equivalence() {
        assert!(CRS::from_epsg(4326).is_equivalent(&CRS::wgs84()));
        let p1 = CRS::parse("+proj=utm +zone=59 +south").unwrap();
        let p2 = CRS::parse("+south +proj=utm +zone=59 +no_defs").unwrap();
        assert!(p1.is_equivalent(&p2));
        assert!(!CRS::wgs84().is_equivalent(&p1));
        let w1 = CRS::Wkt("GEOGCS[\"WGS 84\", DATUM[\"x\"]]".into());
        let w2 = CRS::Wkt("GEOGCS[\"WGS 84\",  DATUM[\"x\"]]".into());
        assert!(w1.is_equivalent(&w2));
    }

    #[test]
    fn test_compare_crs() {
        let (a, b, eq) = compare_crs(Some("EPSG:2193"), Some("2193")).unwrap();
        assert!(eq);
        assert_eq!(a, b);
        let (_, _, eq) = compare_crs(Some("EPSG:2193"), None).unwrap();
        assert!(!eq);
        let (_, _, eq) = compare_crs(None, None).unwrap();
        assert!(eq);
        assert!(compare_crs(Some("bogus"), None).is_err());
    }
}
