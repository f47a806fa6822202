//! Surface water network
//!
//! A network is built from stream line segments, each identified by an
//! integer segment number (`segnum`). Lines are digitized from upstream to
//! downstream, so the end of one segment joins the start of the segment
//! it drains into. Segments without a downstream segment are outlets and
//! point at the network's `end_segnum`.
//!
//! - `build`: connect segments and evaluate per-segment attributes
//! - `values`: accumulate, pair and broadcast per-segment values
//! - `query`: upstream and downstream traversal
//! - `diversions`: match diversion points to segments
//! - `remove`, `aggregate`: reduce a network
//! - `profile`: enforce a minimum downward slope on Z coordinates

mod aggregate;
mod build;
mod diversions;
mod profile;
mod query;
mod remove;
mod values;

pub use aggregate::AggregateFollow;
pub use build::{BuildNetwork, NetworkInput};
pub use diversions::{Diversion, DiversionInput};
pub use values::{PairMethod, SegmentValues};

use crate::util::abbr_str;
use geo_types::{LineString, MultiPolygon};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use swn_core::vector::LineStringZ;
use swn_core::{Error, Result, CRS};

/// Parameters for connecting line segments
#[derive(Debug, Clone)]
pub struct NetworkParams {
    /// Distance below which a segment end is considered to touch another line
    pub tolerance: f64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self { tolerance: 1e-6 }
    }
}

/// Parameters for `width = a + (upstream_area / 1e6) ^ b`
#[derive(Debug, Clone)]
pub struct WidthParams {
    pub a: SegmentValues<f64>,
    pub b: SegmentValues<f64>,
    /// Upstream area in square metres; the `upstream_area` attribute if None
    pub upstream_area: Option<SegmentValues<f64>>,
}

impl Default for WidthParams {
    fn default() -> Self {
        Self {
            a: SegmentValues::Scalar(1.42),
            b: SegmentValues::Scalar(0.52),
            upstream_area: None,
        }
    }
}

/// Parameters for elevation profile adjustment
#[derive(Debug, Clone)]
pub struct ProfileParams {
    /// Minimum downward slope, globally or per segment
    pub min_slope: SegmentValues<f64>,
}

impl Default for ProfileParams {
    fn default() -> Self {
        Self { min_slope: SegmentValues::Scalar(1.0 / 1000.0) }
    }
}

/// A stream segment and its evaluated attributes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub segnum: i64,
    #[serde(skip)]
    pub geometry: LineStringZ,
    /// Downstream segment, or the network's `end_segnum` for outlets
    pub to_segnum: i64,
    /// Upstream segments, as connected when the network was built
    pub from_segnums: BTreeSet<i64>,
    /// Outlet segment that this segment drains to
    pub cat_group: i64,
    /// Number of segments to the outlet, counting this one
    pub num_to_outlet: u32,
    /// Length from the upstream end of this segment to the outlet
    pub dist_to_outlet: f64,
    /// Upstream-first evaluation order, from 1
    pub sequence: u32,
    /// Strahler number
    pub stream_order: u32,
    pub upstream_length: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Diversions drawing from this segment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diversions: Option<BTreeSet<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agg_patch: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agg_path: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agg_unpath: Option<Vec<i64>>,
}

impl Segment {
    fn new(segnum: i64, geometry: LineStringZ, to_segnum: i64) -> Self {
        Self {
            segnum,
            geometry,
            to_segnum,
            from_segnums: BTreeSet::new(),
            cat_group: to_segnum,
            num_to_outlet: 0,
            dist_to_outlet: 0.0,
            sequence: 0,
            stream_order: 0,
            upstream_length: 0.0,
            upstream_area: None,
            width: None,
            diversions: None,
            agg_patch: None,
            agg_path: None,
            agg_unpath: None,
        }
    }
}

/// Surface water network of connected stream segments
#[derive(Debug, Clone)]
pub struct SurfaceWaterNetwork {
    segments: Vec<Segment>,
    index: HashMap<i64, usize>,
    end_segnum: i64,
    catchments: Option<Vec<MultiPolygon<f64>>>,
    diversions: Option<Vec<Diversion>>,
    profiles: Option<Vec<LineString<f64>>>,
    crs: Option<CRS>,
    /// Warnings raised while building or modifying the network
    pub warnings: Vec<String>,
    /// Topology errors found while building the network
    pub errors: Vec<String>,
    /// Messages from elevation profile adjustment
    pub messages: Vec<String>,
}

impl SurfaceWaterNetwork {
    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments in input order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segment by number
    pub fn segment(&self, segnum: i64) -> Option<&Segment> {
        self.index.get(&segnum).map(|&i| &self.segments[i])
    }

    /// Segment numbers in input order
    pub fn segnums(&self) -> Vec<i64> {
        self.segments.iter().map(|s| s.segnum).collect()
    }

    pub fn contains(&self, segnum: i64) -> bool {
        self.index.contains_key(&segnum)
    }

    /// Segment number used as `to_segnum` of outlets
    pub fn end_segnum(&self) -> i64 {
        self.end_segnum
    }

    /// True if every segment line has Z coordinates
    pub fn has_z(&self) -> bool {
        self.segments.iter().all(|s| s.geometry.has_z())
    }

    /// Segments that no other segment drains into
    pub fn headwater(&self) -> Vec<i64> {
        let targets: BTreeSet<i64> = self.segments.iter().map(|s| s.to_segnum).collect();
        self.segments
            .iter()
            .filter(|s| !targets.contains(&s.segnum))
            .map(|s| s.segnum)
            .collect()
    }

    /// Segments that drain to `end_segnum`
    pub fn outlets(&self) -> Vec<i64> {
        self.segments
            .iter()
            .filter(|s| s.to_segnum == self.end_segnum)
            .map(|s| s.segnum)
            .collect()
    }

    /// Downstream segment of each segment that is not an outlet
    pub fn to_segnums(&self) -> BTreeMap<i64, i64> {
        self.segments
            .iter()
            .filter(|s| s.to_segnum != self.end_segnum)
            .map(|s| (s.segnum, s.to_segnum))
            .collect()
    }

    /// Upstream segments of each segment that has any
    pub fn from_segnums(&self) -> BTreeMap<i64, BTreeSet<i64>> {
        self.segments
            .iter()
            .filter(|s| !s.from_segnums.is_empty())
            .map(|s| (s.segnum, s.from_segnums.clone()))
            .collect()
    }

    /// Catchment polygons, aligned with segments
    pub fn catchments(&self) -> Option<&[MultiPolygon<f64>]> {
        self.catchments.as_deref()
    }

    pub fn diversions(&self) -> Option<&[Diversion]> {
        self.diversions.as_deref()
    }

    /// Elevation profiles from the last `adjust_elevation_profile`
    pub fn profiles(&self) -> Option<&[LineString<f64>]> {
        self.profiles.as_deref()
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    fn position(&self, segnum: i64) -> Option<usize> {
        self.index.get(&segnum).copied()
    }

    /// Upstream segments that are still present and still drain here
    fn upstream_of(&self, segnum: i64) -> Vec<i64> {
        match self.segment(segnum) {
            Some(seg) => seg
                .from_segnums
                .iter()
                .copied()
                .filter(|u| self.segment(*u).map_or(false, |s| s.to_segnum == segnum))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Segment positions ordered by `sequence`
    fn sequence_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.segments.len()).collect();
        order.sort_by_key(|&i| self.segments[i].sequence);
        order
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .segments
            .iter()
            .enumerate()
            .map(|(i, s)| (s.segnum, i))
            .collect();
    }

    fn add_warning(&mut self, msg: String) {
        tracing::warn!("{}", msg);
        self.warnings.push(msg);
    }

    fn add_error(&mut self, msg: String) {
        tracing::error!("{}", msg);
        self.errors.push(msg);
    }

    /// Error for segnums that are not in the network
    fn not_found(what: &str, missing: &[i64]) -> Error {
        Error::IndexNotFound(format!(
            "{} {} not found in segments.index: {}",
            missing.len(),
            what,
            abbr_str(missing, usize::MAX)
        ))
    }
}

impl fmt::Display for SurfaceWaterNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<SurfaceWaterNetwork:")?;
        match (self.has_z(), self.catchments.is_some()) {
            (true, true) => write!(f, " with Z coordinates and catchment polygons")?,
            (true, false) => write!(f, " with Z coordinates")?,
            (false, true) => write!(f, " with catchment polygons")?,
            (false, false) => {}
        }
        writeln!(f)?;
        let segnums = self.segnums();
        writeln!(f, "  {} segments: {}", segnums.len(), abbr_str(&segnums, 4))?;
        let headwater = self.headwater();
        writeln!(f, "  {} headwater: {}", headwater.len(), abbr_str(&headwater, 4))?;
        let outlets = self.outlets();
        writeln!(f, "  {} outlets: {}", outlets.len(), abbr_str(&outlets, 4))?;
        match &self.diversions {
            None => write!(f, "  no diversions />"),
            Some(divs) => {
                let kind = if divs.iter().any(|d| d.point.is_some()) {
                    "spatial"
                } else {
                    "non-spatial"
                };
                let ids: Vec<i64> = divs.iter().map(|d| d.divid).collect();
                write!(f, "  {} diversions ({}): {} />", ids.len(), kind, abbr_str(&ids, 4))
            }
        }
    }
}

impl PartialEq for SurfaceWaterNetwork {
    fn eq(&self, other: &Self) -> bool {
        self.end_segnum == other.end_segnum
            && self.segments == other.segments
            && self.catchments == other.catchments
            && self.diversions == other.diversions
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_display_valid() {
        assert_eq!(
            valid_n_polygons().to_string(),
            "<SurfaceWaterNetwork: with Z coordinates and catchment polygons\n\
             \x20 3 segments: [0, 1, 2]\n\
             \x20 2 headwater: [1, 2]\n\
             \x20 1 outlets: [0]\n\
             \x20 no diversions />"
        );
    }

    #[test]
    fn test_display_fluss() {
        assert_eq!(
            fluss_n().to_string(),
            "<SurfaceWaterNetwork:\n\
             \x20 19 segments: [0, 1, ..., 17, 18]\n\
             \x20 10 headwater: [0, 1, ..., 15, 17]\n\
             \x20 1 outlets: [18]\n\
             \x20 no diversions />"
        );
    }

    #[test]
    fn test_to_and_from_segnums() {
        let n = valid_n();
        assert_eq!(n.to_segnums(), BTreeMap::from([(1, 0), (2, 0)]));
        assert_eq!(n.from_segnums(), BTreeMap::from([(0, BTreeSet::from([1, 2]))]));
    }

    #[test]
    fn test_eq() {
        assert_eq!(valid_n(), valid_n());
        assert_ne!(valid_n(), valid_n_polygons());
        let mut lines = lines(&VALID_LINES);
        lines.pop();
        let n2 = SurfaceWaterNetwork::from_lines(lines, None).unwrap();
        assert_ne!(valid_n(), n2);
    }

    #[test]
    fn test_segment_serializes_attributes() {
        let n = valid_n();
        let value = serde_json::to_value(n.segment(0).unwrap()).unwrap();
        assert_eq!(value["to_segnum"], -1);
        assert_eq!(value["from_segnums"], serde_json::json!([1, 2]));
        assert!(value.get("geometry").is_none());
        assert!(value.get("width").is_none());
    }
}
