//! Build a network from stream lines
//!
//! Segments are connected where the downstream end of one line matches the
//! upstream start of another. Topology problems do not fail the build; they
//! are collected in `warnings` and `errors`.

use super::{NetworkParams, Segment, SurfaceWaterNetwork};
use crate::spatial::SpatialIndex;
use crate::util::{abbr_set_str, abbr_str};
use geo::EuclideanDistance;
use geo_types::{Coord, MultiPolygon, Point};
use std::collections::{BTreeSet, HashMap, HashSet};
use swn_core::vector::{FeatureCollection, Geometry, LineStringZ};
use swn_core::{Algorithm, Error, Result};
use tracing::{debug, info};

/// Stream lines keyed by segment number, with optional catchments
#[derive(Debug, Clone)]
pub struct NetworkInput {
    pub lines: Vec<(i64, LineStringZ)>,
    /// Catchment polygons, one per line in the same order
    pub polygons: Option<Vec<MultiPolygon<f64>>>,
}

/// Network construction as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct BuildNetwork;

impl Algorithm for BuildNetwork {
    type Input = NetworkInput;
    type Output = SurfaceWaterNetwork;
    type Params = NetworkParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Surface Water Network"
    }

    fn description(&self) -> &'static str {
        "Connect stream line segments into a network and evaluate their topology"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        SurfaceWaterNetwork::from_lines_with(input.lines, input.polygons, &params)
    }
}

/// Coordinates shared by several segment ends, in first-seen order
#[derive(Default)]
struct SharedCoords(Vec<(Coord<f64>, BTreeSet<i64>)>);

impl SharedCoords {
    fn add(&mut self, key: Coord<f64>, segnum: i64) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, set)) => {
                set.insert(segnum);
            }
            None => self.0.push((key, BTreeSet::from([segnum]))),
        }
    }
}

impl SurfaceWaterNetwork {
    /// Build a network with default parameters
    pub fn from_lines(
        lines: Vec<(i64, LineStringZ)>,
        polygons: Option<Vec<MultiPolygon<f64>>>,
    ) -> Result<Self> {
        Self::from_lines_with(lines, polygons, &NetworkParams::default())
    }

    /// Build a network from `(segnum, line)` pairs.
    ///
    /// Lines must be digitized from upstream to downstream. Segment numbers
    /// must be unique. If `polygons` are given, they are catchments aligned
    /// with `lines`.
    pub fn from_lines_with(
        lines: Vec<(i64, LineStringZ)>,
        polygons: Option<Vec<MultiPolygon<f64>>>,
        params: &NetworkParams,
    ) -> Result<Self> {
        if lines.is_empty() {
            return Err(Error::InvalidGeometry("one or more lines are required".into()));
        }
        let mut index = HashMap::with_capacity(lines.len());
        for (i, (segnum, _)) in lines.iter().enumerate() {
            if index.insert(*segnum, i).is_some() {
                return Err(Error::InvalidParameter {
                    name: "segnum",
                    value: segnum.to_string(),
                    reason: "segment numbers must be unique".into(),
                });
            }
        }
        info!("creating network with {} segments", lines.len());

        let min_segnum = lines.iter().map(|(s, _)| *s).min().unwrap_or(0);
        let end_segnum = if min_segnum > 0 { 0 } else { min_segnum - 1 };
        let segments = lines
            .into_iter()
            .map(|(segnum, geom)| Segment::new(segnum, geom, end_segnum))
            .collect();

        let mut n = Self {
            segments,
            index,
            end_segnum,
            catchments: None,
            diversions: None,
            profiles: None,
            crs: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            messages: Vec::new(),
        };
        let sindex = SpatialIndex::from_lines(n.segments.iter().map(|s| &s.geometry));
        n.connect(&sindex, params.tolerance);
        n.evaluate_outlet_paths();
        n.check_shared_ends(&sindex, params.tolerance);
        n.evaluate_sequence();
        n.evaluate_upstream_length();
        if polygons.is_some() {
            n.set_catchments(polygons)?;
        }
        Ok(n)
    }

    /// Build a network from line features.
    ///
    /// Segment numbers come from `id_field`, the feature id, or the feature
    /// position. Catchment polygon features are matched by the same key.
    pub fn from_features(
        lines: &FeatureCollection,
        id_field: Option<&str>,
        polygons: Option<&FeatureCollection>,
    ) -> Result<Self> {
        let keyed = lines
            .keyed(id_field)?
            .into_iter()
            .map(|(segnum, f)| match &f.geometry {
                Some(Geometry::LineString(l)) => Ok((segnum, l.clone())),
                _ => Err(Error::InvalidGeometry("lines must all be LineString types".into())),
            })
            .collect::<Result<Vec<_>>>()?;

        let catchments = match polygons {
            Some(fc) => {
                let mut by_key: HashMap<i64, MultiPolygon<f64>> = HashMap::new();
                for (segnum, f) in fc.keyed(id_field)? {
                    let mp = match &f.geometry {
                        Some(Geometry::Polygon(p)) => MultiPolygon::new(vec![p.clone()]),
                        Some(Geometry::MultiPolygon(mp)) => mp.clone(),
                        _ => {
                            return Err(Error::InvalidGeometry(
                                "polygons must all be Polygon or MultiPolygon types".into(),
                            ))
                        }
                    };
                    by_key.insert(segnum, mp);
                }
                let aligned = keyed
                    .iter()
                    .map(|(segnum, _)| by_key.remove(segnum))
                    .collect::<Option<Vec<_>>>();
                match aligned {
                    Some(v) if by_key.is_empty() => Some(v),
                    _ => {
                        return Err(Error::InvalidParameter {
                            name: "polygons",
                            value: format!("{} features", fc.len()),
                            reason: "catchments.index is different than for segments".into(),
                        })
                    }
                }
            }
            None => None,
        };

        let mut n = Self::from_lines(keyed, catchments)?;
        n.crs = lines.crs.clone();
        if let (Some(a), Some(b)) = (&lines.crs, polygons.and_then(|fc| fc.crs.as_ref())) {
            if !a.is_equivalent(b) {
                n.add_warning(format!("polygons CRS {} is different than lines CRS {}", b, a));
            }
        }
        Ok(n)
    }

    /// Find the downstream segment of each segment
    fn connect(&mut self, sindex: &SpatialIndex, tol: f64) {
        debug!("finding connections between pairs of segment lines");
        for i in 0..self.segments.len() {
            let seg1 = &self.segments[i];
            let end1 = seg1.geometry.end();
            let end1_z = seg1.geometry.end_z();
            let end1_pt = Point::from(end1);
            let mut to_segnums = Vec::new();
            let mut msgs: Vec<(bool, String)> = Vec::new();
            let near = sindex.intersecting_bbox((end1.x - tol, end1.y - tol, end1.x + tol, end1.y + tol));
            for j in near {
                if i == j {
                    continue;
                }
                let seg2 = &self.segments[j];
                if end1 == seg2.geometry.start() {
                    to_segnums.push(seg2.segnum);
                    if end1_z != seg2.geometry.start_z() {
                        msgs.push((
                            false,
                            format!(
                                "end of segment {} matches start of segment {} in 2D, \
                                 but not in Z dimension",
                                seg1.segnum, seg2.segnum
                            ),
                        ));
                    }
                } else if end1_pt.euclidean_distance(seg2.geometry.xy()) < tol
                    && end1_pt.euclidean_distance(&Point::from(seg2.geometry.end())) > tol
                {
                    msgs.push((
                        true,
                        format!("segment {} connects to the middle of segment {}", seg1.segnum, seg2.segnum),
                    ));
                }
            }
            if to_segnums.len() > 1 {
                msgs.push((
                    true,
                    format!(
                        "segment {} has more than one downstream segments: {}",
                        seg1.segnum,
                        abbr_str(&to_segnums, usize::MAX)
                    ),
                ));
            }
            for (is_error, msg) in msgs {
                if is_error {
                    self.add_error(msg);
                } else {
                    self.add_warning(msg);
                }
            }
            if let Some(&to) = to_segnums.first() {
                self.segments[i].to_segnum = to;
            }
        }

        for i in 0..self.segments.len() {
            let (segnum, to) = (self.segments[i].segnum, self.segments[i].to_segnum);
            if let Some(j) = self.position(to) {
                self.segments[j].from_segnums.insert(segnum);
            }
        }
    }

    /// Evaluate `cat_group`, `num_to_outlet` and `dist_to_outlet` walking
    /// upstream from each outlet
    fn evaluate_outlet_paths(&mut self) {
        let outlets = self.outlets();
        debug!(
            "evaluating segments upstream from {} outlet{}",
            outlets.len(),
            if outlets.len() == 1 { "" } else { "s" }
        );
        for seg in &mut self.segments {
            seg.cat_group = self.end_segnum;
            seg.num_to_outlet = 0;
            seg.dist_to_outlet = 0.0;
        }
        let mut stack: Vec<(i64, i64, u32, f64)> =
            outlets.iter().rev().map(|&s| (s, s, 0, 0.0)).collect();
        while let Some((segnum, cat_group, num, dist)) = stack.pop() {
            let Some(i) = self.position(segnum) else { continue };
            let seg = &mut self.segments[i];
            seg.cat_group = cat_group;
            seg.num_to_outlet = num + 1;
            seg.dist_to_outlet = dist + seg.geometry.length();
            let (num, dist) = (seg.num_to_outlet, seg.dist_to_outlet);
            for &up in seg.from_segnums.iter().rev() {
                stack.push((up, cat_group, num, dist));
            }
        }
    }

    /// Report headwater starts and outlet ends that coincide with others
    fn check_shared_ends(&mut self, sindex: &SpatialIndex, tol: f64) {
        let headwater = self.headwater();
        let outlets = self.outlets();
        debug!(
            "checking {} headwater segments and {} outlet segments",
            headwater.len(),
            outlets.len()
        );
        let near = |c: Coord<f64>| sindex.intersecting_bbox((c.x - tol, c.y - tol, c.x + tol, c.y + tol));

        let mut starts = SharedCoords::default();
        for segnum in headwater {
            let Some(i) = self.position(segnum) else { continue };
            let start = self.segments[i].geometry.start();
            for j in near(start) {
                if j != i && self.segments[j].geometry.start() == start {
                    starts.add(start, self.segments[j].segnum);
                }
            }
        }
        for (key, set) in starts.0 {
            self.add_error(format!(
                "starting coordinate ({:?}, {:?}) matches start segment{}: {}",
                key.x,
                key.y,
                if set.len() == 1 { "" } else { "s" },
                abbr_set_str(&Vec::from_iter(set), usize::MAX)
            ));
        }

        let mut ends = SharedCoords::default();
        for segnum in outlets {
            let Some(i) = self.position(segnum) else { continue };
            let end = self.segments[i].geometry.end();
            for j in near(end) {
                if j != i && self.segments[j].geometry.end() == end {
                    ends.add(end, self.segments[j].segnum);
                }
            }
        }
        for (key, set) in ends.0 {
            self.add_warning(format!(
                "ending coordinate ({:?}, {:?}) matches end segment{}: {}",
                key.x,
                key.y,
                if set.len() == 1 { "" } else { "s" },
                abbr_set_str(&Vec::from_iter(set), usize::MAX)
            ));
        }
    }

    /// Evaluate `sequence` and `stream_order`.
    ///
    /// Headwater segments come first, furthest from their outlet first. Each
    /// following pass numbers the segments whose upstream segments are all
    /// complete.
    fn evaluate_sequence(&mut self) {
        debug!("evaluating downstream sequence");
        let key = |s: &Segment| (s.num_to_outlet, s.dist_to_outlet);
        let desc = |a: &Segment, b: &Segment| {
            let (ka, kb) = (key(a), key(b));
            kb.0.cmp(&ka.0).then(kb.1.total_cmp(&ka.1))
        };
        for seg in &mut self.segments {
            seg.sequence = 0;
            seg.stream_order = 0;
        }

        let mut headwater: Vec<usize> = self
            .headwater()
            .iter()
            .filter_map(|s| self.position(*s))
            .collect();
        headwater.sort_by(|&a, &b| desc(&self.segments[a], &self.segments[b]));
        let mut completed: HashSet<i64> = HashSet::new();
        let mut sequence = 0;
        for i in headwater {
            sequence += 1;
            let seg = &mut self.segments[i];
            seg.sequence = sequence;
            seg.stream_order = 1;
            completed.insert(seg.segnum);
        }

        let mut numiter = 0;
        loop {
            numiter += 1;
            let downstream: BTreeSet<usize> = completed
                .iter()
                .filter_map(|s| self.segment(*s))
                .map(|s| s.to_segnum)
                .filter(|to| !completed.contains(to))
                .filter_map(|to| self.position(to))
                .collect();
            let mut downstream: Vec<usize> = downstream.into_iter().collect();
            downstream.sort_by(|&a, &b| desc(&self.segments[a], &self.segments[b]));

            let mut progress = false;
            for i in downstream {
                let upstream = &self.segments[i].from_segnums;
                if !upstream.iter().all(|u| completed.contains(u)) {
                    continue;
                }
                let orders: Vec<u32> = upstream
                    .iter()
                    .filter_map(|u| self.segment(*u))
                    .map(|s| s.stream_order)
                    .collect();
                let max_order = orders.iter().copied().max().unwrap_or(0);
                let ties = orders.iter().filter(|&&o| o == max_order).count();
                sequence += 1;
                let seg = &mut self.segments[i];
                seg.sequence = sequence;
                seg.stream_order = if ties > 1 { max_order + 1 } else { max_order };
                completed.insert(seg.segnum);
                progress = true;
            }
            if !progress {
                break;
            }
        }
        debug!("sequence evaluated with {} iterations", numiter);
    }

    /// Re-evaluate `upstream_length` from the present segments
    pub fn evaluate_upstream_length(&mut self) {
        debug!("evaluating upstream length");
        let lengths: Vec<f64> = self.segments.iter().map(|s| s.geometry.length()).collect();
        let accum = self.accumulate(lengths);
        for (seg, value) in self.segments.iter_mut().zip(accum) {
            seg.upstream_length = value;
        }
    }
}
