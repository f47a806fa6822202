//! MODFLOW SFR reaches
//!
//! Reaches are the pieces of each segment line within each grid cell. They
//! are numbered in segment `sequence` order, so upstream segments come
//! first, then by distance along the segment. Each diversion adds one
//! more segment of a single reach after all network segments.

use super::grid::{IboundAction, ModelGrid};
use super::segment_data::SegmentData;
use crate::maybe_rayon::*;
use crate::network::{PairMethod, SegmentValues, SurfaceWaterNetwork};
use crate::spatial::{clip_line_to_rect, line_bbox, SpatialIndex};
use crate::util::abbr_str;
use geo_types::LineString;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use swn_core::vector::LineStringZ;
use swn_core::{Error, Result};
use tracing::{debug, info, warn};

/// Parameters for creating SFR reaches
#[derive(Debug, Clone)]
pub struct SfrParams {
    pub ibound_action: IboundAction,
    /// Lower bound of reach slopes
    pub min_slope: f64,
    /// With [`IboundAction::Freeze`], a piece of line in an inactive cell is
    /// joined to the neighbouring reach if all of it lies within this
    /// fraction of the cell size from that reach's cell. Zero drops every
    /// such piece.
    pub reach_include_fraction: f64,
}

impl Default for SfrParams {
    fn default() -> Self {
        Self {
            ibound_action: IboundAction::Freeze,
            min_slope: 1e-4,
            reach_include_fraction: 0.2,
        }
    }
}

/// Streambed properties at the upstream end of each segment, and
/// optionally at the downstream end of outlets
#[derive(Debug, Clone)]
pub struct SegmentDataParams {
    pub hyd_cond1: SegmentValues<f64>,
    pub hyd_cond_out: Option<SegmentValues<f64>>,
    pub thickness1: SegmentValues<f64>,
    pub thickness_out: Option<SegmentValues<f64>>,
    /// Channel width; the segment `width` attribute, or 10 if not evaluated
    pub width1: Option<SegmentValues<f64>>,
    pub width_out: Option<SegmentValues<f64>>,
    /// Manning's roughness coefficient
    pub roughch: SegmentValues<f64>,
}

impl Default for SegmentDataParams {
    fn default() -> Self {
        Self {
            hyd_cond1: SegmentValues::Scalar(1.0),
            hyd_cond_out: None,
            thickness1: SegmentValues::Scalar(1.0),
            thickness_out: None,
            width1: None,
            width_out: None,
            roughch: SegmentValues::Scalar(0.024),
        }
    }
}

/// A stream reach in one grid cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reach {
    /// Reach number over all segments, from 1
    pub reachid: usize,
    /// Network segment, or the network's `end_segnum` for diversions
    pub segnum: i64,
    /// SFR segment number, from 1
    pub iseg: usize,
    /// Reach number within the segment, from 1
    pub ireach: usize,
    /// Zero-based layer, row and column
    pub k: usize,
    pub i: usize,
    pub j: usize,
    pub rchlen: f64,
    /// Distance along the segment line to the start of the reach
    pub dist: f64,
    /// Ibound of the cell before any modification
    pub prev_ibound: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divid: Option<i64>,
    #[serde(skip)]
    pub geometry: LineStringZ,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zcoord_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strtop: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strthick: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strhc1: Option<f64>,
}

impl Reach {
    pub fn is_diversion(&self) -> bool {
        self.divid.is_some()
    }
}

/// A piece of a segment line within a cell
struct Piece {
    start: f64,
    row: usize,
    col: usize,
    line: LineStringZ,
}

/// Keep pieces in active cells. A piece in an inactive cell moves to the
/// cell of a neighbouring active piece when no vertex is further than
/// `threshold` from it, and is joined to that piece.
fn settle_inactive(pieces: Vec<Piece>, grid: &ModelGrid, threshold: f64) -> Result<Vec<Piece>> {
    let active: Vec<bool> = pieces.iter().map(|p| grid.is_active(p.row, p.col)).collect();
    let mut kept: Vec<Piece> = Vec::with_capacity(pieces.len());
    for (n, piece) in pieces.iter().enumerate() {
        let cell = if active[n] {
            Some((piece.row, piece.col))
        } else if threshold > 0.0 {
            [n.checked_sub(1), Some(n + 1)]
                .into_iter()
                .flatten()
                .filter(|&m| m < pieces.len() && active[m])
                .map(|m| {
                    let rect = grid.cell_rect(pieces[m].row, pieces[m].col);
                    let furthest = piece
                        .line
                        .coords()
                        .iter()
                        .map(|c| rect.distance(c.x, c.y))
                        .fold(0.0, f64::max);
                    (furthest, (pieces[m].row, pieces[m].col))
                })
                .filter(|(furthest, _)| *furthest <= threshold)
                .min_by(|a, b| a.0.total_cmp(&b.0))
                .map(|(_, cell)| cell)
        } else {
            None
        };
        let Some((row, col)) = cell else {
            continue;
        };
        match kept.last_mut() {
            Some(last)
                if (last.row, last.col) == (row, col)
                    && (last.start + last.line.length() - piece.start).abs()
                        <= 1e-9 * piece.start.max(1.0) =>
            {
                last.line = LineStringZ::concat(&[&last.line, &piece.line])?;
            }
            _ => kept.push(Piece { start: piece.start, row, col, line: piece.line.clone() }),
        }
    }
    Ok(kept)
}

/// Zero-length line at the downstream end of `line`
fn end_point_line(line: &LineStringZ) -> Result<LineStringZ> {
    let (x, y, z) = line.coord3(line.num_coords() - 1);
    LineStringZ::new(LineString::from(vec![(x, y), (x, y)]), z.map(|z| vec![z, z]))
}

/// A surface water network discretized on a MODFLOW grid
#[derive(Debug, Clone)]
pub struct SfrNetwork {
    pub(super) network: SurfaceWaterNetwork,
    pub(super) grid: ModelGrid,
    pub(super) reaches: Vec<Reach>,
    pub(super) segment_data: Option<Vec<SegmentData>>,
    ibound_modified: usize,
    min_slope: f64,
}

fn interp(v1: f64, v2: f64, frac: f64, log: bool) -> f64 {
    if log && v1 > 0.0 && v2 > 0.0 {
        (v1.ln() + frac * (v2.ln() - v1.ln())).exp()
    } else {
        v1 + frac * (v2 - v1)
    }
}

impl SfrNetwork {
    /// Create reaches from the intersection of segment lines with grid cells.
    ///
    /// With [`IboundAction::Freeze`] only active cells get reaches, apart
    /// from short pieces kept by `reach_include_fraction`. With
    /// [`IboundAction::Modify`] inactive cells crossed by streams are made
    /// active. Diversions of the network get a reach in the cell of the
    /// last reach of the segment they draw from.
    pub fn from_network(
        network: &SurfaceWaterNetwork,
        grid: ModelGrid,
        params: &SfrParams,
    ) -> Result<Self> {
        if !(params.reach_include_fraction >= 0.0) || !params.reach_include_fraction.is_finite() {
            return Err(Error::InvalidParameter {
                name: "reach_include_fraction",
                value: params.reach_include_fraction.to_string(),
                reason: "must be zero or positive".into(),
            });
        }
        if let (Some(a), Some(b)) = (network.crs(), grid.crs.as_ref()) {
            if !a.is_equivalent(b) {
                return Err(Error::CrsMismatch(a.to_string(), b.to_string()));
            }
        }
        let extent = grid.extent();
        let covered = network.segments().iter().all(|s| {
            let (min_x, min_y, max_x, max_y) = line_bbox(&s.geometry);
            extent.contains(min_x, min_y) && extent.contains(max_x, max_y)
        });
        if !covered {
            return Err(Error::InvalidGeometry(
                "modelgrid extent does not cover segments extent".into(),
            ));
        }

        let freeze = params.ibound_action == IboundAction::Freeze;
        let threshold = params.reach_include_fraction * (grid.delr * grid.delc).sqrt();
        let mut cells = Vec::new();
        for row in 0..grid.nrow {
            for col in 0..grid.ncol {
                if !freeze || threshold > 0.0 || grid.is_active(row, col) {
                    cells.push((row, col));
                }
            }
        }
        let sindex = SpatialIndex::new(
            cells
                .iter()
                .map(|&(r, c)| {
                    let rect = grid.cell_rect(r, c);
                    (rect.min_x, rect.min_y, rect.max_x, rect.max_y)
                })
                .collect(),
        );
        debug!("indexed {} of {} grid cells", cells.len(), grid.nrow * grid.ncol);

        let pieces: Vec<Vec<Piece>> = network
            .segments()
            .into_par_iter()
            .map(|seg| {
                let mut found: Vec<Piece> = sindex
                    .intersecting_bbox(line_bbox(&seg.geometry))
                    .into_iter()
                    .flat_map(|ci| {
                        let (row, col) = cells[ci];
                        clip_line_to_rect(&seg.geometry, &grid.cell_rect(row, col))
                            .into_iter()
                            .map(move |(start, line)| Piece { start, row, col, line })
                    })
                    .collect();
                found.sort_by(|a, b| a.start.total_cmp(&b.start));
                if freeze {
                    settle_inactive(found, &grid, threshold)
                } else {
                    Ok(found)
                }
            })
            .collect::<Result<_>>()?;

        let mut order: Vec<usize> = (0..network.len()).collect();
        order.sort_by_key(|&p| network.segments()[p].sequence);

        let prev = grid.ibound.clone();
        let mut grid = grid;
        let mut ibound_modified = 0;
        let mut reaches = Vec::new();
        let mut iseg = 0;
        for pos in order {
            let seg_pieces = &pieces[pos];
            if seg_pieces.is_empty() {
                continue;
            }
            iseg += 1;
            for (n, piece) in seg_pieces.iter().enumerate() {
                let cell = [piece.row, piece.col];
                if grid.ibound[cell] == 0 {
                    grid.ibound[cell] = 1;
                    ibound_modified += 1;
                }
                let length = piece.line.length();
                reaches.push(Reach {
                    reachid: reaches.len() + 1,
                    segnum: network.segments()[pos].segnum,
                    iseg,
                    ireach: n + 1,
                    k: 0,
                    i: piece.row,
                    j: piece.col,
                    rchlen: if length == 0.0 { 1.0 } else { length },
                    dist: piece.start,
                    prev_ibound: prev[cell],
                    divid: None,
                    geometry: piece.line.clone(),
                    slope: None,
                    zcoord_avg: None,
                    strtop: None,
                    strthick: None,
                    strhc1: None,
                });
            }
        }
        if reaches.is_empty() {
            return Err(Error::Algorithm("no segments intersect active grid cells".into()));
        }
        if ibound_modified > 0 {
            warn!("modified ibound of {} cells to fit streams", ibound_modified);
        }
        info!("created {} reaches over {} segments", reaches.len(), iseg);

        let mut outside = Vec::new();
        for div in network.diversions().unwrap_or_default() {
            let Some(last) = reaches.iter().rev().find(|r| !r.is_diversion() && r.segnum == div.from_segnum)
            else {
                outside.push(div.divid);
                continue;
            };
            iseg += 1;
            let reach = Reach {
                reachid: reaches.len() + 1,
                segnum: network.end_segnum(),
                iseg,
                ireach: 1,
                rchlen: 1.0,
                dist: 0.0,
                divid: Some(div.divid),
                geometry: end_point_line(&last.geometry)?,
                slope: None,
                zcoord_avg: None,
                strtop: None,
                strthick: None,
                strhc1: None,
                ..last.clone()
            };
            reaches.push(reach);
        }
        if !outside.is_empty() {
            warn!(
                "{} diversions draw from segments outside the model: {}",
                outside.len(),
                abbr_str(&outside, 4)
            );
        }

        Ok(Self {
            network: network.clone(),
            grid,
            reaches,
            segment_data: None,
            ibound_modified,
            min_slope: params.min_slope,
        })
    }

    pub fn network(&self) -> &SurfaceWaterNetwork {
        &self.network
    }

    /// Model grid, with any ibound modification
    pub fn grid(&self) -> &ModelGrid {
        &self.grid
    }

    pub fn reaches(&self) -> &[Reach] {
        &self.reaches
    }

    pub fn segment_data(&self) -> Option<&[SegmentData]> {
        self.segment_data.as_deref()
    }

    /// Number of inactive cells made active
    pub fn ibound_modified(&self) -> usize {
        self.ibound_modified
    }

    /// `nseg` of each network segnum with reaches
    fn segnum_to_nseg(&self) -> HashMap<i64, usize> {
        self.reaches
            .iter()
            .filter(|r| !r.is_diversion())
            .map(|r| (r.segnum, r.iseg))
            .collect()
    }

    /// Create segment data with `nseg`, `segnum` and `outseg` evaluated.
    ///
    /// Diversion rows also get `divid`, and `iupseg` set to the `nseg` they
    /// draw from; their `outseg` is 0.
    pub fn new_segment_data(&mut self) {
        if self.segment_data.is_some() {
            warn!("resetting segment_data");
        } else {
            info!("creating new segment_data");
        }
        let nseg_of = self.segnum_to_nseg();
        let from_segnum: HashMap<i64, i64> = self
            .network
            .diversions()
            .unwrap_or_default()
            .iter()
            .map(|d| (d.divid, d.from_segnum))
            .collect();
        let mut data: Vec<SegmentData> = Vec::new();
        for reach in &self.reaches {
            if data.last().map_or(false, |d| d.nseg == reach.iseg) {
                continue;
            }
            let sd = match reach.divid {
                Some(divid) => {
                    let mut sd = SegmentData::new(reach.iseg, reach.segnum, 0);
                    sd.divid = Some(divid);
                    sd.iupseg = from_segnum
                        .get(&divid)
                        .and_then(|s| nseg_of.get(s).copied())
                        .unwrap_or(0);
                    sd
                }
                None => {
                    let outseg = self
                        .network
                        .segment(reach.segnum)
                        .and_then(|s| nseg_of.get(&s.to_segnum).copied())
                        .unwrap_or(0);
                    SegmentData::new(reach.iseg, reach.segnum, outseg)
                }
            };
            data.push(sd);
        }
        self.segment_data = Some(data);
    }

    /// Evaluate reach slopes, at least `min_slope`.
    ///
    /// With Z coordinates, each reach's slope is the drop along its line,
    /// and `zcoord_avg` is set. Otherwise slopes come from the grid top
    /// between the centres of each reach and the next one downstream.
    pub fn set_reach_slope(&mut self, min_slope: f64) -> Result<()> {
        if !(min_slope > 0.0) {
            return Err(Error::InvalidParameter {
                name: "min_slope",
                value: min_slope.to_string(),
                reason: "min_slope must be greater than zero".into(),
            });
        }
        if self.network.has_z() {
            debug!("evaluating reach slope from Z coordinates");
            for reach in &mut self.reaches {
                let z = reach.geometry.z().unwrap_or_default();
                if let (Some(first), Some(last)) = (z.first(), z.last()) {
                    let slope = (first - last) / reach.rchlen;
                    reach.slope = Some(if slope >= min_slope { slope } else { min_slope });
                    reach.zcoord_avg = Some(z.iter().sum::<f64>() / z.len() as f64);
                }
            }
            return Ok(());
        }

        debug!("evaluating reach slope from grid top");
        let first_reach: HashMap<i64, usize> = self
            .reaches
            .iter()
            .enumerate()
            .filter(|(_, r)| r.ireach == 1 && !r.is_diversion())
            .map(|(n, r)| (r.segnum, n))
            .collect();
        let slopes: Vec<f64> = (0..self.reaches.len())
            .map(|n| {
                let reach = &self.reaches[n];
                let next = match self.reaches.get(n + 1) {
                    Some(r) if r.iseg == reach.iseg => Some(n + 1),
                    _ if reach.is_diversion() => None,
                    _ => self
                        .network
                        .segment(reach.segnum)
                        .and_then(|s| first_reach.get(&s.to_segnum).copied()),
                };
                let slope = next.map_or(min_slope, |m| {
                    let down = &self.reaches[m];
                    let drop = self.grid.top[[reach.i, reach.j]] - self.grid.top[[down.i, down.j]];
                    drop / ((reach.rchlen + down.rchlen) / 2.0)
                });
                if slope >= min_slope {
                    slope
                } else {
                    min_slope
                }
            })
            .collect();
        for (reach, slope) in self.reaches.iter_mut().zip(slopes) {
            reach.slope = Some(slope);
        }
        Ok(())
    }

    /// Fill segment data and reach streambed properties.
    ///
    /// Values at the downstream end of each segment come from the next
    /// segment downstream, except width, which is constant along each
    /// segment unless `width_out` is given. `elevup` and `elevdn` are the
    /// stream tops of the first and last reach, from the mean Z coordinate
    /// where available, otherwise from the grid top. Diversions use
    /// `icalc = 0` with unit thickness and depth.
    pub fn default_segment_data(&mut self, params: &SegmentDataParams) -> Result<()> {
        info!("default_segment_data: using high-level function");
        if self.segment_data.is_none() {
            self.new_segment_data();
        }
        if self.reaches.iter().any(|r| r.slope.is_none()) {
            info!("default_segment_data: 'slope' not yet evaluated, setting with set_reach_slope()");
            self.set_reach_slope(self.min_slope)?;
        }

        let width1 = match &params.width1 {
            Some(w) => w.clone(),
            None => {
                let widths: Option<Vec<f64>> =
                    self.network.segments().iter().map(|s| s.width).collect();
                match widths {
                    Some(w) => {
                        let lo = w.iter().copied().fold(f64::INFINITY, f64::min);
                        let hi = w.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                        info!(
                            "default_segment_data: 'width' taken from segments, with range {:.3} to {:.3}",
                            lo, hi
                        );
                        SegmentValues::List(w)
                    }
                    None => {
                        info!("default_segment_data: 'width' not found in segments; using default 10");
                        SegmentValues::Scalar(10.0)
                    }
                }
            }
        };

        let net = &self.network;
        let hcond =
            net.pair_segments_frame(&params.hyd_cond1, params.hyd_cond_out.as_ref(), PairMethod::Continuous)?;
        let thick = net.pair_segments_frame(
            &params.thickness1,
            params.thickness_out.as_ref(),
            PairMethod::Continuous,
        )?;
        let width = net.pair_segments_frame(&width1, params.width_out.as_ref(), PairMethod::Constant)?;
        let roughch = net.segments_series(&params.roughch)?;
        let position: HashMap<i64, usize> =
            net.segments().iter().enumerate().map(|(i, s)| (s.segnum, i)).collect();

        for reach in &mut self.reaches {
            reach.strtop = Some(reach.zcoord_avg.unwrap_or(self.grid.top[[reach.i, reach.j]]));
            if reach.is_diversion() {
                continue;
            }
            let Some(&p) = position.get(&reach.segnum) else {
                continue;
            };
            let length = net.segments()[p].geometry.length();
            let frac = if length > 0.0 {
                ((reach.dist + reach.rchlen / 2.0) / length).clamp(0.0, 1.0)
            } else {
                0.0
            };
            reach.strthick = Some(interp(thick[p].0, thick[p].1, frac, false));
            reach.strhc1 = Some(interp(hcond[p].0, hcond[p].1, frac, true));
        }

        let reaches = &self.reaches;
        if let Some(data) = self.segment_data.as_mut() {
            for sd in data.iter_mut() {
                let mut seg_reaches = reaches.iter().filter(|r| r.iseg == sd.nseg);
                let first = seg_reaches.next();
                let last = seg_reaches.last().or(first);
                sd.elevup = first.and_then(|r| r.strtop).unwrap_or(0.0);
                sd.elevdn = last.and_then(|r| r.strtop).unwrap_or(0.0);
                if sd.is_diversion() {
                    sd.icalc = 0;
                    (sd.thickm1, sd.thickm2) = (1.0, 1.0);
                    (sd.depth1, sd.depth2) = (1.0, 1.0);
                    continue;
                }
                let Some(&p) = position.get(&sd.segnum) else {
                    continue;
                };
                sd.icalc = 1;
                sd.roughch = roughch[p];
                (sd.hcond1, sd.hcond2) = hcond[p];
                (sd.thickm1, sd.thickm2) = thick[p];
                (sd.width1, sd.width2) = width[p];
            }
        }
        Ok(())
    }
}

impl fmt::Display for SfrNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<SfrNetwork: {} rows, {} columns", self.grid.nrow, self.grid.ncol)?;
        let ids: Vec<usize> = self.reaches.iter().map(|r| r.reachid).collect();
        write!(f, "  {} in reaches (reachid): {}", ids.len(), abbr_str(&ids, 4))?;
        let Some(data) = &self.segment_data else {
            return write!(f, "\n  segment_data not set />");
        };
        let nsegs: Vec<usize> = data.iter().map(|d| d.nseg).collect();
        writeln!(f)?;
        writeln!(f, "  {} in segment_data (nseg): {}", nsegs.len(), abbr_str(&nsegs, 4))?;
        let segnums: Vec<i64> = data.iter().filter(|d| !d.is_diversion()).map(|d| d.segnum).collect();
        write!(f, "    {} from segments", segnums.len())?;
        if segnums.len() != self.network.len() {
            let used = segnums.len() as f64 / self.network.len() as f64;
            write!(f, " ({:.0}% used)", used * 100.0)?;
        }
        write!(f, ": {}", abbr_str(&segnums, 4))?;
        let divids: Vec<i64> = data.iter().filter_map(|d| d.divid).collect();
        if let (false, Some(all)) = (divids.is_empty(), self.network.diversions()) {
            write!(f, "\n    {} from diversions", divids.len())?;
            if divids.len() != all.len() {
                let used = divids.len() as f64 / all.len() as f64;
                write!(f, " ({:.0}% used)", used * 100.0)?;
            }
            write!(f, ": {}", abbr_str(&divids, 4))?;
        }
        write!(f, " />")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::fixtures::*;
    use crate::network::DiversionInput;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};
    use swn_core::CRS;

    fn grid() -> ModelGrid {
        ModelGrid::new(3, 2, 20.0, 20.0, 30.0, 70.0)
            .unwrap()
            .with_top(array![[15.0, 15.0], [14.0, 14.0], [13.0, 13.0]])
            .unwrap()
    }

    fn col<T>(sfr: &SfrNetwork, f: impl Fn(&Reach) -> T) -> Vec<T> {
        sfr.reaches().iter().map(f).collect()
    }

    fn assert_close(actual: &[f64], expected: &[f64], eps: f64) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert_relative_eq!(*a, *e, epsilon = eps);
        }
    }

    #[test]
    fn test_reaches() {
        let sfr = SfrNetwork::from_network(&valid_n(), grid(), &SfrParams::default()).unwrap();
        assert_eq!(col(&sfr, |r| r.reachid), vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(col(&sfr, |r| r.segnum), vec![1, 1, 1, 2, 2, 0, 0]);
        assert_eq!(col(&sfr, |r| r.iseg), vec![1, 1, 1, 2, 2, 3, 3]);
        assert_eq!(col(&sfr, |r| r.ireach), vec![1, 2, 3, 1, 2, 1, 2]);
        assert_eq!(col(&sfr, |r| r.i), vec![0, 0, 1, 0, 1, 1, 2]);
        assert_eq!(col(&sfr, |r| r.j), vec![0, 1, 1, 1, 1, 1, 1]);
        assert_close(
            &col(&sfr, |r| r.rchlen),
            &[18.027756, 6.009252, 12.018504, 21.081851, 10.540926, 10.0, 10.0],
            1e-6,
        );
        assert_eq!(sfr.ibound_modified(), 0);
        assert_eq!(
            sfr.to_string(),
            "<SfrNetwork: 3 rows, 2 columns\n\
             \x20 7 in reaches (reachid): [1, 2, ..., 6, 7]\n\
             \x20 segment_data not set />"
        );
    }

    #[test]
    fn test_reaches_freeze_and_modify() {
        let mut ibound = Array2::ones((3, 2));
        ibound[[0, 0]] = 0;
        let g = grid().with_ibound(ibound).unwrap();

        let frozen = SfrNetwork::from_network(&valid_n(), g.clone(), &SfrParams::default()).unwrap();
        assert_eq!(frozen.reaches().len(), 6);
        assert_eq!(col(&frozen, |r| r.ireach)[..2], [1, 2]);
        assert_relative_eq!(frozen.reaches()[0].dist, 18.027756, epsilon = 1e-6);
        assert_eq!(frozen.grid().ibound[[0, 0]], 0);

        let params = SfrParams { ibound_action: IboundAction::Modify, ..Default::default() };
        let modified = SfrNetwork::from_network(&valid_n(), g, &params).unwrap();
        assert_eq!(modified.reaches().len(), 7);
        assert_eq!(modified.ibound_modified(), 1);
        assert_eq!(modified.grid().ibound[[0, 0]], 1);
        assert_eq!(modified.reaches()[0].prev_ibound, 0);
        assert_eq!(modified.reaches()[1].prev_ibound, 1);
    }

    #[test]
    fn test_extent_not_covered() {
        let g = ModelGrid::new(3, 2, 20.0, 20.0, 45.0, 70.0).unwrap();
        let err = SfrNetwork::from_network(&valid_n(), g, &SfrParams::default()).unwrap_err();
        assert!(err.to_string().contains("modelgrid extent does not cover segments extent"));
    }

    #[test]
    fn test_crs_mismatch() {
        let mut n = valid_n();
        n.set_crs(Some(CRS::from_epsg(2193)));
        let mut g = grid();
        g.crs = Some(CRS::parse("+init=epsg:2193").unwrap());
        assert!(SfrNetwork::from_network(&n, g.clone(), &SfrParams::default()).is_ok());
        g.crs = Some(CRS::from_epsg(27200));
        let err = SfrNetwork::from_network(&n, g, &SfrParams::default()).unwrap_err();
        assert_eq!(err.to_string(), "CRS mismatch: EPSG:2193 vs EPSG:27200");
    }

    #[test]
    fn test_new_segment_data() {
        let mut sfr = SfrNetwork::from_network(&valid_n(), grid(), &SfrParams::default()).unwrap();
        sfr.new_segment_data();
        let data = sfr.segment_data().unwrap();
        assert_eq!(data.iter().map(|d| d.nseg).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(data.iter().map(|d| d.segnum).collect::<Vec<_>>(), vec![1, 2, 0]);
        assert_eq!(data.iter().map(|d| d.outseg).collect::<Vec<_>>(), vec![3, 3, 0]);
        assert!(data.iter().all(|d| d.iupseg == 0));
        assert!(sfr.to_string().ends_with(
            "  3 in segment_data (nseg): [1, 2, 3]\n    3 from segments: [1, 2, 0] />"
        ));
    }

    #[test]
    fn test_reach_slope_from_z() {
        let mut sfr = SfrNetwork::from_network(&valid_n(), grid(), &SfrParams::default()).unwrap();
        sfr.set_reach_slope(1e-4).unwrap();
        let s1 = 1.0 / 1300f64.sqrt();
        let s2 = 1.0 / 1000f64.sqrt();
        assert_close(
            &col(&sfr, |r| r.slope.unwrap()),
            &[s1, s1, s1, s2, s2, 0.1, 0.1],
            1e-9,
        );
        assert_close(&col(&sfr, |r| r.zcoord_avg.unwrap())[5..], &[13.5, 12.5], 1e-9);
        assert!(sfr.set_reach_slope(0.0).is_err());
    }

    #[test]
    fn test_reach_slope_from_top() {
        let lines: Vec<_> = lines(&VALID_LINES)
            .into_iter()
            .map(|(s, l)| (s, l.force_2d()))
            .collect();
        let n = SurfaceWaterNetwork::from_lines(lines, None).unwrap();
        let mut sfr = SfrNetwork::from_network(&n, grid(), &SfrParams::default()).unwrap();
        sfr.set_reach_slope(1e-4).unwrap();
        let slopes = col(&sfr, |r| r.slope.unwrap());
        // same top in the first two cells, then a drop of 1
        assert_relative_eq!(slopes[0], 1e-4);
        assert_relative_eq!(slopes[1], 1.0 / ((6.009252 + 12.018504) / 2.0), epsilon = 1e-6);
        assert_relative_eq!(slopes[5], 0.1);
        assert_relative_eq!(slopes[6], 1e-4);
        assert!(sfr.reaches().iter().all(|r| r.zcoord_avg.is_none()));
    }

    #[test]
    fn test_default_segment_data() {
        let mut sfr =
            SfrNetwork::from_network(&valid_n_polygons(), grid(), &SfrParams::default()).unwrap();
        sfr.default_segment_data(&SegmentDataParams::default()).unwrap();
        let data = sfr.segment_data().unwrap();
        assert!(data.iter().all(|d| d.icalc == 1 && d.roughch == 0.024));
        assert!(data.iter().all(|d| d.hcond1 == 1.0 && d.thickm2 == 1.0));
        let width1: Vec<f64> = data.iter().map(|d| d.width1).collect();
        assert_close(&width1, &[1.4457, 1.4397, 1.4615], 1e-4);
        assert!(data.iter().all(|d| d.width1 == d.width2));
        assert_relative_eq!(data[0].elevup, 14.75, epsilon = 1e-9);
        assert_relative_eq!(data[2].elevdn, 12.5, epsilon = 1e-9);
        assert!(sfr.reaches().iter().all(|r| r.strtop.is_some() && r.strhc1 == Some(1.0)));
    }

    #[test]
    fn test_default_segment_data_without_width() {
        let mut sfr = SfrNetwork::from_network(&valid_n(), grid(), &SfrParams::default()).unwrap();
        let params = SegmentDataParams {
            hyd_cond1: SegmentValues::List(vec![2.0, 4.0, 8.0]),
            hyd_cond_out: Some(SegmentValues::Scalar(1.0)),
            ..Default::default()
        };
        sfr.default_segment_data(&params).unwrap();
        let data = sfr.segment_data().unwrap();
        assert!(data.iter().all(|d| d.width1 == 10.0));
        // nseg 1 is segnum 1, draining to segnum 0
        assert_eq!((data[0].hcond1, data[0].hcond2), (4.0, 2.0));
        assert_eq!((data[2].hcond1, data[2].hcond2), (2.0, 1.0));
        let strhc1 = sfr.reaches()[5].strhc1.unwrap();
        assert!(strhc1 < 2.0 && strhc1 > 1.0);
    }

    #[test]
    fn test_reach_include_fraction() {
        let mut ibound = Array2::ones((3, 2));
        ibound[[0, 0]] = 0;
        let g = grid().with_ibound(ibound).unwrap();
        // the piece in cell (0, 0) reaches 10 from cell (0, 1)
        let params = SfrParams { reach_include_fraction: 0.6, ..Default::default() };
        let sfr = SfrNetwork::from_network(&valid_n(), g.clone(), &params).unwrap();
        assert_eq!(sfr.reaches().len(), 6);
        let first = &sfr.reaches()[0];
        assert_eq!((first.i, first.j, first.ireach), (0, 1, 1));
        assert_eq!(first.dist, 0.0);
        assert_relative_eq!(first.rchlen, 24.037008, epsilon = 1e-6);
        assert_eq!(sfr.grid().ibound[[0, 0]], 0);

        let params = SfrParams { reach_include_fraction: -0.1, ..Default::default() };
        assert!(SfrNetwork::from_network(&valid_n(), g, &params).is_err());
    }

    fn valid_n_diversions() -> SurfaceWaterNetwork {
        let mut n = valid_n();
        let inputs = vec![
            DiversionInput { divid: 10, point: None, from_segnum: Some(1) },
            DiversionInput { divid: 11, point: None, from_segnum: Some(0) },
        ];
        n.set_diversions(Some(inputs), 0).unwrap();
        n
    }

    #[test]
    fn test_diversion_reaches() {
        let mut sfr = SfrNetwork::from_network(&valid_n_diversions(), grid(), &SfrParams::default()).unwrap();
        assert_eq!(sfr.reaches().len(), 9);
        let divs = &sfr.reaches()[7..];
        assert_eq!(divs.iter().map(|r| r.iseg).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(divs.iter().map(|r| (r.i, r.j)).collect::<Vec<_>>(), vec![(1, 1), (2, 1)]);
        assert_eq!(divs.iter().map(|r| r.divid).collect::<Vec<_>>(), vec![Some(10), Some(11)]);
        assert!(divs.iter().all(|r| r.segnum == -1 && r.rchlen == 1.0 && r.ireach == 1));

        sfr.new_segment_data();
        let data = sfr.segment_data().unwrap();
        assert_eq!(data.iter().map(|d| d.nseg).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(data.iter().map(|d| d.segnum).collect::<Vec<_>>(), vec![1, 2, 0, -1, -1]);
        assert_eq!(data.iter().map(|d| d.iupseg).collect::<Vec<_>>(), vec![0, 0, 0, 1, 3]);
        assert_eq!(data.iter().map(|d| d.outseg).collect::<Vec<_>>(), vec![3, 3, 0, 0, 0]);
        assert!(sfr.to_string().ends_with(
            "  5 in segment_data (nseg): [1, 2, ..., 4, 5]\n\
             \x20   3 from segments: [1, 2, 0]\n\
             \x20   2 from diversions: [10, 11] />"
        ));
    }

    #[test]
    fn test_diversion_segment_data() {
        let mut sfr = SfrNetwork::from_network(&valid_n_diversions(), grid(), &SfrParams::default()).unwrap();
        sfr.default_segment_data(&SegmentDataParams::default()).unwrap();
        let data = sfr.segment_data().unwrap();
        assert!(data[..3].iter().all(|d| d.icalc == 1));
        let div = &data[3];
        assert_eq!(div.divid, Some(10));
        assert_eq!((div.icalc, div.thickm1, div.depth1, div.hcond1), (0, 1.0, 1.0, 0.0));
        assert_relative_eq!(div.elevup, 14.0, epsilon = 1e-9);
        assert_relative_eq!(data[4].elevup, 12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_diversion_outlet_slope_from_top() {
        let lines: Vec<_> = lines(&VALID_LINES)
            .into_iter()
            .map(|(s, l)| (s, l.force_2d()))
            .collect();
        let mut n = SurfaceWaterNetwork::from_lines(lines, None).unwrap();
        n.set_diversions(Some(vec![DiversionInput { divid: 3, point: None, from_segnum: Some(0) }]), 0)
            .unwrap();
        let mut sfr = SfrNetwork::from_network(&n, grid(), &SfrParams::default()).unwrap();
        sfr.set_reach_slope(1e-4).unwrap();
        // the outlet does not drain into the diversion reach after it
        assert_relative_eq!(sfr.reaches()[6].slope.unwrap(), 1e-4);
        assert_relative_eq!(sfr.reaches()[7].slope.unwrap(), 1e-4);
    }
}
