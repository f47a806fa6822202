//! Diversions: points where water is taken out of a segment

use super::SurfaceWaterNetwork;
use geo::{Closest, ClosestPoint};
use geo_types::{Coord, Point};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use swn_core::{Error, Result};
use tracing::{debug, info};

/// A diversion as given by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct DiversionInput {
    pub divid: i64,
    /// Location of the diversion; needed unless `from_segnum` is given
    pub point: Option<Point<f64>>,
    /// Segment the diversion draws from, if already known
    pub from_segnum: Option<i64>,
}

impl DiversionInput {
    pub fn at(divid: i64, x: f64, y: f64) -> Self {
        Self { divid, point: Some(Point::new(x, y)), from_segnum: None }
    }
}

/// A diversion matched to the segment it draws from
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diversion {
    pub divid: i64,
    #[serde(skip)]
    pub point: Option<Point<f64>>,
    pub from_segnum: i64,
    /// Distance from the point to the downstream end of `from_segnum`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dist_end: Option<f64>,
    /// Distance from the point to the line of `from_segnum`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dist_line: Option<f64>,
}

fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Angle in radians at `vertex` between `a` and `b`, from 0 to pi
fn angle_at(vertex: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> f64 {
    let (ax, ay) = (a.x - vertex.x, a.y - vertex.y);
    let (bx, by) = (b.x - vertex.x, b.y - vertex.y);
    (ax * by - ay * bx).abs().atan2(ax * bx + ay * by)
}

impl SurfaceWaterNetwork {
    fn distance_to_line(&self, pos: usize, point: Point<f64>) -> f64 {
        match self.segments[pos].geometry.xy().closest_point(&point) {
            Closest::Intersection(_) => 0.0,
            Closest::SinglePoint(p) => distance(p.0, point.0),
            Closest::Indeterminate => f64::NAN,
        }
    }

    /// Segment position whose downstream end is nearest to `point`
    fn nearest_end(&self, point: Point<f64>, min_stream_order: u32) -> Option<usize> {
        let mut best: Option<(usize, f64, f64)> = None;
        for (pos, seg) in self.segments.iter().enumerate() {
            if seg.stream_order < min_stream_order {
                continue;
            }
            let coords = seg.geometry.coords();
            let end = coords[coords.len() - 1];
            let prev = coords[coords.len() - 2];
            let dist = distance(end, point.0);
            let angle = angle_at(end, prev, point.0);
            let better = match best {
                None => true,
                Some((_, best_dist, best_angle)) => {
                    let tol = 1e-9 * best_dist.max(1.0);
                    dist < best_dist - tol || ((dist - best_dist).abs() <= tol && angle < best_angle)
                }
            };
            if better {
                best = Some((pos, dist, angle));
            }
        }
        best.map(|(pos, _, _)| pos)
    }

    /// Set or remove diversions.
    ///
    /// A diversion with a point and no `from_segnum` draws from the segment
    /// with stream order of at least `min_stream_order` whose downstream
    /// end is nearest. Ties go to the segment whose last leg has the
    /// smaller angle to the point. Each segment's `diversions` is set to
    /// the divids drawing from it.
    pub fn set_diversions(
        &mut self,
        diversions: Option<Vec<DiversionInput>>,
        min_stream_order: u32,
    ) -> Result<()> {
        let Some(inputs) = diversions else {
            self.diversions = None;
            for seg in &mut self.segments {
                seg.diversions = None;
            }
            return Ok(());
        };

        let mut seen = HashSet::new();
        let dups: Vec<i64> = inputs.iter().map(|d| d.divid).filter(|d| !seen.insert(*d)).collect();
        if !dups.is_empty() {
            return Err(Error::InvalidParameter {
                name: "diversions",
                value: format!("{:?}", dups),
                reason: "diversion index must be unique".into(),
            });
        }
        let missing: Vec<i64> = inputs
            .iter()
            .filter_map(|d| d.from_segnum)
            .filter(|s| !self.contains(*s))
            .collect();
        if !missing.is_empty() {
            return Err(Self::not_found("from_segnum values", &missing));
        }
        if !inputs.iter().any(|d| d.from_segnum.is_none()) {
            debug!("using from_segnum of {} diversions", inputs.len());
        } else if !self.segments.iter().any(|s| s.stream_order >= min_stream_order) {
            return Err(Error::InvalidParameter {
                name: "min_stream_order",
                value: min_stream_order.to_string(),
                reason: "no segments have this stream order or higher".into(),
            });
        }

        let mut matched = Vec::with_capacity(inputs.len());
        for input in inputs {
            let pos = match (input.from_segnum, input.point) {
                (Some(segnum), _) => self.position(segnum),
                (None, Some(point)) => self.nearest_end(point, min_stream_order),
                (None, None) => {
                    return Err(Error::InvalidGeometry(format!(
                        "diversion {} needs a point or from_segnum",
                        input.divid
                    )))
                }
            };
            let Some(pos) = pos else {
                return Err(Self::not_found("diversions", &[input.divid]));
            };
            let (dist_end, dist_line) = match input.point {
                Some(point) => {
                    let end = self.segments[pos].geometry.coords().last().copied();
                    (
                        end.map(|c| distance(c, point.0)),
                        Some(self.distance_to_line(pos, point)),
                    )
                }
                None => (None, None),
            };
            matched.push(Diversion {
                divid: input.divid,
                point: input.point,
                from_segnum: self.segments[pos].segnum,
                dist_end,
                dist_line,
            });
        }

        for seg in &mut self.segments {
            let divids: BTreeSet<i64> = matched
                .iter()
                .filter(|d| d.from_segnum == seg.segnum)
                .map(|d| d.divid)
                .collect();
            seg.diversions = Some(divids);
        }
        info!("set {} diversions", matched.len());
        self.diversions = Some(matched);
        Ok(())
    }
}
