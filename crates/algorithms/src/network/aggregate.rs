//! Aggregate a network into coarser segments

use super::SurfaceWaterNetwork;
use geo::BooleanOps;
use geo_types::MultiPolygon;
use std::collections::HashSet;
use std::str::FromStr;
use swn_core::vector::LineStringZ;
use swn_core::{Error, Result};
use tracing::{debug, info};

/// Attribute used to choose the main path at a confluence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregateFollow {
    #[default]
    UpstreamLength,
    /// Needs catchment polygons
    UpstreamArea,
}

impl FromStr for AggregateFollow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upstream_length" => Ok(AggregateFollow::UpstreamLength),
            "upstream_area" => Ok(AggregateFollow::UpstreamArea),
            other => Err(Error::InvalidParameter {
                name: "follow",
                value: other.to_string(),
                reason: "follow must be one of upstream_length or upstream_area".into(),
            }),
        }
    }
}

/// Result of walking upstream from one aggregated segment
struct Walk {
    segnum: i64,
    path: Vec<i64>,
    unpath: Vec<i64>,
    patch: Vec<i64>,
    junctions: Vec<i64>,
}

impl SurfaceWaterNetwork {
    fn walk_aggregate(
        &self,
        segnum: i64,
        selected: &HashSet<i64>,
        blocked: &HashSet<i64>,
        follow: &[f64],
    ) -> Walk {
        let mut walk = Walk {
            segnum,
            path: vec![segnum],
            unpath: Vec::new(),
            patch: vec![segnum],
            junctions: Vec::new(),
        };
        let subtree = |u: i64| self.walk_upstream(&[u], &HashSet::new(), &mut HashSet::new());
        let value = |u: i64| self.position(u).map_or(f64::NEG_INFINITY, |i| follow[i]);

        let mut current = segnum;
        loop {
            let ups = self.upstream_of(current);
            if ups.is_empty() {
                break;
            }
            let blocked_ups: Vec<i64> = ups.iter().copied().filter(|u| blocked.contains(u)).collect();
            let next = match blocked_ups.as_slice() {
                [] => ups
                    .iter()
                    .copied()
                    .fold(None, |best: Option<i64>, u| match best {
                        Some(b) if value(b) >= value(u) => Some(b),
                        _ => Some(u),
                    }),
                [only] if !selected.contains(only) => Some(*only),
                _ => None,
            };
            let Some(next) = next else {
                // More than one branch holds selected segments
                walk.unpath.extend(&ups);
                let any_selected = ups.iter().any(|u| selected.contains(u));
                for &u in &ups {
                    if selected.contains(&u) {
                        continue;
                    }
                    if blocked.contains(&u) || any_selected {
                        walk.junctions.push(u);
                    } else {
                        walk.patch.extend(subtree(u));
                    }
                }
                break;
            };
            for &u in ups.iter().filter(|u| **u != next) {
                walk.unpath.push(u);
                walk.patch.extend(subtree(u));
            }
            walk.path.push(next);
            walk.patch.push(next);
            current = next;
        }
        walk
    }

    /// Aggregate the network to `segnums`.
    ///
    /// Each returned segment is one of `segnums` or a junction needed to
    /// keep the network connected, with a line merged along the upstream
    /// path that has the greater `follow` value. The `agg_path` attribute
    /// lists the merged segments from downstream to upstream, `agg_unpath`
    /// the branches left off the path and `agg_patch` all the segments
    /// represented. Catchments are unioned over each patch.
    pub fn aggregate(&self, segnums: &[i64], follow: AggregateFollow) -> Result<SurfaceWaterNetwork> {
        if segnums.is_empty() {
            return Err(Error::InvalidParameter {
                name: "segnums",
                value: "[]".into(),
                reason: "one or more segnums are required".into(),
            });
        }
        let missing: Vec<i64> = segnums.iter().copied().filter(|s| !self.contains(*s)).collect();
        if !missing.is_empty() {
            return Err(Self::not_found("segnums", &missing));
        }
        let follow: Vec<f64> = match follow {
            AggregateFollow::UpstreamLength => {
                self.segments.iter().map(|s| s.upstream_length).collect()
            }
            AggregateFollow::UpstreamArea => self
                .segments
                .iter()
                .map(|s| s.upstream_area)
                .collect::<Option<Vec<f64>>>()
                .ok_or_else(|| {
                    Error::Algorithm("'upstream_area' not found in segments.columns".into())
                })?,
        };

        let mut order: Vec<i64> = Vec::with_capacity(segnums.len());
        for &s in segnums {
            if !order.contains(&s) {
                order.push(s);
            }
        }
        let selected: HashSet<i64> = order.iter().copied().collect();
        let mut blocked: HashSet<i64> = HashSet::new();
        for i in self.sequence_order() {
            let segnum = self.segments[i].segnum;
            if selected.contains(&segnum)
                || self.upstream_of(segnum).iter().any(|u| blocked.contains(u))
            {
                blocked.insert(segnum);
            }
        }

        // Depth-first: junctions are walked right after the walk that found them
        let mut walks: Vec<Walk> = Vec::new();
        let mut stack: Vec<i64> = order.iter().rev().copied().collect();
        while let Some(segnum) = stack.pop() {
            let walk = self.walk_aggregate(segnum, &selected, &blocked, &follow);
            debug!("aggregated segment {} along {:?}", segnum, walk.path);
            stack.extend(walk.junctions.iter().rev());
            walks.push(walk);
        }

        let mut lines = Vec::with_capacity(walks.len());
        for walk in &walks {
            let parts: Vec<&LineStringZ> = walk
                .path
                .iter()
                .rev()
                .filter_map(|s| self.segment(*s))
                .map(|s| &s.geometry)
                .collect();
            lines.push((walk.segnum, LineStringZ::concat(&parts)?));
        }
        let polygons = self.catchments.as_ref().map(|catchments| {
            walks
                .iter()
                .map(|walk| {
                    walk.patch
                        .iter()
                        .filter_map(|s| self.position(*s))
                        .map(|i| &catchments[i])
                        .fold(None, |acc: Option<MultiPolygon<f64>>, p| match acc {
                            None => Some(p.clone()),
                            Some(acc) => Some(acc.union(p)),
                        })
                        .unwrap_or_else(|| MultiPolygon::new(Vec::new()))
                })
                .collect::<Vec<_>>()
        });

        let mut agg = SurfaceWaterNetwork::from_lines(lines, polygons)?;
        agg.crs = self.crs.clone();
        for (seg, walk) in agg.segments.iter_mut().zip(walks) {
            seg.agg_patch = Some(walk.patch);
            seg.agg_path = Some(walk.path);
            seg.agg_unpath = Some(walk.unpath);
        }
        info!("aggregated {} segments to {}", self.len(), agg.len());
        Ok(agg)
    }
}
