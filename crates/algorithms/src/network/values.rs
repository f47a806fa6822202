//! Per-segment values: broadcasting, accumulation and pairing
//!
//! Also catchment areas and the channel width estimate that depends on them.

use super::{SurfaceWaterNetwork, WidthParams};
use geo::Area;
use geo_types::MultiPolygon;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use swn_core::{Error, Result};
use tracing::debug;

/// A value for every segment, given in one of three forms
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentValues<T> {
    /// Same value for all segments
    Scalar(T),
    /// One value per segment, in segment order
    List(Vec<T>),
    /// Values keyed by segnum
    Map(BTreeMap<i64, T>),
}

impl From<f64> for SegmentValues<f64> {
    fn from(value: f64) -> Self {
        SegmentValues::Scalar(value)
    }
}

impl<T> From<Vec<T>> for SegmentValues<T> {
    fn from(values: Vec<T>) -> Self {
        SegmentValues::List(values)
    }
}

impl<T> From<BTreeMap<i64, T>> for SegmentValues<T> {
    fn from(values: BTreeMap<i64, T>) -> Self {
        SegmentValues::Map(values)
    }
}

/// How the downstream value of a segment pair is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairMethod {
    /// Value of the downstream segment
    #[default]
    Continuous,
    /// Same value as the upstream end
    Constant,
    /// Downstream value split between its upstream segments, in
    /// proportion to their own values
    Additive,
}

impl FromStr for PairMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "continuous" => Ok(PairMethod::Continuous),
            "constant" => Ok(PairMethod::Constant),
            "additive" => Ok(PairMethod::Additive),
            other => Err(Error::InvalidParameter {
                name: "method",
                value: other.to_string(),
                reason: "method must be one of continuous, constant or additive".into(),
            }),
        }
    }
}

impl fmt::Display for PairMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PairMethod::Continuous => "continuous",
            PairMethod::Constant => "constant",
            PairMethod::Additive => "additive",
        };
        f.write_str(name)
    }
}

fn index_differs(name: &'static str, value: String) -> Error {
    Error::InvalidParameter {
        name,
        value,
        reason: "index is different than for segments".into(),
    }
}

impl SurfaceWaterNetwork {
    /// Expand `value` into one value per segment, in segment order.
    ///
    /// A list must have one item per segment, and a map must have exactly
    /// the segment numbers as keys.
    pub fn segments_series<T: Clone>(&self, value: &SegmentValues<T>) -> Result<Vec<T>> {
        match value {
            SegmentValues::Scalar(v) => Ok(vec![v.clone(); self.len()]),
            SegmentValues::List(vs) => {
                if vs.len() != self.len() {
                    return Err(index_differs("value", format!("{} items", vs.len())));
                }
                Ok(vs.clone())
            }
            SegmentValues::Map(map) => {
                if map.len() != self.len() {
                    return Err(index_differs("value", format!("{} keys", map.len())));
                }
                self.segments
                    .iter()
                    .map(|s| {
                        map.get(&s.segnum)
                            .cloned()
                            .ok_or_else(|| index_differs("value", format!("missing key {}", s.segnum)))
                    })
                    .collect()
            }
        }
    }

    /// Sum `values` (aligned with segments) downstream in sequence order
    pub(super) fn accumulate(&self, values: Vec<f64>) -> Vec<f64> {
        let mut accum = values;
        for i in self.sequence_order() {
            let segnum = self.segments[i].segnum;
            let upstream: f64 = self
                .upstream_of(segnum)
                .into_iter()
                .filter_map(|u| self.position(u))
                .map(|j| accum[j])
                .sum();
            accum[i] += upstream;
        }
        accum
    }

    /// Accumulate values down the network.
    ///
    /// `values` must be keyed by every segnum, in segment order. Returns the
    /// accumulated value for each segment.
    pub fn accumulate_values(&self, values: &[(i64, f64)]) -> Result<Vec<f64>> {
        let same = values.len() == self.len()
            && values.iter().zip(&self.segments).all(|((k, _), s)| *k == s.segnum);
        if !same {
            return Err(Error::InvalidParameter {
                name: "values",
                value: format!("{} items", values.len()),
                reason: "index is different".into(),
            });
        }
        Ok(self.accumulate(values.iter().map(|(_, v)| *v).collect()))
    }

    /// Pair each segment's value at its upstream end with a value at its
    /// downstream end.
    ///
    /// Outlets take their own value downstream, unless `value_out` gives
    /// one: a scalar applies to all outlets, a map to the listed segments.
    pub fn pair_segments_frame(
        &self,
        value: &SegmentValues<f64>,
        value_out: Option<&SegmentValues<f64>>,
        method: PairMethod,
    ) -> Result<Vec<(f64, f64)>> {
        let value1 = self.segments_series(value)?;
        let of = |segnum: i64| self.position(segnum).map(|j| value1[j]);

        let mut value2: Vec<f64> = self
            .segments
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let Some(down) = of(s.to_segnum) else {
                    return value1[i];
                };
                match method {
                    PairMethod::Continuous => down,
                    PairMethod::Constant => value1[i],
                    PairMethod::Additive => {
                        let siblings = self.upstream_of(s.to_segnum);
                        let total: f64 = siblings.iter().filter_map(|u| of(*u)).sum();
                        if total == 0.0 {
                            down / siblings.len().max(1) as f64
                        } else {
                            down * value1[i] / total
                        }
                    }
                }
            })
            .collect();

        match value_out {
            None => {}
            Some(SegmentValues::Scalar(v)) => {
                for (i, s) in self.segments.iter().enumerate() {
                    if s.to_segnum == self.end_segnum {
                        value2[i] = *v;
                    }
                }
            }
            Some(SegmentValues::Map(map)) => {
                let missing: Vec<i64> = map.keys().copied().filter(|k| !self.contains(*k)).collect();
                if !missing.is_empty() {
                    return Err(Error::InvalidParameter {
                        name: "value_out",
                        value: format!("{:?}", missing),
                        reason: "value_out.index is not a subset of segments.index".into(),
                    });
                }
                for (segnum, v) in map {
                    if let Some(i) = self.position(*segnum) {
                        value2[i] = *v;
                    }
                }
            }
            Some(SegmentValues::List(vs)) => {
                return Err(Error::InvalidParameter {
                    name: "value_out",
                    value: format!("{} items", vs.len()),
                    reason: "expected value_out to be scalar or keyed by segnum".into(),
                })
            }
        }
        Ok(value1.into_iter().zip(value2).collect())
    }

    /// Set, replace or remove catchment polygons.
    ///
    /// Polygons are aligned with segments. Setting them evaluates
    /// `upstream_area` and `width`; removing them clears both.
    pub fn set_catchments(&mut self, polygons: Option<Vec<MultiPolygon<f64>>>) -> Result<()> {
        match polygons {
            None => {
                self.catchments = None;
                for seg in &mut self.segments {
                    seg.upstream_area = None;
                    seg.width = None;
                }
                Ok(())
            }
            Some(polygons) => {
                if polygons.len() != self.len() {
                    return Err(Error::InvalidParameter {
                        name: "catchments",
                        value: format!("{} polygons", polygons.len()),
                        reason: "catchments.index is different than for segments".into(),
                    });
                }
                self.catchments = Some(polygons);
                self.evaluate_upstream_area()?;
                self.estimate_width(&WidthParams::default())
            }
        }
    }

    /// Re-evaluate `upstream_area` from catchment polygons of the present
    /// segments
    pub fn evaluate_upstream_area(&mut self) -> Result<()> {
        debug!("evaluating upstream area");
        let areas: Vec<f64> = self
            .catchments
            .as_ref()
            .ok_or_else(|| Error::Algorithm("network has no catchment polygons".into()))?
            .iter()
            .map(|p| p.unsigned_area())
            .collect();
        let accum = self.accumulate(areas);
        for (seg, value) in self.segments.iter_mut().zip(accum) {
            seg.upstream_area = Some(value);
        }
        Ok(())
    }

    /// Estimate channel width as `a + (upstream_area / 1e6) ^ b`, with area
    /// in square metres
    pub fn estimate_width(&mut self, params: &WidthParams) -> Result<()> {
        let area = match &params.upstream_area {
            Some(v) => self.segments_series(v)?,
            None => self
                .segments
                .iter()
                .map(|s| s.upstream_area)
                .collect::<Option<Vec<f64>>>()
                .ok_or_else(|| {
                    Error::Algorithm("'upstream_area' not found in segments.columns".into())
                })?,
        };
        let a = self.segments_series(&params.a)?;
        let b = self.segments_series(&params.b)?;
        for (i, seg) in self.segments.iter_mut().enumerate() {
            seg.width = Some(a[i] + (area[i] / 1e6).powf(b[i]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use approx::assert_relative_eq;

    fn widths(n: &SurfaceWaterNetwork) -> Vec<f64> {
        n.segments().iter().map(|s| s.width.unwrap()).collect()
    }

    fn assert_close(actual: &[f64], expected: &[f64], eps: f64) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert_relative_eq!(*a, *e, epsilon = eps);
        }
    }

    #[test]
    fn test_accumulate_values() {
        let n = valid_n();
        let accum = n.accumulate_values(&[(0, 2.0), (1, 3.0), (2, 4.0)]).unwrap();
        assert_eq!(accum, vec![9.0, 3.0, 4.0]);
        let err = n.accumulate_values(&[(1, 2.0), (0, 3.0), (2, 4.0)]).unwrap_err();
        assert!(err.to_string().contains("index is different"));
        assert!(n.accumulate_values(&[(0, 2.0)]).is_err());
    }

    #[test]
    fn test_segments_series() {
        let n = valid_n();
        assert_eq!(n.segments_series(&SegmentValues::Scalar(8.0)).unwrap(), vec![8.0; 3]);
        assert_eq!(
            n.segments_series(&SegmentValues::Scalar("$VAL$".to_string())).unwrap(),
            vec!["$VAL$"; 3]
        );
        assert_eq!(n.segments_series(&SegmentValues::List(vec![3, 4, 5])).unwrap(), vec![3, 4, 5]);
        let map = BTreeMap::from([(0, 1.1), (1, 2.2), (2, 3.3)]);
        assert_eq!(n.segments_series(&SegmentValues::Map(map)).unwrap(), vec![1.1, 2.2, 3.3]);

        let errmsg = "index is different than for segments";
        for bad in [vec![8], vec![3, 4, 5, 6]] {
            let err = n.segments_series(&SegmentValues::List(bad)).unwrap_err();
            assert!(err.to_string().contains(errmsg));
        }
        let shifted = BTreeMap::from([(0, 1.1), (1, 2.2), (3, 3.3)]);
        let err = n.segments_series(&SegmentValues::Map(shifted)).unwrap_err();
        assert!(err.to_string().contains(errmsg));
    }

    #[test]
    fn test_pair_continuous() {
        let n = valid_n();
        let pair = |v: SegmentValues<f64>, out: Option<SegmentValues<f64>>| {
            n.pair_segments_frame(&v, out.as_ref(), PairMethod::Continuous).unwrap()
        };
        assert_eq!(pair(8.0.into(), None), vec![(8.0, 8.0); 3]);
        assert_eq!(pair(8.0.into(), Some(9.0.into())), vec![(8.0, 9.0), (8.0, 8.0), (8.0, 8.0)]);
        assert_eq!(
            pair(vec![3.0, 4.0, 5.0].into(), None),
            vec![(3.0, 3.0), (4.0, 3.0), (5.0, 3.0)]
        );
        assert_eq!(
            pair(vec![3.0, 4.0, 5.0].into(), Some(BTreeMap::from([(0, 6.0)]).into())),
            vec![(3.0, 6.0), (4.0, 3.0), (5.0, 3.0)]
        );
        assert_eq!(
            pair(1.0.into(), Some(BTreeMap::from([(0, 2.0), (2, 3.0)]).into())),
            vec![(1.0, 2.0), (1.0, 1.0), (1.0, 3.0)]
        );
        assert_eq!(
            pair(vec![3.0, 4.0, 5.0].into(), Some(BTreeMap::from([(1, 7.0), (2, 8.0)]).into())),
            vec![(3.0, 3.0), (4.0, 7.0), (5.0, 8.0)]
        );
    }

    #[test]
    fn test_pair_constant_and_additive() {
        let n = valid_n();
        let seconds = |v: SegmentValues<f64>, out: Option<SegmentValues<f64>>, m: PairMethod| {
            n.pair_segments_frame(&v, out.as_ref(), m)
                .unwrap()
                .into_iter()
                .map(|p| p.1)
                .collect::<Vec<_>>()
        };
        assert_eq!(seconds(1.0.into(), None, PairMethod::Constant), vec![1.0; 3]);
        assert_eq!(
            seconds(vec![3.0, 2.0, 1.0].into(), None, PairMethod::Constant),
            vec![3.0, 2.0, 1.0]
        );
        assert_eq!(seconds(1.0.into(), Some(2.0.into()), PairMethod::Constant), vec![2.0, 1.0, 1.0]);
        assert_eq!(seconds(1.0.into(), None, PairMethod::Additive), vec![1.0, 0.5, 0.5]);
        assert_eq!(
            seconds(
                1.0.into(),
                Some(BTreeMap::from([(0, 2.0), (1, 10.0)]).into()),
                PairMethod::Additive
            ),
            vec![2.0, 10.0, 0.5]
        );
        assert_eq!(
            seconds(vec![10.0, 2.0, 3.0].into(), None, PairMethod::Additive),
            vec![10.0, 4.0, 6.0]
        );
        assert_eq!(
            seconds(vec![10.0, 0.0, 0.0].into(), None, PairMethod::Additive),
            vec![10.0, 5.0, 5.0]
        );
    }

    #[test]
    fn test_pair_errors() {
        let n = valid_n();
        let one = SegmentValues::Scalar(1.0);
        let err = n
            .pair_segments_frame(&SegmentValues::List(vec![3.0, 4.0]), None, PairMethod::Continuous)
            .unwrap_err();
        assert!(err.to_string().contains("index is different than for segments"));
        let err = n
            .pair_segments_frame(
                &one,
                Some(&SegmentValues::Map(BTreeMap::from([(3, 2.0)]))),
                PairMethod::Continuous,
            )
            .unwrap_err();
        assert!(err.to_string().contains("value_out.index is not a subset of segments.index"));
        let err = n
            .pair_segments_frame(&one, Some(&SegmentValues::List(vec![6.0, 7.0])), PairMethod::Continuous)
            .unwrap_err();
        assert!(err.to_string().contains("expected value_out to be scalar"));
        let err = "nope".parse::<PairMethod>().unwrap_err();
        assert!(err.to_string().contains("method must be one of "));
        assert_eq!("additive".parse::<PairMethod>().unwrap(), PairMethod::Additive);
    }

    #[test]
    fn test_catchments() {
        let mut n = valid_n_polygons();
        assert!(n.catchments().is_some());
        let area: Vec<f64> = n.segments().iter().map(|s| s.upstream_area.unwrap()).collect();
        assert_close(&area, &[2200.0, 875.0, 525.0], 1e-9);
        assert_close(&widths(&n), &[1.4615, 1.4457, 1.4397], 1e-4);

        n.set_catchments(None).unwrap();
        assert!(n.catchments().is_none());
        assert!(n.segments().iter().all(|s| s.width.is_none() && s.upstream_area.is_none()));

        let mut two = polygons(&VALID_POLYGONS);
        two.pop();
        let err = n.set_catchments(Some(two)).unwrap_err();
        assert!(err.to_string().contains("catchments.index is different than for segments"));
    }

    #[test]
    fn test_estimate_width() {
        let mut n = valid_n_polygons();
        let params = |a: SegmentValues<f64>, b: SegmentValues<f64>| WidthParams {
            a,
            b,
            upstream_area: None,
        };
        n.estimate_width(&params(1.4.into(), 0.6.into())).unwrap();
        assert_close(&widths(&n), &[1.4254, 1.4146, 1.4108], 1e-4);
        n.estimate_width(&params(1.0.into(), 1.0.into())).unwrap();
        assert_close(&widths(&n), &[1.0022, 1.0009, 1.0005], 1e-4);
        n.estimate_width(&params(vec![1.2, 1.8, 1.4].into(), vec![0.4, 0.7, 0.6].into()))
            .unwrap();
        assert_close(&widths(&n), &[1.2006, 1.8, 1.4], 1e-4);

        let half: Vec<f64> = n.segments().iter().map(|s| s.upstream_area.unwrap() / 2.0).collect();
        n.estimate_width(&WidthParams { upstream_area: Some(half.into()), ..Default::default() })
            .unwrap();
        assert_close(&widths(&n), &[1.4489, 1.4379, 1.4337], 1e-4);
        n.estimate_width(&WidthParams::default()).unwrap();
        assert_close(&widths(&n), &[1.4615, 1.4457, 1.4397], 1e-4);
    }

    #[test]
    fn test_estimate_width_without_catchments() {
        let mut n = valid_n();
        let err = n.estimate_width(&WidthParams::default()).unwrap_err();
        assert!(err.to_string().contains("'upstream_area' not found in segments.columns"));

        let area: Vec<f64> = n.segments().iter().map(|s| s.upstream_length * 25.0).collect();
        n.estimate_width(&WidthParams { upstream_area: Some(area.into()), ..Default::default() })
            .unwrap();
        assert_close(&widths(&n), &[1.4614, 1.4461, 1.4444], 1e-4);
    }
}
