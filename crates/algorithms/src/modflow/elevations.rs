//! Segment elevation fixes
//!
//! Streambed elevations taken from a DEM or from line Z coordinates may sit
//! above the model top or run uphill. These passes lower segment ends to a
//! minimum incision, then walk downstream so every segment falls by at least
//! a minimum slope and never ends below the segment it flows into starts.

use super::sfr::SfrNetwork;
use swn_core::{Error, Result};
use tracing::{debug, info};

/// Gap kept between a segment's downstream end and its outseg's upstream end
const DOWNSTREAM_BUFFER: f64 = 0.001;

/// Model top at both ends of a segment, and its length from reaches
#[derive(Debug, Clone, Copy)]
struct SegmentEnds {
    top_up: f64,
    top_dn: f64,
    seglen: f64,
}

fn missing_segment_data() -> Error {
    Error::Algorithm("segment_data not set; run default_segment_data first".into())
}

impl SfrNetwork {
    /// Ends of each segment data row, in row order
    fn segment_ends(&self) -> Result<Vec<SegmentEnds>> {
        let data = self.segment_data.as_ref().ok_or_else(missing_segment_data)?;
        Ok(data
            .iter()
            .map(|sd| {
                let mut reaches = self.reaches.iter().filter(|r| r.iseg == sd.nseg);
                let first = reaches.next();
                let (last, seglen) = reaches.fold(
                    (first, first.map_or(0.0, |r| r.rchlen)),
                    |(_, len), r| (Some(r), len + r.rchlen),
                );
                let top = |r: Option<&super::Reach>| r.map_or(0.0, |r| self.grid.top[[r.i, r.j]]);
                SegmentEnds { top_up: top(first), top_dn: top(last), seglen }
            })
            .collect())
    }

    fn incisions(&self, ends: &[SegmentEnds]) -> Vec<(f64, f64)> {
        self.segment_data
            .iter()
            .flatten()
            .zip(ends)
            .map(|(sd, e)| (e.top_up - sd.elevup, e.top_dn - sd.elevdn))
            .collect()
    }

    /// Lower segment ends to at least `min_incise` below the model top, and
    /// optionally no higher than `max_str_z`.
    ///
    /// Returns the incision at the upstream and downstream end of each row.
    pub fn set_seg_minincise(&mut self, min_incise: f64, max_str_z: Option<f64>) -> Result<Vec<(f64, f64)>> {
        let ends = self.segment_ends()?;
        let data = self.segment_data.as_mut().ok_or_else(missing_segment_data)?;
        let mut lowered = 0;
        for (sd, e) in data.iter_mut().zip(&ends) {
            if e.top_up - sd.elevup < min_incise {
                sd.elevup = e.top_up - min_incise;
                lowered += 1;
            }
            if e.top_dn - sd.elevdn < min_incise {
                sd.elevdn = e.top_dn - min_incise;
                lowered += 1;
            }
            if let Some(max_z) = max_str_z {
                sd.elevup = sd.elevup.min(max_z);
                sd.elevdn = sd.elevdn.min(max_z);
            }
        }
        debug!("lowered {} segment ends to a minimum incision of {}", lowered, min_incise);
        Ok(self.incisions(&ends))
    }

    /// Make segment elevations fall downstream.
    ///
    /// After [`set_seg_minincise`](Self::set_seg_minincise), segments are
    /// visited from headwaters down. Each drops over its length by at least
    /// `min_slope`, or a tenth of the surface slope if steeper. The
    /// upstream end of a segment is lowered to just below the lowest
    /// downstream end flowing into it. Returns the final incisions.
    pub fn fix_segment_elevs(
        &mut self,
        min_incise: f64,
        min_slope: f64,
        max_str_z: Option<f64>,
    ) -> Result<Vec<(f64, f64)>> {
        self.set_seg_minincise(min_incise, max_str_z)?;
        let ends = self.segment_ends()?;
        let data = self.segment_data.as_mut().ok_or_else(missing_segment_data)?;
        let row_of = |nseg: usize| data.iter().position(|sd| sd.nseg == nseg);
        let outrow: Vec<Option<usize>> = data.iter().map(|sd| row_of(sd.outseg)).collect();
        let mut outseg_elevup: Vec<Option<f64>> =
            outrow.iter().map(|r| r.map(|r| data[r].elevup)).collect();

        let mut selected: Vec<bool> = (0..data.len()).map(|n| !outrow.contains(&Some(n))).collect();
        for _ in 0..=data.len() {
            let count = selected.iter().filter(|s| **s).count();
            if count == 0 {
                break;
            }
            info!("checking elevdn and outseg_elevup for {} segments", count);
            for n in (0..data.len()).filter(|&n| selected[n]) {
                let e = &ends[n];
                let up = data[n].elevup;
                let surface = (e.top_up - e.top_dn) / (10.0 * e.seglen);
                let drop = e.seglen * surface.max(min_slope);
                match outrow[n] {
                    Some(m) => {
                        let down = data[m].elevup;
                        let dn = if down >= up - drop { up - drop } else { down };
                        data[n].elevdn = dn;
                        outseg_elevup[n] = Some(dn - DOWNSTREAM_BUFFER);
                    }
                    None => {
                        if data[n].elevdn > up - drop {
                            debug!("outflow nseg {}: elevdn lowered to {}", data[n].nseg, up - drop);
                            data[n].elevdn = up - drop;
                        }
                    }
                }
            }
            for m in 0..data.len() {
                let lowest = (0..data.len())
                    .filter(|&n| outrow[n] == Some(m))
                    .filter_map(|n| outseg_elevup[n])
                    .reduce(f64::min);
                if let Some(z) = lowest {
                    data[m].elevup = z;
                }
            }
            let mut next = vec![false; data.len()];
            for n in (0..data.len()).filter(|&n| selected[n]) {
                if let Some(m) = outrow[n] {
                    next[m] = true;
                }
            }
            selected = next;
        }
        Ok(self.incisions(&ends))
    }

    /// Interpolate reach `strtop` between each segment's `elevup` and
    /// `elevdn`, at reach centres along the segment. The first reach takes
    /// `elevup` and the last `elevdn`.
    pub fn reconcile_reach_strtop(&mut self) -> Result<()> {
        let ends = self.segment_ends()?;
        let data = self.segment_data.as_ref().ok_or_else(missing_segment_data)?;
        for (sd, e) in data.iter().zip(&ends) {
            let slope = if e.seglen > 0.0 { (sd.elevdn - sd.elevup) / e.seglen } else { 0.0 };
            let idx: Vec<usize> =
                (0..self.reaches.len()).filter(|&i| self.reaches[i].iseg == sd.nseg).collect();
            let mut before = 0.0;
            for (k, &i) in idx.iter().enumerate() {
                let reach = &mut self.reaches[i];
                let cmid = if k + 1 == idx.len() {
                    e.seglen
                } else if k == 0 {
                    0.0
                } else {
                    before + reach.rchlen / 2.0
                };
                before += reach.rchlen;
                reach.strtop = Some(sd.elevup + cmid * slope);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modflow::{ModelGrid, SegmentDataParams, SfrParams};
    use crate::network::fixtures::*;
    use crate::network::SurfaceWaterNetwork;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    fn network_2d() -> SurfaceWaterNetwork {
        let lines = lines(&VALID_LINES).into_iter().map(|(s, l)| (s, l.force_2d())).collect();
        SurfaceWaterNetwork::from_lines(lines, None).unwrap()
    }

    fn sfr_on(top: Array2<f64>) -> SfrNetwork {
        let grid = ModelGrid::new(3, 2, 20.0, 20.0, 30.0, 70.0).unwrap().with_top(top).unwrap();
        let mut sfr = SfrNetwork::from_network(&network_2d(), grid, &SfrParams::default()).unwrap();
        sfr.default_segment_data(&SegmentDataParams::default()).unwrap();
        sfr
    }

    fn ends(sfr: &SfrNetwork) -> (Vec<f64>, Vec<f64>) {
        let data = sfr.segment_data().unwrap();
        (data.iter().map(|d| d.elevup).collect(), data.iter().map(|d| d.elevdn).collect())
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert_relative_eq!(*a, *e, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_minincise() {
        let top = array![[15.0, 15.0], [14.0, 14.0], [13.0, 13.0]];
        let mut sfr = sfr_on(top.clone());
        let incisions = sfr.set_seg_minincise(0.2, None).unwrap();
        let (up, dn) = ends(&sfr);
        assert_close(&up, &[14.8, 14.8, 13.8]);
        assert_close(&dn, &[13.8, 13.8, 12.8]);
        assert!(incisions.iter().all(|(u, d)| (u - 0.2).abs() < 1e-9 && (d - 0.2).abs() < 1e-9));

        let mut sfr = sfr_on(top);
        sfr.set_seg_minincise(0.2, Some(14.5)).unwrap();
        let (up, dn) = ends(&sfr);
        assert_close(&up, &[14.5, 14.5, 13.8]);
        assert_close(&dn, &[13.8, 13.8, 12.8]);
    }

    #[test]
    fn test_fix_segment_elevs_on_flat_top() {
        let mut sfr = sfr_on(Array2::from_elem((3, 2), 15.0));
        sfr.fix_segment_elevs(0.2, 0.01, None).unwrap();
        let (up, dn) = ends(&sfr);
        // nseg 1 and 2 drain to nseg 3, which starts below both
        assert_close(&up, &[14.8, 14.8, 14.43844488]);
        assert_close(&dn, &[14.43944488, 14.48377223, 14.23844488]);

        sfr.reconcile_reach_strtop().unwrap();
        let strtop: Vec<f64> = sfr.reaches()[..3].iter().map(|r| r.strtop.unwrap()).collect();
        assert_close(&strtop, &[14.8, 14.58967618, 14.43944488]);
        assert_relative_eq!(sfr.reaches()[6].strtop.unwrap(), 14.23844488, epsilon = 1e-6);
    }

    #[test]
    fn test_requires_segment_data() {
        let grid = ModelGrid::new(3, 2, 20.0, 20.0, 30.0, 70.0).unwrap();
        let mut sfr = SfrNetwork::from_network(&network_2d(), grid, &SfrParams::default()).unwrap();
        let err = sfr.fix_segment_elevs(0.2, 1e-4, None).unwrap_err();
        assert!(err.to_string().contains("segment_data not set"));
        assert!(sfr.reconcile_reach_strtop().is_err());
    }
}
