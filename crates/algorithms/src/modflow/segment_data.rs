//! SFR segment data and its setters

use super::sfr::SfrNetwork;
use crate::network::SegmentValues;
use crate::util::abbr_str;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;
use swn_core::{Error, Result};
use tracing::{debug, warn};

/// One row of SFR segment data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentData {
    /// SFR segment number, from 1
    pub nseg: usize,
    /// Network segment, or the network's `end_segnum` for diversions
    pub segnum: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divid: Option<i64>,
    pub icalc: i32,
    /// Downstream `nseg`, or 0 for outlets and diversions
    pub outseg: usize,
    /// `nseg` a diversion draws from, otherwise 0
    pub iupseg: usize,
    pub inflow: f64,
    /// Segments outside the model whose flow enters through `inflow`
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub inflow_segnums: BTreeSet<i64>,
    /// Flow taken out of the segment, named `flow` in SFR input
    pub abstraction: f64,
    pub roughch: f64,
    pub hcond1: f64,
    pub thickm1: f64,
    pub elevup: f64,
    pub width1: f64,
    pub depth1: f64,
    pub hcond2: f64,
    pub thickm2: f64,
    pub elevdn: f64,
    pub width2: f64,
    pub depth2: f64,
}

impl SegmentData {
    pub(super) fn new(nseg: usize, segnum: i64, outseg: usize) -> Self {
        Self {
            nseg,
            segnum,
            divid: None,
            icalc: 0,
            outseg,
            iupseg: 0,
            inflow: 0.0,
            inflow_segnums: BTreeSet::new(),
            abstraction: 0.0,
            roughch: 0.0,
            hcond1: 0.0,
            thickm1: 0.0,
            elevup: 0.0,
            width1: 0.0,
            depth1: 0.0,
            hcond2: 0.0,
            thickm2: 0.0,
            elevdn: 0.0,
            width2: 0.0,
            depth2: 0.0,
        }
    }

    pub fn is_diversion(&self) -> bool {
        self.iupseg != 0
    }

    pub fn get(&self, field: SegmentField) -> f64 {
        use SegmentField::*;
        match field {
            Icalc => self.icalc as f64,
            Inflow => self.inflow,
            Abstraction => self.abstraction,
            Roughch => self.roughch,
            Hcond1 => self.hcond1,
            Thickm1 => self.thickm1,
            Elevup => self.elevup,
            Width1 => self.width1,
            Depth1 => self.depth1,
            Hcond2 => self.hcond2,
            Thickm2 => self.thickm2,
            Elevdn => self.elevdn,
            Width2 => self.width2,
            Depth2 => self.depth2,
        }
    }

    /// Set a field; `icalc` is rounded to the nearest integer
    pub fn set(&mut self, field: SegmentField, value: f64) {
        use SegmentField::*;
        let slot = match field {
            Icalc => {
                self.icalc = value.round() as i32;
                return;
            }
            Inflow => &mut self.inflow,
            Abstraction => &mut self.abstraction,
            Roughch => &mut self.roughch,
            Hcond1 => &mut self.hcond1,
            Thickm1 => &mut self.thickm1,
            Elevup => &mut self.elevup,
            Width1 => &mut self.width1,
            Depth1 => &mut self.depth1,
            Hcond2 => &mut self.hcond2,
            Thickm2 => &mut self.thickm2,
            Elevdn => &mut self.elevdn,
            Width2 => &mut self.width2,
            Depth2 => &mut self.depth2,
        };
        *slot = value;
    }
}

/// Settable segment data columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentField {
    Icalc,
    Inflow,
    Abstraction,
    Roughch,
    Hcond1,
    Thickm1,
    Elevup,
    Width1,
    Depth1,
    Hcond2,
    Thickm2,
    Elevdn,
    Width2,
    Depth2,
}

impl SegmentField {
    pub const ALL: [SegmentField; 14] = [
        SegmentField::Icalc,
        SegmentField::Inflow,
        SegmentField::Abstraction,
        SegmentField::Roughch,
        SegmentField::Hcond1,
        SegmentField::Thickm1,
        SegmentField::Elevup,
        SegmentField::Width1,
        SegmentField::Depth1,
        SegmentField::Hcond2,
        SegmentField::Thickm2,
        SegmentField::Elevdn,
        SegmentField::Width2,
        SegmentField::Depth2,
    ];

    pub fn name(&self) -> &'static str {
        use SegmentField::*;
        match self {
            Icalc => "icalc",
            Inflow => "inflow",
            Abstraction => "abstraction",
            Roughch => "roughch",
            Hcond1 => "hcond1",
            Thickm1 => "thickm1",
            Elevup => "elevup",
            Width1 => "width1",
            Depth1 => "depth1",
            Hcond2 => "hcond2",
            Thickm2 => "thickm2",
            Elevdn => "elevdn",
            Width2 => "width2",
            Depth2 => "depth2",
        }
    }
}

impl fmt::Display for SegmentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SegmentField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(field) = Self::ALL.iter().find(|f| f.name() == s) {
            return Ok(*field);
        }
        let reason = match s {
            "nseg" | "segnum" | "divid" | "outseg" | "iupseg" => format!("'{}' can't be set", s),
            _ => {
                let names: Vec<&str> = Self::ALL.iter().map(|f| f.name()).collect();
                format!("could not find '{}' in {}", s, names.join(", "))
            }
        };
        Err(Error::InvalidParameter { name: "name", value: s.to_string(), reason })
    }
}

/// Rows of segment data that a scalar setter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentSelection {
    #[default]
    All,
    Segments,
    Diversions,
}

impl SegmentSelection {
    pub fn admits(&self, sd: &SegmentData) -> bool {
        match self {
            SegmentSelection::All => true,
            SegmentSelection::Segments => !sd.is_diversion(),
            SegmentSelection::Diversions => sd.is_diversion(),
        }
    }
}

impl FromStr for SegmentSelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(SegmentSelection::All),
            "segments" => Ok(SegmentSelection::Segments),
            "diversions" => Ok(SegmentSelection::Diversions),
            _ => Err(Error::InvalidParameter {
                name: "which",
                value: s.to_string(),
                reason: "'which' should be one of 'all', 'segments' or 'diversions'".into(),
            }),
        }
    }
}

impl SfrNetwork {
    fn segment_data_or_new(&mut self) -> &mut Vec<SegmentData> {
        if self.segment_data.is_none() {
            self.new_segment_data();
        }
        self.segment_data.get_or_insert_with(Vec::new)
    }

    /// Set one field to `value` in the selected rows
    pub fn set_segment_data_from_scalar(&mut self, field: SegmentField, value: f64, which: SegmentSelection) {
        let data = self.segment_data_or_new();
        let mut count = 0;
        for sd in data.iter_mut().filter(|sd| which.admits(sd)) {
            sd.set(field, value);
            count += 1;
        }
        debug!("set {} to {} in {} rows", field, value, count);
    }

    /// Set one field from values aligned with or keyed by network segments.
    ///
    /// Segments without reaches are skipped. Diversion rows are left alone.
    pub fn set_segment_data_from_segments(
        &mut self,
        field: SegmentField,
        values: &SegmentValues<f64>,
    ) -> Result<()> {
        let by_segnum: BTreeMap<i64, f64> = match values {
            SegmentValues::Scalar(v) => {
                self.set_segment_data_from_scalar(field, *v, SegmentSelection::Segments);
                return Ok(());
            }
            SegmentValues::List(_) => self
                .network
                .segnums()
                .into_iter()
                .zip(self.network.segments_series(values)?)
                .collect(),
            SegmentValues::Map(map) => {
                let missing: Vec<i64> =
                    map.keys().copied().filter(|s| self.network.segment(*s).is_none()).collect();
                if !missing.is_empty() {
                    return Err(Error::IndexNotFound(format!(
                        "{} not found in segments: {}",
                        field,
                        abbr_str(&missing, 4)
                    )));
                }
                map.clone()
            }
        };
        let data = self.segment_data_or_new();
        for sd in data.iter_mut().filter(|sd| !sd.is_diversion()) {
            if let Some(&v) = by_segnum.get(&sd.segnum) {
                sd.set(field, v);
            }
        }
        Ok(())
    }

    /// Set one field of diversion rows, keyed by `divid`
    pub fn set_segment_data_from_diversions(
        &mut self,
        field: SegmentField,
        values: &BTreeMap<i64, f64>,
    ) -> Result<()> {
        let known: HashSet<i64> = self
            .network
            .diversions()
            .unwrap_or_default()
            .iter()
            .map(|d| d.divid)
            .collect();
        let missing: Vec<i64> = values.keys().copied().filter(|d| !known.contains(d)).collect();
        if !missing.is_empty() {
            return Err(Error::IndexNotFound(format!(
                "{} not found in diversions: {}",
                field,
                abbr_str(&missing, 4)
            )));
        }
        let data = self.segment_data_or_new();
        for sd in data.iter_mut() {
            if let Some(v) = sd.divid.and_then(|d| values.get(&d)) {
                sd.set(field, *v);
            }
        }
        Ok(())
    }

    /// Set `inflow` from flows keyed by network segnum.
    ///
    /// Flow from a segment without reaches is routed downstream to the
    /// first segment with reaches, and added to its inflow. The source
    /// segments are listed in `inflow_segnums`.
    pub fn set_segment_data_inflow(&mut self, flows: &BTreeMap<i64, f64>) -> Result<()> {
        let in_model: HashSet<i64> = self
            .reaches
            .iter()
            .filter(|r| !r.is_diversion())
            .map(|r| r.segnum)
            .collect();
        let mut totals: BTreeMap<i64, (f64, BTreeSet<i64>)> = BTreeMap::new();
        let mut lost = Vec::new();
        for (&segnum, &flow) in flows {
            if self.network.segment(segnum).is_none() {
                return Err(Error::IndexNotFound(format!("inflow segnum {} not found", segnum)));
            }
            let mut target = Some(segnum);
            for _ in 0..=self.network.len() {
                match target {
                    Some(s) if in_model.contains(&s) => break,
                    Some(s) => target = self.network.segment(s).map(|seg| seg.to_segnum),
                    None => break,
                }
            }
            match target.filter(|s| in_model.contains(s)) {
                Some(s) => {
                    let entry = totals.entry(s).or_default();
                    entry.0 += flow;
                    if s != segnum {
                        entry.1.insert(segnum);
                    }
                }
                None => lost.push(segnum),
            }
        }
        if !lost.is_empty() {
            warn!("inflow from {} segments never reaches the model: {}", lost.len(), abbr_str(&lost, 4));
        }
        let data = self.segment_data_or_new();
        for sd in data.iter_mut().filter(|sd| !sd.is_diversion()) {
            let (inflow, sources) = totals.remove(&sd.segnum).unwrap_or_default();
            sd.inflow = inflow;
            sd.inflow_segnums = sources;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modflow::{ModelGrid, SfrParams};
    use crate::network::fixtures::*;
    use crate::network::DiversionInput;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn grid() -> ModelGrid {
        ModelGrid::new(3, 2, 20.0, 20.0, 30.0, 70.0).unwrap()
    }

    fn with_diversions() -> SfrNetwork {
        let mut n = valid_n();
        let inputs = vec![
            DiversionInput { divid: 10, point: None, from_segnum: Some(1) },
            DiversionInput { divid: 11, point: None, from_segnum: Some(0) },
        ];
        n.set_diversions(Some(inputs), 0).unwrap();
        let mut sfr = SfrNetwork::from_network(&n, grid(), &SfrParams::default()).unwrap();
        sfr.new_segment_data();
        sfr
    }

    fn column(sfr: &SfrNetwork, field: SegmentField) -> Vec<f64> {
        sfr.segment_data().unwrap().iter().map(|sd| sd.get(field)).collect()
    }

    #[test]
    fn test_field_names() {
        assert_eq!("hcond1".parse::<SegmentField>().unwrap(), SegmentField::Hcond1);
        assert_eq!(SegmentField::Depth2.to_string(), "depth2");
        let err = "outseg".parse::<SegmentField>().unwrap_err();
        assert!(err.to_string().contains("'outseg' can't be set"));
        let err = "flux".parse::<SegmentField>().unwrap_err();
        assert!(err.to_string().contains("could not find 'flux' in icalc, inflow"));
        assert_eq!("diversions".parse::<SegmentSelection>().unwrap(), SegmentSelection::Diversions);
        assert!("some".parse::<SegmentSelection>().is_err());
    }

    #[test]
    fn test_set_from_scalar() {
        let mut sfr = with_diversions();
        sfr.set_segment_data_from_scalar(SegmentField::Hcond1, 2.0, SegmentSelection::Segments);
        assert_eq!(column(&sfr, SegmentField::Hcond1), vec![2.0, 2.0, 2.0, 0.0, 0.0]);
        sfr.set_segment_data_from_scalar(SegmentField::Abstraction, 0.5, SegmentSelection::Diversions);
        assert_eq!(column(&sfr, SegmentField::Abstraction), vec![0.0, 0.0, 0.0, 0.5, 0.5]);
        sfr.set_segment_data_from_scalar(SegmentField::Roughch, 0.03, SegmentSelection::All);
        assert!(column(&sfr, SegmentField::Roughch).iter().all(|&v| v == 0.03));
        sfr.set_segment_data_from_scalar(SegmentField::Icalc, 2.4, SegmentSelection::All);
        assert!(sfr.segment_data().unwrap().iter().all(|sd| sd.icalc == 2));
    }

    #[test]
    fn test_set_from_segments() {
        let mut sfr = with_diversions();
        // network order is segnum 0, 1, 2; segment data order is 1, 2, 0
        sfr.set_segment_data_from_segments(SegmentField::Width1, &SegmentValues::List(vec![1.0, 2.0, 3.0]))
            .unwrap();
        assert_eq!(column(&sfr, SegmentField::Width1), vec![2.0, 3.0, 1.0, 0.0, 0.0]);

        let map = BTreeMap::from([(2, 5.0)]);
        sfr.set_segment_data_from_segments(SegmentField::Width1, &SegmentValues::Map(map)).unwrap();
        assert_eq!(column(&sfr, SegmentField::Width1), vec![2.0, 5.0, 1.0, 0.0, 0.0]);

        let bad = BTreeMap::from([(7, 1.0)]);
        assert!(sfr.set_segment_data_from_segments(SegmentField::Width1, &SegmentValues::Map(bad)).is_err());
        assert!(sfr
            .set_segment_data_from_segments(SegmentField::Width1, &SegmentValues::List(vec![1.0]))
            .is_err());

        sfr.set_segment_data_from_segments(SegmentField::Depth1, &SegmentValues::Scalar(0.3)).unwrap();
        assert_eq!(column(&sfr, SegmentField::Depth1), vec![0.3, 0.3, 0.3, 0.0, 0.0]);
    }

    #[test]
    fn test_set_from_diversions() {
        let mut sfr = with_diversions();
        let values = BTreeMap::from([(11, 0.25)]);
        sfr.set_segment_data_from_diversions(SegmentField::Abstraction, &values).unwrap();
        assert_eq!(column(&sfr, SegmentField::Abstraction), vec![0.0, 0.0, 0.0, 0.0, 0.25]);
        let unknown = BTreeMap::from([(12, 1.0)]);
        assert!(sfr.set_segment_data_from_diversions(SegmentField::Abstraction, &unknown).is_err());
    }

    #[test]
    fn test_inflow_from_outside_segments() {
        // segnum 2 lies only in cells (0, 1) and (1, 1)
        let mut ibound = Array2::ones((3, 2));
        ibound[[0, 1]] = 0;
        ibound[[1, 1]] = 0;
        let g = grid().with_ibound(ibound).unwrap();
        let params = SfrParams { reach_include_fraction: 0.0, ..Default::default() };
        let mut sfr = SfrNetwork::from_network(&valid_n(), g, &params).unwrap();
        sfr.new_segment_data();
        let segnums: Vec<i64> = sfr.segment_data().unwrap().iter().map(|sd| sd.segnum).collect();
        assert_eq!(segnums, vec![1, 0]);

        sfr.set_segment_data_inflow(&BTreeMap::from([(2, 3.0), (1, 1.5)])).unwrap();
        let data = sfr.segment_data().unwrap();
        assert_relative_eq!(data[0].inflow, 1.5);
        assert!(data[0].inflow_segnums.is_empty());
        assert_relative_eq!(data[1].inflow, 3.0);
        assert_eq!(data[1].inflow_segnums, BTreeSet::from([2]));

        assert!(sfr.set_segment_data_inflow(&BTreeMap::from([(9, 1.0)])).is_err());
    }
}
