//! Remove segments from a network

use super::{Segment, SurfaceWaterNetwork};
use std::collections::BTreeSet;
use swn_core::{Error, Result};
use tracing::info;

fn retain_aligned<T>(values: &mut Vec<T>, keep: &[bool]) {
    let mut it = keep.iter();
    values.retain(|_| it.next().copied().unwrap_or(false));
}

impl SurfaceWaterNetwork {
    /// Remove segments matching `condition` and those listed in `segnums`.
    ///
    /// Attributes of the remaining segments are kept as they are; call the
    /// `evaluate_*` methods to refresh them. Segments draining into a
    /// removed segment become outlets. Catchments and diversions of removed
    /// segments are removed too.
    pub fn remove(
        &mut self,
        condition: Option<&dyn Fn(&Segment) -> bool>,
        segnums: &[i64],
    ) -> Result<()> {
        let missing: Vec<i64> = segnums.iter().copied().filter(|s| !self.contains(*s)).collect();
        if !missing.is_empty() {
            return Err(Self::not_found("segnums", &missing));
        }
        let mut sel: BTreeSet<i64> = segnums.iter().copied().collect();
        if let Some(condition) = condition {
            sel.extend(self.segments.iter().filter(|s| condition(s)).map(|s| s.segnum));
        }
        if sel.is_empty() {
            info!("no segments selected to remove");
            return Ok(());
        }
        if sel.len() == self.len() {
            return Err(Error::InvalidParameter {
                name: "segnums",
                value: format!("{} segments", sel.len()),
                reason: "all segments were selected to remove; must keep at least one".into(),
            });
        }
        info!("removing {} of {} segments", sel.len(), self.len());

        let keep: Vec<bool> = self.segments.iter().map(|s| !sel.contains(&s.segnum)).collect();
        if let Some(catchments) = self.catchments.as_mut() {
            retain_aligned(catchments, &keep);
        }
        if let Some(profiles) = self.profiles.as_mut() {
            retain_aligned(profiles, &keep);
        }
        retain_aligned(&mut self.segments, &keep);

        let end = self.end_segnum;
        for seg in &mut self.segments {
            if sel.contains(&seg.to_segnum) {
                seg.to_segnum = end;
            }
        }
        if let Some(diversions) = self.diversions.as_mut() {
            diversions.retain(|d| !sel.contains(&d.from_segnum));
        }
        self.rebuild_index();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_remove_condition() {
        let mut n = valid_n_polygons();
        let small = |s: &Segment| s.upstream_area.map_or(false, |a| a <= 1000.0);
        n.remove(Some(&small), &[]).unwrap();
        assert_eq!(n.segnums(), vec![0]);
        assert_eq!(n.catchments().unwrap().len(), 1);
        assert_relative_eq!(n.segment(0).unwrap().upstream_length, 87.67828936, epsilon = 1e-6);
        assert_eq!(n.headwater(), vec![0]);
        assert_eq!(n.outlets(), vec![0]);

        n.evaluate_upstream_length();
        n.evaluate_upstream_area().unwrap();
        n.estimate_width(&Default::default()).unwrap();
        let seg = n.segment(0).unwrap();
        assert_relative_eq!(seg.upstream_length, 20.0);
        assert_relative_eq!(seg.upstream_area.unwrap(), 800.0);
        assert_relative_eq!(seg.width.unwrap(), 1.4445, epsilon = 1e-4);
    }

    #[test]
    fn test_remove_segnums() {
        let mut n = valid_n();
        n.remove(None, &[1]).unwrap();
        assert_eq!(n.segnums(), vec![0, 2]);
        assert_eq!(n.headwater(), vec![2]);
        assert_eq!(n.outlets(), vec![0]);

        let mut n = valid_n();
        n.remove(None, &[0]).unwrap();
        assert_eq!(n.segnums(), vec![1, 2]);
        assert_eq!(n.outlets(), vec![1, 2]);
        assert!(n.to_segnums().is_empty());

        let mut n = valid_n();
        n.remove(None, &[]).unwrap();
        assert_eq!(n.len(), 3);
    }

    #[test]
    fn test_remove_errors() {
        let mut n = valid_n();
        let err = n.remove(None, &[3]).unwrap_err();
        assert_eq!(err.to_string(), "1 segnums not found in segments.index: [3]");
        let err = n.remove(Some(&|_: &Segment| true), &[]).unwrap_err();
        assert!(err
            .to_string()
            .contains("all segments were selected to remove; must keep at least one"));
        assert_eq!(n.len(), 3);
    }
}
