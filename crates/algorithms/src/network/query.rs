//! Upstream and downstream traversal

use super::SurfaceWaterNetwork;
use crate::util::abbr_str;
use std::collections::HashSet;
use swn_core::{Error, Result};

fn missing_error(what: &str, given: &[i64], missing: &[i64]) -> Error {
    if given.len() == 1 {
        Error::IndexNotFound(format!("{} segnum {} not found in segments.index", what, missing[0]))
    } else {
        Error::IndexNotFound(format!(
            "{} {} segment{} not found in segments.index: {}",
            missing.len(),
            what,
            if missing.len() == 1 { "" } else { "s" },
            abbr_str(missing, usize::MAX)
        ))
    }
}

impl SurfaceWaterNetwork {
    fn check_present(&self, what: &str, segnums: &[i64]) -> Result<()> {
        let missing: Vec<i64> = segnums.iter().copied().filter(|s| !self.contains(*s)).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing_error(what, segnums, &missing))
        }
    }

    /// Depth-first walk upstream from `starts`; barriers are visited but
    /// not walked past
    pub(super) fn walk_upstream(
        &self,
        starts: &[i64],
        barriers: &HashSet<i64>,
        visited: &mut HashSet<i64>,
    ) -> Vec<i64> {
        let mut found = Vec::new();
        for &start in starts {
            if !visited.insert(start) {
                continue;
            }
            let mut stack = vec![start];
            while let Some(segnum) = stack.pop() {
                found.push(segnum);
                if segnum != start && barriers.contains(&segnum) {
                    continue;
                }
                for up in self.upstream_of(segnum).into_iter().rev() {
                    if visited.insert(up) {
                        stack.push(up);
                    }
                }
            }
        }
        found
    }

    /// Segments upstream of `segnums`, including `segnums` themselves.
    ///
    /// Segments in `barriers` are included, but segments upstream of them
    /// are not.
    pub fn query_upstream(&self, segnums: &[i64], barriers: &[i64]) -> Result<Vec<i64>> {
        self.check_present("upstream", segnums)?;
        self.check_present("barrier", barriers)?;
        let barriers: HashSet<i64> = barriers.iter().copied().collect();
        Ok(self.walk_upstream(segnums, &barriers, &mut HashSet::new()))
    }

    /// Segments downstream of `segnum`, in order, excluding `segnum`.
    ///
    /// With `gather_upstream`, the branches joining the downstream path are
    /// also returned, but not the segments upstream of `segnum`. The path
    /// stops at the first barrier, which is included.
    pub fn query_downstream(
        &self,
        segnum: i64,
        gather_upstream: bool,
        barriers: &[i64],
    ) -> Result<Vec<i64>> {
        self.check_present("downstream", &[segnum])?;
        self.check_present("barrier", barriers)?;
        let barriers: HashSet<i64> = barriers.iter().copied().collect();

        let mut path = Vec::new();
        let mut visited: HashSet<i64> = HashSet::from([segnum]);
        let mut current = segnum;
        while let Some(seg) = self.segment(current) {
            let next = seg.to_segnum;
            if !self.contains(next) || !visited.insert(next) {
                break;
            }
            path.push(next);
            if barriers.contains(&next) {
                break;
            }
            current = next;
        }
        if !gather_upstream {
            return Ok(path);
        }

        let mut found = Vec::new();
        for &node in &path {
            found.push(node);
            if barriers.contains(&node) {
                break;
            }
            let branches: Vec<i64> = self
                .upstream_of(node)
                .into_iter()
                .filter(|u| !visited.contains(u))
                .collect();
            for branch in branches {
                if barriers.contains(&branch) {
                    visited.insert(branch);
                    found.push(branch);
                } else {
                    found.extend(self.walk_upstream(&[branch], &barriers, &mut visited));
                }
            }
        }
        Ok(found)
    }
}
