//! Elevation profile adjustment

use super::{ProfileParams, SurfaceWaterNetwork};
use geo_types::{Coord, LineString};
use swn_core::{Error, Result};
use tracing::{debug, info};

/// Lowered elevations of one line, as (vertex index, amount)
fn lower_profile(coords: &[Coord<f64>], z: &mut [f64], min_slope: f64) -> Vec<(usize, f64)> {
    let mut adjusted = Vec::new();
    for i in 1..coords.len() {
        let dx = (coords[i].x - coords[i - 1].x).hypot(coords[i].y - coords[i - 1].y);
        let max_z = z[i - 1] - dx * min_slope;
        if z[i] > max_z {
            adjusted.push((i, z[i] - max_z));
            z[i] = max_z;
        }
    }
    adjusted
}

impl SurfaceWaterNetwork {
    /// Lower Z coordinates so every leg of every segment drops by at least
    /// `min_slope`.
    ///
    /// Messages describing each adjusted segment replace `messages`, and
    /// `profiles` is set to the (distance, elevation) profile of each line
    /// after adjustment, with distance from the upstream end.
    pub fn adjust_elevation_profile(&mut self, params: &ProfileParams) -> Result<()> {
        let min_slope = self.segments_series(&params.min_slope)?;
        if let Some(bad) = min_slope.iter().find(|s| !(**s > 0.0)) {
            return Err(Error::InvalidParameter {
                name: "min_slope",
                value: bad.to_string(),
                reason: "min_slope must be greater than zero".into(),
            });
        }
        if !self.has_z() {
            return Err(Error::InvalidGeometry("line geometry does not have Z dimension".into()));
        }

        let mut messages = Vec::new();
        let mut profiles = Vec::with_capacity(self.len());
        for (seg, &slope) in self.segments.iter_mut().zip(&min_slope) {
            let coords = seg.geometry.coords().to_vec();
            let mut z = seg.geometry.z().map(<[f64]>::to_vec).unwrap_or_default();
            let adjusted = lower_profile(&coords, &mut z, slope);

            let mut dist = 0.0;
            let mut profile = Vec::with_capacity(coords.len());
            for (i, c) in coords.iter().enumerate() {
                if i > 0 {
                    dist += (c.x - coords[i - 1].x).hypot(c.y - coords[i - 1].y);
                }
                profile.push(Coord { x: dist, y: z[i] });
            }
            profiles.push(LineString::new(profile));

            if adjusted.is_empty() {
                continue;
            }
            seg.geometry.set_z(Some(z))?;
            let msg = if let [(_, by)] = adjusted.as_slice() {
                format!("segment {}: adjusted 1 coordinate elevation by {:.3}", seg.segnum, by)
            } else {
                let lo = adjusted.iter().map(|a| a.1).fold(f64::INFINITY, f64::min);
                let hi = adjusted.iter().map(|a| a.1).fold(f64::NEG_INFINITY, f64::max);
                format!(
                    "segment {}: adjusted {} coordinate elevations between {:.3} and {:.3}",
                    seg.segnum,
                    adjusted.len(),
                    lo,
                    hi
                )
            };
            debug!("{}", msg);
            messages.push(msg);
        }
        info!("adjusted elevation profile of {} segments", messages.len());
        self.messages = messages;
        self.profiles = Some(profiles);
        Ok(())
    }
}
