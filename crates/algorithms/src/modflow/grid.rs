//! Structured MODFLOW model grid

use crate::spatial::ClipRect;
use ndarray::Array2;
use std::fmt;
use std::str::FromStr;
use swn_core::{Error, GeoTransform, Raster, Result, CRS};

/// What to do with inactive cells crossed by streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IboundAction {
    /// Keep ibound; streams are clipped to active cells
    #[default]
    Freeze,
    /// Activate inactive cells where streams cross them
    Modify,
}

impl FromStr for IboundAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "freeze" => Ok(IboundAction::Freeze),
            "modify" => Ok(IboundAction::Modify),
            other => Err(Error::InvalidParameter {
                name: "ibound_action",
                value: other.to_string(),
                reason: "ibound_action must be one of freeze or modify".into(),
            }),
        }
    }
}

impl fmt::Display for IboundAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IboundAction::Freeze => "freeze",
            IboundAction::Modify => "modify",
        })
    }
}

fn uniform(name: &'static str, spacing: &[f64]) -> Result<f64> {
    let first = *spacing.first().ok_or_else(|| Error::InvalidParameter {
        name,
        value: "[]".into(),
        reason: "at least one cell is required".into(),
    })?;
    if spacing.iter().any(|d| *d != first) {
        return Err(Error::InvalidParameter {
            name,
            value: format!("{:?}", spacing),
            reason: format!("{} not uniform", name),
        });
    }
    Ok(first)
}

/// Regular grid of one layer, with top elevations and active cells.
///
/// `xoffset` and `yoffset` are the lower-left corner; rows count down from
/// the top edge.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelGrid {
    pub nrow: usize,
    pub ncol: usize,
    /// Cell width along rows
    pub delr: f64,
    /// Cell height along columns
    pub delc: f64,
    pub xoffset: f64,
    pub yoffset: f64,
    /// Top elevation of each cell
    pub top: Array2<f64>,
    /// Non-zero for active cells
    pub ibound: Array2<i32>,
    pub crs: Option<CRS>,
}

impl ModelGrid {
    /// Grid with all cells active and a top elevation of zero
    pub fn new(
        nrow: usize,
        ncol: usize,
        delr: f64,
        delc: f64,
        xoffset: f64,
        yoffset: f64,
    ) -> Result<Self> {
        if nrow == 0 || ncol == 0 {
            return Err(Error::InvalidDimensions { width: ncol, height: nrow });
        }
        for (name, value) in [("delr", delr), ("delc", delc)] {
            if !(value > 0.0) {
                return Err(Error::InvalidParameter {
                    name,
                    value: value.to_string(),
                    reason: "must be positive".into(),
                });
            }
        }
        Ok(Self {
            nrow,
            ncol,
            delr,
            delc,
            xoffset,
            yoffset,
            top: Array2::zeros((nrow, ncol)),
            ibound: Array2::ones((nrow, ncol)),
            crs: None,
        })
    }

    /// Grid from per-column and per-row spacing, which must be uniform
    pub fn from_spacing(delr: &[f64], delc: &[f64], xoffset: f64, yoffset: f64) -> Result<Self> {
        let dr = uniform("delr", delr)?;
        let dc = uniform("delc", delc)?;
        Self::new(delc.len(), delr.len(), dr, dc, xoffset, yoffset)
    }

    /// Grid matching a north-up geotransform
    pub fn from_geotransform(transform: &GeoTransform, nrow: usize, ncol: usize) -> Result<Self> {
        transform.require_north_up()?;
        let delc = -transform.pixel_height;
        Self::new(
            nrow,
            ncol,
            transform.pixel_width,
            delc,
            transform.origin_x,
            transform.origin_y - delc * nrow as f64,
        )
    }

    /// Grid over a raster, with top elevations from its values.
    ///
    /// Nodata cells are inactive.
    pub fn from_raster(raster: &Raster<f64>) -> Result<Self> {
        let (nrow, ncol) = raster.shape();
        let mut grid = Self::from_geotransform(raster.transform(), nrow, ncol)?;
        grid.top = raster.data().clone();
        grid.ibound = raster.data().mapv(|v| i32::from(!raster.is_nodata(v)));
        grid.crs = raster.crs().cloned();
        Ok(grid)
    }

    pub fn with_top(mut self, top: Array2<f64>) -> Result<Self> {
        self.check_shape("top", top.dim())?;
        self.top = top;
        Ok(self)
    }

    pub fn with_ibound(mut self, ibound: Array2<i32>) -> Result<Self> {
        self.check_shape("ibound", ibound.dim())?;
        self.ibound = ibound;
        Ok(self)
    }

    fn check_shape(&self, name: &'static str, dim: (usize, usize)) -> Result<()> {
        if dim != (self.nrow, self.ncol) {
            return Err(Error::InvalidParameter {
                name,
                value: format!("{:?}", dim),
                reason: format!("expected shape ({}, {})", self.nrow, self.ncol),
            });
        }
        Ok(())
    }

    /// GDAL-order geotransform of the grid
    pub fn geotransform(&self) -> GeoTransform {
        GeoTransform::new(
            self.xoffset,
            self.yoffset + self.delc * self.nrow as f64,
            self.delr,
            -self.delc,
        )
    }

    /// Rectangle covered by cell (row, col)
    pub fn cell_rect(&self, row: usize, col: usize) -> ClipRect {
        let top = self.yoffset + self.delc * (self.nrow - row) as f64;
        let left = self.xoffset + self.delr * col as f64;
        ClipRect::new(left, top - self.delc, left + self.delr, top)
    }

    /// Rectangle covered by the whole grid
    pub fn extent(&self) -> ClipRect {
        ClipRect::new(
            self.xoffset,
            self.yoffset,
            self.xoffset + self.delr * self.ncol as f64,
            self.yoffset + self.delc * self.nrow as f64,
        )
    }

    pub fn is_active(&self, row: usize, col: usize) -> bool {
        self.ibound[[row, col]] != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grid() -> ModelGrid {
        ModelGrid::new(3, 2, 20.0, 20.0, 30.0, 70.0).unwrap()
    }

    #[test]
    fn test_geotransform() {
        let g = grid();
        assert_eq!(g.geotransform().to_gdal(), [30.0, 20.0, 0.0, 130.0, 0.0, -20.0]);
        let back = ModelGrid::from_geotransform(&g.geotransform(), 3, 2).unwrap();
        assert_eq!(back, g);

        let mut rotated = g.geotransform();
        rotated.row_rotation = 0.5;
        assert!(ModelGrid::from_geotransform(&rotated, 3, 2).is_err());
    }

    #[test]
    fn test_cells_and_extent() {
        let g = grid();
        assert_eq!(g.extent(), ClipRect::new(30.0, 70.0, 70.0, 130.0));
        assert_eq!(g.cell_rect(0, 0), ClipRect::new(30.0, 110.0, 50.0, 130.0));
        assert_eq!(g.cell_rect(2, 1), ClipRect::new(50.0, 70.0, 70.0, 90.0));
        assert!(g.is_active(1, 1));
    }

    #[test]
    fn test_from_spacing() {
        let g = ModelGrid::from_spacing(&[20.0, 20.0], &[20.0; 3], 30.0, 70.0).unwrap();
        assert_eq!(g, grid());
        let err = ModelGrid::from_spacing(&[20.0, 10.0], &[20.0; 3], 0.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("delr not uniform"));
        let err = ModelGrid::from_spacing(&[20.0], &[20.0, 5.0], 0.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("delc not uniform"));
    }

    #[test]
    fn test_from_raster() {
        let mut raster = Raster::from_vec(vec![15.0, 14.0, 13.0, -9999.0, 11.0, 10.0], 3, 2)
            .unwrap()
            .with_transform(GeoTransform::new(30.0, 130.0, 20.0, -20.0));
        raster.set_nodata(Some(-9999.0));
        let g = ModelGrid::from_raster(&raster).unwrap();
        assert_relative_eq!(g.yoffset, 70.0);
        assert_eq!(g.top[[2, 1]], 10.0);
        assert!(!g.is_active(1, 1));
        assert!(g.is_active(1, 0));
    }

    #[test]
    fn test_invalid() {
        assert!(ModelGrid::new(0, 2, 1.0, 1.0, 0.0, 0.0).is_err());
        assert!(ModelGrid::new(2, 2, 0.0, 1.0, 0.0, 0.0).is_err());
        assert!(grid().with_top(Array2::zeros((2, 2))).is_err());
        let err = "thaw".parse::<IboundAction>().unwrap_err();
        assert!(err.to_string().contains("ibound_action must be one of freeze or modify"));
        assert_eq!("modify".parse::<IboundAction>().unwrap(), IboundAction::Modify);
    }
}
