//! Spatial helpers
//!
//! - `SpatialIndex`: R*-tree over bounding boxes, with a linear scan for
//!   small inputs
//! - `interp_2d_to_3d`: drape 2D lines on a raster surface
//! - `clip_line_to_rect`: Cohen-Sutherland clipping of stream lines to
//!   grid cells

mod clip;
mod index;
mod interp;

pub use clip::{clip_line_to_rect, ClipRect};
pub use index::{line_bbox, Bbox, SpatialIndex, RTREE_THRESHOLD};
pub use interp::interp_2d_to_3d;

use swn_core::vector::LineStringZ;

/// Drop the Z dimension of each line
pub fn force_2d(lines: &[LineStringZ]) -> Vec<LineStringZ> {
    lines.iter().map(LineStringZ::force_2d).collect()
}

/// Round all coordinates of each line to `precision` decimal places
pub fn round_coords(lines: &[LineStringZ], precision: i32) -> Vec<LineStringZ> {
    lines.iter().map(|l| l.round(precision)).collect()
}
