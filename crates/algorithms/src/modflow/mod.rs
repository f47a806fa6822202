//! MODFLOW stream-flow routing (SFR) from a surface water network
//!
//! - `grid`: one-layer structured model grid with top and ibound
//! - `sfr`: reaches from line/cell intersections, including diversions
//! - `segment_data`: segment data rows and their setters
//! - `elevations`: minimum incision and downstream slope of segment ends

mod elevations;
mod grid;
mod segment_data;
mod sfr;

pub use grid::{IboundAction, ModelGrid};
pub use segment_data::{SegmentData, SegmentField, SegmentSelection};
pub use sfr::{Reach, SegmentDataParams, SfrNetwork, SfrParams};
