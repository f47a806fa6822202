//! # swn-algorithms
//!
//! Surface water network analysis.
//!
//! ## Modules
//!
//! - **network**: build a stream network from line segments, evaluate its
//!   topology, query, aggregate and adjust it
//! - **spatial**: R*-tree index, raster draping and rectangle clipping
//! - **modflow**: MODFLOW SFR reaches and segment data from a network

pub mod maybe_rayon;
pub mod modflow;
pub mod network;
pub mod spatial;
pub mod util;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::modflow::{
        IboundAction, ModelGrid, SegmentDataParams, SegmentField, SegmentSelection, SfrNetwork, SfrParams,
    };
    pub use crate::network::{
        AggregateFollow, BuildNetwork, Diversion, DiversionInput, NetworkInput, NetworkParams, PairMethod, ProfileParams,
        Segment, SegmentValues, SurfaceWaterNetwork, WidthParams,
    };
    pub use crate::spatial::{interp_2d_to_3d, SpatialIndex};
    pub use swn_core::prelude::*;
}
