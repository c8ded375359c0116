//! # Talweg Algorithms
//!
//! Drainage routing tools for Talweg.
//!
//! - **hydrology**: flow direction (D8, MFD), sink filling, flow path
//!   length, flow distance to channels, Melton ruggedness

pub mod hydrology;
mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::hydrology::{
        fill_sinks, flow_direction, flow_distance, flow_length, melton_ruggedness,
        FillSinks, FillSinksParams, FlowDirection, FlowDistance, FlowDistanceParams,
        FlowLength, FlowLengthParams, FlowRouting, MeltonRuggedness,
    };
    pub use talweg_core::prelude::*;
}
