//! Hydrological analysis tools
//!
//! Drainage routing on a DEM:
//! - Flow direction: D8 steepest descent and MFD (FD8/Quinn) partitions
//! - Fill sinks: remove interior pits so every cell drains off the data
//! - Flow length: average flow path length from ridges or seed cells
//! - Flow distance: overland distance to a channel network
//! - Melton ruggedness: upslope relief over the root of upslope area

mod fill_sinks;
mod flow_direction;
mod flow_direction_mfd;
mod flow_distance;
mod flow_length;
mod melton;
mod routing;

pub use fill_sinks::{fill_sinks, fill_sinks_with_progress, FillSinks, FillSinksParams, FillSinksResult};
pub use flow_direction::{flow_direction, steepest_descent, FlowDirection};
pub use flow_direction_mfd::{flow_fractions, mfd_partition, FlowFractions, MfdParams, Partition};
pub use flow_distance::{
    flow_distance, flow_distance_with_progress, FlowDistance, FlowDistanceGrids, FlowDistanceParams,
    FlowDistanceResult,
};
pub use flow_length::{flow_length, flow_length_with_progress, FlowLength, FlowLengthParams};
pub use melton::{melton_ruggedness, melton_ruggedness_with_progress, MeltonResult, MeltonRuggedness};
pub use routing::{FlowRouting, Router};
