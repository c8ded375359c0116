//! # Talweg Core
//!
//! Core types shared by the Talweg drainage tools.
//!
//! This crate provides:
//! - `Raster<T>`: generic raster grid with no-data handling and D8
//!   neighbor addressing
//! - `SortedIndex`: value-ordered traversal of raster cells
//! - `Progress`: progress reporting with cooperative cancellation
//! - `Algorithm`: common trait implemented by every tool
//! - Native GeoTIFF reading and writing

pub mod error;
pub mod io;
pub mod progress;
pub mod raster;

pub use error::{Error, Result};
pub use progress::{NoProgress, Progress};
pub use raster::{GeoTransform, Raster, RasterElement, SortOrder, SortedIndex};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::progress::{NoProgress, Progress};
    pub use crate::raster::{d8, GeoTransform, Raster, RasterElement, SortOrder, SortedIndex};
    pub use crate::Algorithm;
}

/// Core trait for all tools in Talweg.
///
/// A tool is a pure function from input rasters and parameters to output
/// rasters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
