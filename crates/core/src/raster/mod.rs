//! Raster data structures and traversal

pub mod d8;
mod element;
mod geotransform;
mod grid;
mod sorted;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use sorted::{SortOrder, SortedIndex};
