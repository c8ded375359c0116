//! Raster file I/O
//!
//! Pure-Rust GeoTIFF reading and writing, enough to move single-band DEMs
//! and tool outputs in and out of the command-line tool.

mod native;

pub use native::{read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer};
