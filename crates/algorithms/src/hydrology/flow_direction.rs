//! D8 flow direction algorithm
//!
//! Calculates the direction of flow from each cell to its steepest
//! downslope neighbor using the D8 (deterministic eight-node) method.
//!
//! Flow direction encoding (see [`talweg_core::raster::d8`]):
//! ```text
//!   3  2  1
//!   4 -1  0
//!   5  6  7
//! ```
//! -1 = pit/flat/no-data (no outflow), 0-7 = direction to steepest neighbor

use crate::maybe_rayon::*;
use ndarray::Array2;
use talweg_core::raster::{d8, Raster};
use talweg_core::{Algorithm, Error, Result};

/// Flow direction algorithm (D8)
#[derive(Debug, Clone, Default)]
pub struct FlowDirection;

impl Algorithm for FlowDirection {
    type Input = Raster<f64>;
    type Output = Raster<i8>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Direction (D8)"
    }

    fn description(&self) -> &'static str {
        "Calculate D8 flow direction from a DEM"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        flow_direction(&input)
    }
}

/// Direction of steepest descent from (row, col).
///
/// Gradient to each valid neighbor is `(center - neighbor) / step_length`.
/// Returns the direction of the largest positive gradient; ties go to the
/// lowest direction index. `None` when the cell is no-data, off the grid,
/// or has no lower valid neighbor.
pub fn steepest_descent(dem: &Raster<f64>, row: usize, col: usize) -> Option<usize> {
    steepest_descent_where(dem, row, col, |_, _| true)
}

/// [`steepest_descent`] restricted to neighbors for which `accept` holds
pub(crate) fn steepest_descent_where(
    dem: &Raster<f64>,
    row: usize,
    col: usize,
    accept: impl Fn(usize, usize) -> bool,
) -> Option<usize> {
    if !dem.is_valid(row, col) {
        return None;
    }
    let center = unsafe { dem.get_unchecked(row, col) };

    let mut max_drop = 0.0_f64;
    let mut best = None;

    for dir in 0..d8::COUNT {
        let Some((nr, nc, neighbor)) = dem.valid_neighbor(row, col, dir) else {
            continue;
        };
        if !accept(nr, nc) {
            continue;
        }

        let drop = (center - neighbor) / dem.step_length(dir);
        if drop > max_drop {
            max_drop = drop;
            best = Some(dir);
        }
    }

    best
}

/// Calculate D8 flow direction from a DEM.
///
/// The input DEM should ideally be hydrologically conditioned (sinks filled)
/// for meaningful results.
///
/// # Returns
/// `Raster<i8>` with direction codes 0-7, or -1 where nothing drains out
pub fn flow_direction(dem: &Raster<f64>) -> Result<Raster<i8>> {
    direction_grid(dem, |row, col| steepest_descent(dem, row, col))
}

/// Direction raster built from a per-cell choice, rows in parallel
pub(crate) fn direction_grid<F>(dem: &Raster<f64>, pick: F) -> Result<Raster<i8>>
where
    F: Fn(usize, usize) -> Option<usize> + Sync + Send,
{
    let (rows, cols) = dem.shape();

    let output_data: Vec<i8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| d8::encode(pick(row, col)))
                .collect::<Vec<i8>>()
        })
        .collect();

    let mut output = dem.with_same_meta::<i8>(d8::NO_FLOW);
    *output.data_mut() = Array2::from_shape_vec((rows, cols), output_data)
        .map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}
