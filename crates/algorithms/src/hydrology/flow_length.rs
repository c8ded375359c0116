//! Flow path length
//!
//! Average length of the flow paths reaching each cell, measured from the
//! ridge (or from user-supplied seed cells) downstream.
//!
//! Cells are visited from the highest to the lowest, so every cell draining
//! into another one has been finalized before the receiver is read. Each
//! cell hands `(own length + step) × share` to its receivers and remembers
//! the shares it received; a receiver's length is the share-weighted mean of
//! what arrived. With D8 routing the share is always 1, so a cell fed by
//! several upstream paths gets their plain average.

use super::routing::FlowRouting;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use talweg_core::progress::{checkpoint, NoProgress, Progress};
use talweg_core::raster::{Raster, RasterElement, SortOrder};
use talweg_core::{Algorithm, Error, Result};
use tracing::{debug, trace};

/// Parameters for flow path length
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowLengthParams {
    /// Routing method used to pass length downstream
    pub routing: FlowRouting,
    /// Only trace paths starting at seed cells; everything else is no-data
    pub seeds_only: bool,
}

impl FlowLengthParams {
    pub fn validate(&self) -> Result<()> {
        self.routing.validate()
    }
}

/// Flow path length tool
#[derive(Debug, Clone, Default)]
pub struct FlowLength;

impl Algorithm for FlowLength {
    /// DEM and optional seed grid
    type Input = (Raster<f64>, Option<Raster<f64>>);
    type Output = Raster<f64>;
    type Params = FlowLengthParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Path Length"
    }

    fn description(&self) -> &'static str {
        "Average downslope flow path length from ridges or seed cells (D8 or MFD)"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (dem, seeds) = input;
        flow_length(&dem, seeds.as_ref(), params)
    }
}

/// Compute flow path length.
///
/// # Arguments
/// * `dem` - Elevation raster; fill sinks first for connected paths
/// * `seeds` - Optional grid of path starting points (valid, non-zero cells)
/// * `params` - Routing method and seeds-only flag
///
/// # Returns
/// Raster<f64> of path lengths in map units, NaN where undefined
pub fn flow_length<S: RasterElement>(
    dem: &Raster<f64>,
    seeds: Option<&Raster<S>>,
    params: FlowLengthParams,
) -> Result<Raster<f64>> {
    flow_length_with_progress(dem, seeds, params, &mut NoProgress)
}

/// [`flow_length`] with progress reporting and cancellation.
pub fn flow_length_with_progress<S, P>(
    dem: &Raster<f64>,
    seeds: Option<&Raster<S>>,
    params: FlowLengthParams,
    progress: &mut P,
) -> Result<Raster<f64>>
where
    S: RasterElement,
    P: Progress + ?Sized,
{
    params.validate()?;
    if let Some(seeds) = seeds {
        dem.ensure_same_shape(seeds)?;
    }

    let (rows, cols) = dem.shape();
    debug!(rows, cols, routing = ?params.routing, seeds_only = params.seeds_only, "flow length");

    let router = params.routing.router(dem)?;
    let index = dem.sorted_index(SortOrder::Descending)?;
    trace!(cells = index.len(), "routing resolved, index built");

    let mut length = Array2::<f64>::zeros((rows, cols));
    let mut weight = Array2::<f64>::zeros((rows, cols));

    let is_seed = |row: usize, col: usize| {
        seeds.map_or(false, |s| {
            s.is_valid(row, col) && unsafe { s.get_unchecked(row, col) }.to_f64() != Some(0.0)
        })
    };

    let total = index.len();
    let stride = cols.max(1);

    for (n, (row, col)) in index.iter().enumerate() {
        if n % stride == 0 {
            checkpoint(progress, n, total)?;
        }

        if is_seed(row, col) {
            length[(row, col)] = 0.0;
            weight[(row, col)] = 0.0;
        } else if weight[(row, col)] > 0.0 {
            length[(row, col)] /= weight[(row, col)];
        } else if params.seeds_only {
            length[(row, col)] = f64::NAN;
            continue;
        }

        let own = length[(row, col)];
        let shares = router.outflow(row, col);

        for (dir, &share) in shares.iter().enumerate() {
            if share <= 0.0 {
                continue;
            }
            if let Some((nr, nc)) = dem.neighbor(row, col, dir) {
                length[(nr, nc)] += (own + dem.step_length(dir)) * share;
                weight[(nr, nc)] += share;
            }
        }
    }
    checkpoint(progress, total, total)?;

    let mut output = dem.with_same_meta::<f64>(f64::NAN);
    output.set_nodata(Some(f64::NAN));
    for (row, col) in index.iter() {
        output.data_mut()[(row, col)] = length[(row, col)];
    }

    Ok(output)
}
