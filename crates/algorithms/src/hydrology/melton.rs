//! Melton ruggedness number
//!
//! MRN = (H_max - H) / sqrt(A), where A is the upslope contributing area of
//! a cell (its own area included) and H_max the highest elevation found in
//! that area. Both are routed downstream with D8, visiting cells from the
//! highest to the lowest.
//!
//! Reference:
//! Melton, M.A. (1965). The geomorphic and paleoclimatic significance of
//! alluvial deposits in southern Arizona. *Journal of Geology*, 73, 1–38.

use super::flow_direction::flow_direction;
use ndarray::Array2;
use talweg_core::progress::{checkpoint, NoProgress, Progress};
use talweg_core::raster::{d8, Raster, SortOrder};
use talweg_core::{Algorithm, Error, Result};
use tracing::debug;

/// Outputs of the Melton ruggedness tool
#[derive(Debug, Clone)]
pub struct MeltonResult {
    /// Upslope contributing area in map units squared
    pub area: Raster<f64>,
    /// Highest elevation upslope of each cell
    pub max_height: Raster<f64>,
    /// Melton ruggedness number
    pub ruggedness: Raster<f64>,
}

/// Melton ruggedness number tool
#[derive(Debug, Clone, Default)]
pub struct MeltonRuggedness;

impl Algorithm for MeltonRuggedness {
    type Input = Raster<f64>;
    type Output = MeltonResult;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Melton Ruggedness Number"
    }

    fn description(&self) -> &'static str {
        "Upslope relief divided by the square root of contributing area"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        melton_ruggedness(&input)
    }
}

/// Compute the Melton ruggedness number with D8 routing.
pub fn melton_ruggedness(dem: &Raster<f64>) -> Result<MeltonResult> {
    melton_ruggedness_with_progress(dem, &mut NoProgress)
}

/// [`melton_ruggedness`] with progress reporting and cancellation.
pub fn melton_ruggedness_with_progress<P: Progress + ?Sized>(
    dem: &Raster<f64>,
    progress: &mut P,
) -> Result<MeltonResult> {
    let (rows, cols) = dem.shape();
    let cell_area = dem.cell_area();
    debug!(rows, cols, cell_area, "melton ruggedness");

    let index = dem.sorted_index(SortOrder::Descending)?;
    let fdir = flow_direction(dem)?;

    let mut area = Array2::<f64>::zeros((rows, cols));
    let mut max_z = Array2::from_elem((rows, cols), f64::NEG_INFINITY);

    let total = index.len();
    let stride = cols.max(1);

    for (n, (row, col)) in index.iter().enumerate() {
        if n % stride == 0 {
            checkpoint(progress, n, total)?;
        }

        let z = unsafe { dem.get_unchecked(row, col) };
        area[(row, col)] += cell_area;
        max_z[(row, col)] = max_z[(row, col)].max(z);

        let Some(dir) = d8::decode(unsafe { fdir.get_unchecked(row, col) }) else {
            continue;
        };
        if let Some((nr, nc)) = dem.neighbor(row, col, dir) {
            area[(nr, nc)] += area[(row, col)];
            max_z[(nr, nc)] = max_z[(nr, nc)].max(max_z[(row, col)]);
        }
    }
    checkpoint(progress, total, total)?;

    let mut out_area = dem.with_same_meta::<f64>(f64::NAN);
    out_area.set_nodata(Some(f64::NAN));
    let mut out_max = out_area.clone();
    let mut out_rugged = out_area.clone();

    for (row, col) in index.iter() {
        let z = unsafe { dem.get_unchecked(row, col) };
        let a = area[(row, col)];
        let h = max_z[(row, col)];
        out_area.data_mut()[(row, col)] = a;
        out_max.data_mut()[(row, col)] = h;
        out_rugged.data_mut()[(row, col)] = (h - z) / a.sqrt();
    }

    Ok(MeltonResult {
        area: out_area,
        max_height: out_max,
        ruggedness: out_rugged,
    })
}
