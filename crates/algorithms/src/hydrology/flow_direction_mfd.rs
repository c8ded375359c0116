//! FD8/Quinn Multiple Flow Direction weights
//!
//! Distributes the outflow of a cell across ALL downslope neighbors instead
//! of sending it to the steepest one only.
//!
//! The flow fraction to neighbor i is:
//!   f_i = max(0, tan_i)^p / Σ max(0, tan_j)^p
//! where tan_i = (z - z_i) / step_i and p is the convergence exponent
//! (default 1.1). Higher p concentrates flow; p → ∞ approaches D8.
//!
//! References:
//! - Quinn, P. et al. (1991). The prediction of hillslope flow paths.
//!   *Hydrological Processes*, 5(1), 59–79.
//! - Freeman, T.G. (1991). Calculating catchment area with divergent flow
//!   based on a regular grid. *Computers & Geosciences*, 17(3), 413–422.

use crate::maybe_rayon::*;
use serde::{Deserialize, Serialize};
use talweg_core::raster::{d8, Raster};
use talweg_core::{Error, Result};

/// Parameters for MFD flow partitioning
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MfdParams {
    /// Convergence exponent (p), must be > 0. Default: 1.1
    pub convergence: f64,
}

impl Default for MfdParams {
    fn default() -> Self {
        Self { convergence: 1.1 }
    }
}

impl MfdParams {
    pub fn validate(&self) -> Result<()> {
        validate_convergence(self.convergence)
    }
}

pub(crate) fn validate_convergence(p: f64) -> Result<()> {
    if !(p.is_finite() && p > 0.0) {
        return Err(Error::not_positive("convergence", p));
    }
    Ok(())
}

/// Outflow partition of a single cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Partition {
    /// Fraction of outflow per direction; sums to 1 when `dz_sum > 0`
    pub fractions: [f64; d8::COUNT],
    /// Σ tan_i^p over downslope neighbors
    pub dz_sum: f64,
}

impl Partition {
    pub const EMPTY: Partition = Partition {
        fractions: [0.0; d8::COUNT],
        dz_sum: 0.0,
    };

    /// Whether any flow leaves the cell
    pub fn drains(&self) -> bool {
        self.dz_sum > 0.0
    }
}

/// MFD outflow partition of (row, col) for convergence exponent `p`.
///
/// No-data and off-grid neighbors receive nothing. A cell with no lower
/// neighbor (or a no-data cell) gets [`Partition::EMPTY`].
pub fn mfd_partition(dem: &Raster<f64>, row: usize, col: usize, p: f64) -> Partition {
    mfd_partition_where(dem, row, col, p, |_, _| true)
}

/// [`mfd_partition`] over the neighbors for which `accept` holds
pub(crate) fn mfd_partition_where(
    dem: &Raster<f64>,
    row: usize,
    col: usize,
    p: f64,
    accept: impl Fn(usize, usize) -> bool,
) -> Partition {
    if !dem.is_valid(row, col) {
        return Partition::EMPTY;
    }
    let z = unsafe { dem.get_unchecked(row, col) };

    let mut weights = [0.0_f64; d8::COUNT];
    let mut dz_sum = 0.0_f64;

    for (dir, weight) in weights.iter_mut().enumerate() {
        if let Some((nr, nc, nz)) = dem.valid_neighbor(row, col, dir) {
            if !accept(nr, nc) {
                continue;
            }
            let dz = (z - nz) / dem.step_length(dir);
            if dz > 0.0 {
                *weight = dz.powf(p);
                dz_sum += *weight;
            }
        }
    }

    if dz_sum > 0.0 {
        for w in weights.iter_mut() {
            *w /= dz_sum;
        }
        Partition {
            fractions: weights,
            dz_sum,
        }
    } else {
        Partition::EMPTY
    }
}

/// Precomputed MFD partitions for every cell of a DEM
#[derive(Debug, Clone)]
pub struct FlowFractions {
    cells: Vec<Partition>,
    cols: usize,
}

impl FlowFractions {
    /// Partition of (row, col)
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> &Partition {
        &self.cells[row * self.cols + col]
    }

    /// Fraction of (row, col)'s outflow sent in direction `dir`
    #[inline]
    pub fn fraction(&self, row: usize, col: usize, dir: usize) -> f64 {
        self.at(row, col).fractions[dir]
    }
}

/// Compute MFD partitions for the whole DEM.
///
/// Cells are independent of each other, so rows run in parallel when the
/// `parallel` feature is on.
pub fn flow_fractions(dem: &Raster<f64>, params: MfdParams) -> Result<FlowFractions> {
    params.validate()?;
    let p = params.convergence;
    Ok(fraction_grid(dem, |row, col| mfd_partition(dem, row, col, p)))
}

/// Partitions built from a per-cell rule, rows in parallel
pub(crate) fn fraction_grid<F>(dem: &Raster<f64>, partition: F) -> FlowFractions
where
    F: Fn(usize, usize) -> Partition + Sync + Send,
{
    let (rows, cols) = dem.shape();

    let cells: Vec<Partition> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            (0..cols)
                .map(|col| partition(row, col))
                .collect::<Vec<Partition>>()
        })
        .collect();

    FlowFractions { cells, cols }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn cone() -> Raster<f64> {
        // 3x3 with a high center and uneven rim
        Raster::from_vec(vec![4.0, 5.0, 6.0, 3.0, 10.0, 7.0, 2.0, 1.0, 8.0], 3, 3).unwrap()
    }

    #[test]
    fn test_fractions_sum_to_one() {
        let part = mfd_partition(&cone(), 1, 1, 1.1);
        assert!(part.drains());
        assert_relative_eq!(part.fractions.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(part.fractions.iter().all(|&f| f > 0.0));
    }

    #[test]
    fn test_only_downslope_neighbors_receive_flow() {
        let mut dem = cone();
        dem.set(0, 1, 12.0).unwrap(); // N now higher than center
        let part = mfd_partition(&dem, 1, 1, 1.1);
        assert_eq!(part.fractions[2], 0.0);
    }

    #[test]
    fn test_pit_gets_empty_partition() {
        let mut dem = Raster::filled(3, 3, 5.0);
        dem.set(1, 1, 1.0).unwrap();
        assert_eq!(mfd_partition(&dem, 1, 1, 1.1), Partition::EMPTY);
    }

    #[test]
    fn test_higher_convergence_concentrates_flow() {
        let dem = cone();
        let steepest = |p: f64| {
            mfd_partition(&dem, 1, 1, p)
                .fractions
                .iter()
                .cloned()
                .fold(0.0_f64, f64::max)
        };
        assert!(steepest(8.0) > steepest(1.1));
        assert!(steepest(1.1) > steepest(0.5));
    }

    #[test]
    fn test_invalid_convergence_rejected() {
        let dem = cone();
        for p in [0.0, -1.0, f64::NAN] {
            let err = flow_fractions(&dem, MfdParams { convergence: p }).unwrap_err();
            assert!(matches!(err, Error::InvalidParameter { name: "convergence", .. }));
        }
    }

    #[test]
    fn test_grid_matches_single_cell() {
        let dem = cone();
        let grid = flow_fractions(&dem, MfdParams::default()).unwrap();
        assert_eq!(*grid.at(1, 1), mfd_partition(&dem, 1, 1, 1.1));
        assert_eq!(grid.fraction(2, 1, 0), 0.0);
    }

    #[test]
    fn test_restricted_partition_renormalizes() {
        let dem = cone();
        // only the two bottom-left neighbors may receive
        let part = mfd_partition_where(&dem, 1, 1, 1.0, |r, c| r == 2 && c < 2);
        assert!(part.drains());
        assert_relative_eq!(part.fractions[5] + part.fractions[6], 1.0, epsilon = 1e-12);
        assert_eq!(part.fractions[0], 0.0);
        assert!(!mfd_partition_where(&dem, 1, 1, 1.0, |_, _| false).drains());
    }

    proptest! {
        #[test]
        fn fractions_are_normalized(
            values in proptest::collection::vec(0.0f64..100.0, 9),
            p in 0.1f64..10.0,
        ) {
            let dem = Raster::from_vec(values, 3, 3).unwrap();
            let part = mfd_partition(&dem, 1, 1, p);
            let sum: f64 = part.fractions.iter().sum();
            if part.drains() {
                prop_assert!((sum - 1.0).abs() < 1e-9);
            } else {
                prop_assert_eq!(sum, 0.0);
            }
        }
    }
}
