//! Flow routing strategy shared by the accumulation tools
//!
//! The user picks a [`FlowRouting`] method; a tool resolves it once per run
//! into a [`Router`], which answers "where does this cell's flow go, and in
//! what share" for every cell.

use super::flow_direction::{direction_grid, flow_direction, steepest_descent, steepest_descent_where};
use super::flow_direction_mfd::{
    flow_fractions, fraction_grid, mfd_partition, mfd_partition_where, validate_convergence,
    FlowFractions, MfdParams,
};
use serde::{Deserialize, Serialize};
use talweg_core::raster::{d8, Raster, RasterElement};
use talweg_core::Result;

/// Flow routing method
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum FlowRouting {
    /// All flow to the steepest downslope neighbor
    #[default]
    D8,
    /// Flow split among all downslope neighbors
    Mfd {
        /// Convergence exponent, must be > 0
        convergence: f64,
    },
}

impl FlowRouting {
    /// MFD with the default convergence of 1.1
    pub fn mfd() -> Self {
        FlowRouting::Mfd {
            convergence: MfdParams::default().convergence,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            FlowRouting::D8 => Ok(()),
            FlowRouting::Mfd { convergence } => validate_convergence(*convergence),
        }
    }

    /// Precompute routing for `dem`
    pub fn router(&self, dem: &Raster<f64>) -> Result<Router> {
        self.validate()?;
        Ok(match *self {
            FlowRouting::D8 => Router::D8(flow_direction(dem)?),
            FlowRouting::Mfd { convergence } => {
                Router::Mfd(flow_fractions(dem, MfdParams { convergence })?)
            }
        })
    }

    /// Precompute routing for `dem`, preferring valid cells of `route`.
    ///
    /// D8 picks the steepest lower neighbor that is a route cell and falls
    /// back to the steepest of all. MFD splits flow among lower route cells,
    /// or among all lower neighbors when no route cell is below.
    pub fn router_preferring<R: RasterElement>(
        &self,
        dem: &Raster<f64>,
        route: &Raster<R>,
    ) -> Result<Router> {
        self.validate()?;
        dem.ensure_same_shape(route)?;
        let on_route = |row: usize, col: usize| route.is_valid(row, col);

        Ok(match *self {
            FlowRouting::D8 => Router::D8(direction_grid(dem, |row, col| {
                steepest_descent_where(dem, row, col, on_route)
                    .or_else(|| steepest_descent(dem, row, col))
            })?),
            FlowRouting::Mfd { convergence } => Router::Mfd(fraction_grid(dem, |row, col| {
                let part = mfd_partition_where(dem, row, col, convergence, on_route);
                if part.drains() {
                    part
                } else {
                    mfd_partition(dem, row, col, convergence)
                }
            })),
        })
    }
}

/// Routing resolved against one DEM
#[derive(Debug, Clone)]
pub enum Router {
    D8(Raster<i8>),
    Mfd(FlowFractions),
}

impl Router {
    /// Outflow shares of (row, col) per direction.
    ///
    /// D8 yields a single 1.0; MFD the normalized partition. All zeros when
    /// the cell does not drain.
    pub fn outflow(&self, row: usize, col: usize) -> [f64; d8::COUNT] {
        match self {
            Router::D8(dirs) => {
                let mut out = [0.0; d8::COUNT];
                if let Some(dir) = d8::decode(unsafe { dirs.get_unchecked(row, col) }) {
                    out[dir] = 1.0;
                }
                out
            }
            Router::Mfd(fractions) => fractions.at(row, col).fractions,
        }
    }

    /// Share of (row, col)'s outflow sent in direction `dir`
    pub fn share(&self, row: usize, col: usize, dir: usize) -> f64 {
        match self {
            Router::D8(dirs) => {
                if d8::decode(unsafe { dirs.get_unchecked(row, col) }) == Some(dir) {
                    1.0
                } else {
                    0.0
                }
            }
            Router::Mfd(fractions) => fractions.fraction(row, col, dir),
        }
    }
}
