//! Overland flow distance to a channel network
//!
//! For every cell that drains into a channel, the distance travelled along
//! the flow path until the first channel cell is reached. Cells are visited
//! from the lowest to the highest: channel cells start at zero and each
//! finalized cell passes its distances *upstream* to the cells draining
//! into it. With MFD routing an upstream cell collects fraction-weighted
//! contributions from all its receivers and is normalized by the fraction
//! that actually reached a channel.
//!
//! Optional extras:
//! - a route grid whose valid cells are preferred as receivers
//! - overland travel time from Manning's equation, in hours:
//!   `v = k * R^(2/3) * sqrt(dz / dx)`, `dt = dx / (v * 3600)`, with the
//!   Manning-Strickler coefficient `k` and flow depth `R` taken at the
//!   receiving cell
//! - sediment delivery ratio `exp(-beta * time)`
//! - the number of field boundaries crossed on the way down (D8 only)

use super::routing::FlowRouting;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use talweg_core::progress::{checkpoint, NoProgress, Progress};
use talweg_core::raster::{d8, Raster, RasterElement, SortOrder};
use talweg_core::{Algorithm, Error, Result};
use tracing::{debug, trace};

/// Parameters for overland flow distance
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowDistanceParams {
    /// Routing method used to follow flow paths
    pub routing: FlowRouting,
    /// Only non-zero channel cells count, for 0/1 masks
    pub nonzero_channels: bool,
    /// Also compute travel time and sediment delivery ratio
    pub travel_time: bool,
    /// Manning-Strickler coefficient where no grid value is given. Default: 20
    pub manning_k: f64,
    /// Flow depth in metres where no grid value is given. Default: 0.05
    pub flow_depth: f64,
    /// Sediment delivery decay per hour of travel. Default: 1
    pub beta: f64,
}

impl Default for FlowDistanceParams {
    fn default() -> Self {
        Self {
            routing: FlowRouting::D8,
            nonzero_channels: false,
            travel_time: false,
            manning_k: 20.0,
            flow_depth: 0.05,
            beta: 1.0,
        }
    }
}

impl FlowDistanceParams {
    pub fn validate(&self) -> Result<()> {
        self.routing.validate()?;
        if !(self.manning_k.is_finite() && self.manning_k > 0.0) {
            return Err(Error::not_positive("manning_k", self.manning_k));
        }
        if !(self.flow_depth.is_finite() && self.flow_depth > 0.0) {
            return Err(Error::not_positive("flow_depth", self.flow_depth));
        }
        if !(self.beta.is_finite() && self.beta >= 0.0) {
            return Err(Error::InvalidParameter {
                name: "beta",
                value: self.beta.to_string(),
                reason: "must be finite and not negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Optional input grids, all matching the DEM's shape
#[derive(Debug, Clone, Copy, Default)]
pub struct FlowDistanceGrids<'a> {
    /// Valid cells are preferred as flow receivers
    pub route: Option<&'a Raster<f64>>,
    /// Field ids; crossings are counted into `passes`
    pub fields: Option<&'a Raster<f64>>,
    /// Per-cell Manning-Strickler coefficient
    pub manning_k: Option<&'a Raster<f64>>,
    /// Per-cell flow depth
    pub flow_depth: Option<&'a Raster<f64>>,
}

/// Outputs of the flow distance tool, NaN where no channel is reached
#[derive(Debug, Clone)]
pub struct FlowDistanceResult {
    /// Length along the surface, Σ sqrt(dx² + dz²)
    pub distance: Raster<f64>,
    /// Horizontal length, Σ dx
    pub horizontal: Raster<f64>,
    /// Height above the channel cell reached, Σ dz
    pub vertical: Raster<f64>,
    /// Travel time in hours, when requested
    pub time: Option<Raster<f64>>,
    /// Sediment delivery ratio, when travel time is requested
    pub sdr: Option<Raster<f64>>,
    /// Field boundaries crossed, -1 where no channel is reached
    pub passes: Option<Raster<i32>>,
}

/// Overland flow distance tool
#[derive(Debug, Clone, Default)]
pub struct FlowDistance;

impl Algorithm for FlowDistance {
    /// DEM and channel grid
    type Input = (Raster<f64>, Raster<f64>);
    type Output = FlowDistanceResult;
    type Params = FlowDistanceParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Overland Flow Distance"
    }

    fn description(&self) -> &'static str {
        "Flow path distance from each cell to the channel network it drains into"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (dem, channels) = input;
        flow_distance(&dem, &channels, params)
    }
}

/// Compute overland flow distance to the channel network.
///
/// # Arguments
/// * `dem` - Elevation raster
/// * `channels` - Channel grid: every valid cell is a channel cell, or only
///   the non-zero ones with `nonzero_channels`
/// * `params` - Routing method and travel time constants
pub fn flow_distance<S: RasterElement>(
    dem: &Raster<f64>,
    channels: &Raster<S>,
    params: FlowDistanceParams,
) -> Result<FlowDistanceResult> {
    flow_distance_with_progress(
        dem,
        channels,
        FlowDistanceGrids::default(),
        params,
        &mut NoProgress,
    )
}

/// Value of `grid` at (row, col), or `fallback` when absent or no-data
fn cell_or(grid: Option<&Raster<f64>>, row: usize, col: usize, fallback: f64) -> f64 {
    match grid {
        Some(g) if g.is_valid(row, col) => unsafe { g.get_unchecked(row, col) },
        _ => fallback,
    }
}

/// Hours needed to flow `dx` down a drop of `dz` (Manning-Strickler)
fn travel_hours(dx: f64, dz: f64, k: f64, depth: f64) -> f64 {
    if dz <= 0.0 {
        return 0.0;
    }
    let v = k * depth.powf(2.0 / 3.0) * (dz / dx).sqrt();
    dx / (v * 3600.0)
}

/// [`flow_distance`] with optional input grids, progress reporting and
/// cancellation.
pub fn flow_distance_with_progress<S, P>(
    dem: &Raster<f64>,
    channels: &Raster<S>,
    grids: FlowDistanceGrids<'_>,
    params: FlowDistanceParams,
    progress: &mut P,
) -> Result<FlowDistanceResult>
where
    S: RasterElement,
    P: Progress + ?Sized,
{
    params.validate()?;
    dem.ensure_same_shape(channels)?;
    for grid in [grids.fields, grids.manning_k, grids.flow_depth]
        .into_iter()
        .flatten()
    {
        dem.ensure_same_shape(grid)?;
    }
    if grids.fields.is_some() && params.routing != FlowRouting::D8 {
        return Err(Error::InvalidParameter {
            name: "fields",
            value: format!("{:?}", params.routing),
            reason: "field passes need D8 routing".to_string(),
        });
    }

    let (rows, cols) = dem.shape();
    debug!(
        rows,
        cols,
        routing = ?params.routing,
        route = grids.route.is_some(),
        travel_time = params.travel_time,
        fields = grids.fields.is_some(),
        "flow distance"
    );

    let router = match grids.route {
        Some(route) => params.routing.router_preferring(dem, route)?,
        None => params.routing.router(dem)?,
    };
    let index = dem.sorted_index(SortOrder::Ascending)?;
    trace!(cells = index.len(), "routing resolved, index built");

    // Running sums (distance, horizontal, vertical, time) and the routed weight
    let mut sums = Array2::from_elem((rows, cols), [0.0_f64; 4]);
    let mut weight = Array2::<f64>::zeros((rows, cols));
    let mut crossings = Array2::<i32>::zeros((rows, cols));

    let mut distance = dem.with_same_meta::<f64>(f64::NAN);
    distance.set_nodata(Some(f64::NAN));
    let mut horizontal = distance.clone();
    let mut vertical = distance.clone();
    let mut time = distance.clone();
    let mut passes = dem.with_same_meta::<i32>(-1);
    passes.set_nodata(Some(-1));

    let is_channel = |row: usize, col: usize| {
        channels.is_valid(row, col)
            && (!params.nonzero_channels
                || unsafe { channels.get_unchecked(row, col) }.to_f64() != Some(0.0))
    };
    let field = |row: usize, col: usize| {
        grids
            .fields
            .filter(|f| f.is_valid(row, col))
            .map(|f| unsafe { f.get_unchecked(row, col) })
    };

    let total = index.len();
    let stride = cols.max(1);
    let mut reached = 0usize;

    for (n, (row, col)) in index.iter().enumerate() {
        if n % stride == 0 {
            checkpoint(progress, n, total)?;
        }

        let here = if is_channel(row, col) {
            crossings[(row, col)] = 0;
            [0.0; 4]
        } else if weight[(row, col)] > 0.0 {
            let w = weight[(row, col)];
            sums[(row, col)].map(|s| s / w)
        } else {
            continue;
        };
        reached += 1;

        distance.data_mut()[(row, col)] = here[0];
        horizontal.data_mut()[(row, col)] = here[1];
        vertical.data_mut()[(row, col)] = here[2];
        time.data_mut()[(row, col)] = here[3];
        passes.data_mut()[(row, col)] = crossings[(row, col)];

        let z = unsafe { dem.get_unchecked(row, col) };
        let k = cell_or(grids.manning_k, row, col, params.manning_k);
        let depth = cell_or(grids.flow_depth, row, col, params.flow_depth);

        for dir in 0..d8::COUNT {
            let Some((ur, uc, uz)) = dem.valid_neighbor(row, col, dir) else {
                continue;
            };
            let share = router.share(ur, uc, d8::opposite(dir));
            if share <= 0.0 {
                continue;
            }
            let dx = dem.step_length(dir);
            let dz = uz - z;
            let dt = if params.travel_time {
                travel_hours(dx, dz, k, depth)
            } else {
                0.0
            };
            let step = [(dx * dx + dz * dz).sqrt(), dx, dz, dt];

            for ((acc, h), s) in sums[(ur, uc)].iter_mut().zip(here).zip(step) {
                *acc += share * (h + s);
            }
            weight[(ur, uc)] += share;

            // D8 only: every upstream cell has this single receiver
            if grids.fields.is_some() {
                let crossed = field(row, col) != field(ur, uc);
                crossings[(ur, uc)] = crossings[(row, col)] + i32::from(crossed);
            }
        }
    }
    checkpoint(progress, total, total)?;

    debug!(reached, "flow distance done");

    let (time, sdr) = if params.travel_time {
        let mut sdr = time.clone();
        sdr.data_mut().mapv_inplace(|t| (-params.beta * t).exp());
        (Some(time), Some(sdr))
    } else {
        (None, None)
    };

    Ok(FlowDistanceResult {
        distance,
        horizontal,
        vertical,
        time,
        sdr,
        passes: grids.fields.map(|_| passes),
    })
}
