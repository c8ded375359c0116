//! Sink filling for hydrological analysis
//!
//! Removes every interior local minimum of a DEM. A pit (a cell not higher
//! than any of its neighbors) is raised to `lowest neighbor + epsilon`.
//! Raising a cell can turn its neighbors into pits, so each raised cell is
//! pushed on an explicit stack and its neighbors are re-examined depth-first,
//! starting with the direction of its lowest neighbor. Repeated raising
//! fills whole depressions up to their spill level with a slope of
//! `epsilon` per cell toward the outlet.
//!
//! A cell has at most one frame on the stack. Raising a cell whose frame is
//! still pending restarts that frame instead of pushing another, so the
//! stack never holds more frames than the grid has cells, however deep the
//! depression is compared to `epsilon`.
//!
//! Cells on the outer ring and cells touching no-data drain off the data
//! and are never raised.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use talweg_core::progress::{checkpoint, NoProgress, Progress};
use talweg_core::raster::{d8, Raster};
use talweg_core::{Algorithm, Error, Result};
use tracing::debug;

/// Parameters for sink filling
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FillSinksParams {
    /// Height added above the lowest neighbor when a pit is raised (> 0)
    pub epsilon: f64,
}

impl Default for FillSinksParams {
    fn default() -> Self {
        Self { epsilon: 0.01 }
    }
}

impl FillSinksParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(Error::not_positive("epsilon", self.epsilon));
        }
        Ok(())
    }
}

/// Outputs of sink filling
#[derive(Debug, Clone)]
pub struct FillSinksResult {
    /// DEM without interior pits
    pub filled: Raster<f64>,
    /// `filled - dem`: fill depth, 0 where unchanged, NaN on no-data
    pub sinks: Raster<f64>,
}

/// Fill sinks algorithm
#[derive(Debug, Clone, Default)]
pub struct FillSinks;

impl Algorithm for FillSinks {
    type Input = Raster<f64>;
    type Output = FillSinksResult;
    type Params = FillSinksParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Fill Sinks"
    }

    fn description(&self) -> &'static str {
        "Raise pits above their lowest neighbor until no interior depression remains"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fill_sinks(&input, params)
    }
}

/// One pending cell of the depth-first walk
#[derive(Debug, Clone, Copy)]
struct Frame {
    row: usize,
    col: usize,
    /// Direction examined first (the lowest neighbor)
    start: usize,
    /// Directions examined so far
    step: usize,
}

/// Stack slot of cells without a pending frame
const NO_FRAME: usize = usize::MAX;

struct Filler {
    w: Array2<f64>,
    fillable: Array2<bool>,
    /// Stack position of each cell's pending frame
    slot: Array2<usize>,
    stack: Vec<Frame>,
    epsilon: f64,
    raised: usize,
    deepest: usize,
}

impl Filler {
    fn new(dem: &Raster<f64>, epsilon: f64) -> Self {
        let (rows, cols) = dem.shape();

        // Interior cells whose whole neighborhood is valid
        let mut fillable = Array2::from_elem((rows, cols), false);
        for row in 0..rows {
            for col in 0..cols {
                fillable[(row, col)] = !dem.is_border(row, col)
                    && dem.is_valid(row, col)
                    && (0..d8::COUNT).all(|dir| dem.valid_neighbor(row, col, dir).is_some());
            }
        }

        Self {
            w: dem.data().clone(),
            fillable,
            slot: Array2::from_elem((rows, cols), NO_FRAME),
            stack: Vec::new(),
            epsilon,
            raised: 0,
            deepest: 0,
        }
    }

    /// Row-major scan, draining the stack after every raised cell
    fn fill<P: Progress + ?Sized>(&mut self, progress: &mut P) -> Result<()> {
        let (rows, cols) = self.w.dim();
        for row in 1..rows.saturating_sub(1) {
            checkpoint(progress, row, rows)?;
            for col in 1..cols.saturating_sub(1) {
                if let Some(frame) = self.try_raise(row, col) {
                    self.schedule(frame);
                    self.drain_stack();
                }
            }
        }
        checkpoint(progress, rows, rows)
    }

    /// Lowest neighbor (direction, value) of an interior cell
    fn lowest_neighbor(&self, row: usize, col: usize) -> (usize, f64) {
        let mut best = (0, f64::INFINITY);
        for (dir, &(dr, dc)) in d8::OFFSETS.iter().enumerate() {
            let nr = (row as isize + dr) as usize;
            let nc = (col as isize + dc) as usize;
            let z = self.w[(nr, nc)];
            if z < best.1 {
                best = (dir, z);
            }
        }
        best
    }

    /// Raise (row, col) if it is a pit. Returns the frame to explore next.
    fn try_raise(&mut self, row: usize, col: usize) -> Option<Frame> {
        if !self.fillable[(row, col)] {
            return None;
        }
        let (dir, lowest) = self.lowest_neighbor(row, col);
        if self.w[(row, col)] > lowest {
            return None;
        }
        self.w[(row, col)] = raise_above(lowest, self.epsilon);
        self.raised += 1;
        Some(Frame {
            row,
            col,
            start: dir,
            step: 0,
        })
    }

    /// Push `frame`, or restart the cell's pending frame
    fn schedule(&mut self, frame: Frame) {
        let cell = (frame.row, frame.col);
        match self.slot[cell] {
            NO_FRAME => {
                self.slot[cell] = self.stack.len();
                self.stack.push(frame);
                self.deepest = self.deepest.max(self.stack.len());
            }
            pending => self.stack[pending] = frame,
        }
    }

    fn drain_stack(&mut self) {
        while let Some(top) = self.stack.last_mut() {
            if top.step == d8::COUNT {
                self.slot[(top.row, top.col)] = NO_FRAME;
                self.stack.pop();
                continue;
            }
            let dir = (top.start + top.step) % d8::COUNT;
            top.step += 1;

            let (dr, dc) = d8::OFFSETS[dir];
            let nr = (top.row as isize + dr) as usize;
            let nc = (top.col as isize + dc) as usize;

            if let Some(frame) = self.try_raise(nr, nc) {
                self.schedule(frame);
            }
        }
    }
}

/// `value + epsilon`, or the next float up when epsilon is lost to rounding
fn raise_above(value: f64, epsilon: f64) -> f64 {
    let raised = value + epsilon;
    if raised > value {
        raised
    } else if value == 0.0 {
        f64::from_bits(1)
    } else if value > 0.0 {
        f64::from_bits(value.to_bits() + 1)
    } else {
        f64::from_bits(value.to_bits() - 1)
    }
}

/// Fill sinks in a DEM.
///
/// # Arguments
/// * `dem` - Input DEM raster
/// * `params` - Fill increment
///
/// # Returns
/// The filled DEM and the fill depth grid
pub fn fill_sinks(dem: &Raster<f64>, params: FillSinksParams) -> Result<FillSinksResult> {
    fill_sinks_with_progress(dem, params, &mut NoProgress)
}

/// [`fill_sinks`] with progress reporting (once per row) and cancellation.
pub fn fill_sinks_with_progress<P: Progress + ?Sized>(
    dem: &Raster<f64>,
    params: FillSinksParams,
    progress: &mut P,
) -> Result<FillSinksResult> {
    params.validate()?;
    let (rows, cols) = dem.shape();
    debug!(rows, cols, epsilon = params.epsilon, "fill sinks");

    let mut filler = Filler::new(dem, params.epsilon);
    filler.fill(progress)?;

    let mut sinks = dem.like(0.0);
    sinks.set_nodata(Some(f64::NAN));
    let mut sink_cells = 0usize;
    for ((row, col), z) in dem.data().indexed_iter() {
        let depth = if dem.is_nodata(*z) {
            f64::NAN
        } else {
            filler.w[(row, col)] - z
        };
        if depth > 0.0 {
            sink_cells += 1;
        }
        sinks.data_mut()[(row, col)] = depth;
    }
    debug!(
        sink_cells,
        raised = filler.raised,
        deepest_stack = filler.deepest,
        "fill sinks done"
    );

    let mut filled = dem.like(0.0);
    *filled.data_mut() = filler.w;

    Ok(FillSinksResult { filled, sinks })
}
