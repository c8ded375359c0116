//! Progress reporting and cooperative cancellation
//!
//! Long-running tools call [`Progress::update`] once per outer iteration.
//! Returning `false` asks the tool to stop; it then returns
//! [`Error::Cancelled`](crate::Error::Cancelled).

use crate::error::{Error, Result};

/// Receiver of progress updates.
pub trait Progress {
    /// Report `done` out of `total` steps. Return `false` to cancel.
    fn update(&mut self, done: usize, total: usize) -> bool;
}

/// Progress sink that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&mut self, _done: usize, _total: usize) -> bool {
        true
    }
}

impl<F> Progress for F
where
    F: FnMut(usize, usize) -> bool,
{
    fn update(&mut self, done: usize, total: usize) -> bool {
        self(done, total)
    }
}

/// Turn a cancellation request into `Err(Error::Cancelled)`.
#[inline]
pub fn checkpoint<P: Progress + ?Sized>(progress: &mut P, done: usize, total: usize) -> Result<()> {
    if progress.update(done, total) {
        Ok(())
    } else {
        Err(Error::Cancelled)
    }
}
