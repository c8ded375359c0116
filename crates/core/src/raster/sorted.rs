//! Value-sorted traversal of raster cells
//!
//! Flow accumulation visits cells from the highest to the lowest so that a
//! cell is only read after every cell draining into it has been processed.
//! Upstream-propagating tools walk the same index in the other direction.

use super::{Raster, RasterElement};
use crate::error::{Error, Result};
use std::cmp::Ordering;

/// Traversal direction of a [`SortedIndex`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Lowest value first
    Ascending,
    /// Highest value first
    Descending,
}

/// All valid cells of a raster ordered by value.
///
/// Equal values keep row-major order, so the traversal is deterministic.
/// No-data cells are not part of the index.
#[derive(Debug, Clone)]
pub struct SortedIndex {
    cells: Vec<(usize, usize)>,
}

impl SortedIndex {
    /// Build the index for `raster`.
    ///
    /// Fails when the raster has no valid cell at all.
    pub fn build<T: RasterElement>(raster: &Raster<T>, order: SortOrder) -> Result<Self> {
        let (rows, cols) = raster.shape();
        let mut keyed: Vec<(T, usize, usize)> = Vec::with_capacity(rows * cols);

        for row in 0..rows {
            for col in 0..cols {
                let value = unsafe { raster.get_unchecked(row, col) };
                if !raster.is_nodata(value) {
                    keyed.push((value, row, col));
                }
            }
        }

        if keyed.is_empty() {
            return Err(Error::Algorithm(
                "cannot build sorted index: raster has no valid cells".into(),
            ));
        }

        // sort_by is stable, so ties stay in row-major order
        match order {
            SortOrder::Ascending => {
                keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal))
            }
            SortOrder::Descending => {
                keyed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal))
            }
        }

        Ok(Self {
            cells: keyed.into_iter().map(|(_, r, c)| (r, c)).collect(),
        })
    }

    /// Number of indexed (valid) cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Iterate (row, col) in traversal order
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (usize, usize)> + '_ {
        self.cells.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Raster<f64> {
        let mut r = Raster::from_vec(vec![3.0, 1.0, f64::NAN, 2.0, 3.0, 0.5], 2, 3).unwrap();
        r.set_nodata(Some(f64::NAN));
        r
    }

    #[test]
    fn test_descending_skips_nodata_and_keeps_ties_row_major() {
        let idx = SortedIndex::build(&sample(), SortOrder::Descending).unwrap();
        let cells: Vec<_> = idx.iter().collect();
        assert_eq!(cells, vec![(0, 0), (1, 1), (1, 0), (0, 1), (1, 2)]);
    }

    #[test]
    fn test_ascending() {
        let idx = SortedIndex::build(&sample(), SortOrder::Ascending).unwrap();
        let cells: Vec<_> = idx.iter().collect();
        assert_eq!(idx.len(), 5);
        assert_eq!(cells.first(), Some(&(1, 2)));
        assert_eq!(cells.last(), Some(&(1, 1)));
    }

    #[test]
    fn test_all_nodata_fails() {
        let r: Raster<f64> = Raster::filled(3, 3, f64::NAN);
        let err = SortedIndex::build(&r, SortOrder::Descending).unwrap_err();
        assert!(matches!(err, Error::Algorithm(_)));
    }
}
