//! Main Raster type

use crate::error::{Error, Result};
use crate::raster::{d8, GeoTransform, RasterElement, SortOrder, SortedIndex};
use ndarray::Array2;

/// A georeferenced 2D raster grid.
///
/// Cells are addressed as (row, col), rows growing southwards. Besides plain
/// cell access the raster carries what the flow tools need: the no-data
/// test, D8 neighbor addressing with physical step lengths, and a
/// value-sorted traversal.
///
/// # Example
///
/// ```
/// use talweg_core::Raster;
///
/// let mut dem: Raster<f64> = Raster::new(10, 10);
/// dem.set(2, 3, 42.0)?;
/// assert_eq!(dem.get(2, 3)?, 42.0);
/// # Ok::<(), talweg_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    transform: GeoTransform,
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            nodata: None,
        }
    }

    /// Same shape and georeferencing, different cell type, filled with `fill`
    pub fn with_same_meta<U: RasterElement>(&self, fill: U) -> Raster<U> {
        Raster {
            data: Array2::from_elem(self.data.dim(), fill),
            transform: self.transform,
            nodata: None,
        }
    }

    /// Same shape, metadata and no-data value, filled with `fill_value`
    pub fn like(&self, fill_value: T) -> Self {
        Self {
            data: Array2::from_elem(self.data.dim(), fill_value),
            transform: self.transform,
            nodata: self.nodata,
        }
    }

    // Dimensions

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fail with `SizeMismatch` unless `other` has the same shape
    pub fn ensure_same_shape<U: RasterElement>(&self, other: &Raster<U>) -> Result<()> {
        let (er, ec) = self.shape();
        let (ar, ac) = other.shape();
        if (er, ec) != (ar, ac) {
            return Err(Error::SizeMismatch { er, ec, ar, ac });
        }
        Ok(())
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    #[inline]
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Mark (row, col) as no-data.
    ///
    /// Uses the configured sentinel, or installs the type's default one.
    pub fn set_nodata_at(&mut self, row: usize, col: usize) -> Result<()> {
        let nd = match self.nodata {
            Some(nd) => nd,
            None => {
                let nd = T::default_nodata();
                self.nodata = Some(nd);
                nd
            }
        };
        self.set(row, col, nd)
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    // Metadata

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    pub fn cell_area(&self) -> f64 {
        self.transform.cell_area()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    // Value checks

    /// Check if a value is no-data
    #[inline]
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Whether (row, col) lies on the grid and holds a valid value
    #[inline]
    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        row < self.rows() && col < self.cols() && {
            let v = unsafe { self.get_unchecked(row, col) };
            !self.is_nodata(v)
        }
    }

    // D8 neighborhood

    /// Neighbor of (row, col) in direction `dir`, ignoring no-data
    #[inline]
    pub fn neighbor(&self, row: usize, col: usize, dir: usize) -> Option<(usize, usize)> {
        d8::neighbor(row, col, dir, self.rows(), self.cols())
    }

    /// Neighbor in direction `dir` if it is on the grid and valid
    #[inline]
    pub fn valid_neighbor(&self, row: usize, col: usize, dir: usize) -> Option<(usize, usize, T)> {
        let (nr, nc) = self.neighbor(row, col, dir)?;
        let v = unsafe { self.get_unchecked(nr, nc) };
        if self.is_nodata(v) {
            None
        } else {
            Some((nr, nc, v))
        }
    }

    /// Physical length of one step in direction `dir`
    #[inline]
    pub fn step_length(&self, dir: usize) -> f64 {
        d8::DISTANCES[dir] * self.cell_size()
    }

    /// Whether (row, col) is on the outermost ring of cells
    #[inline]
    pub fn is_border(&self, row: usize, col: usize) -> bool {
        row == 0 || col == 0 || row + 1 >= self.rows() || col + 1 >= self.cols()
    }

    /// Valid cells ordered by value
    pub fn sorted_index(&self, order: SortOrder) -> Result<SortedIndex> {
        SortedIndex::build(self, order)
    }

    // Statistics

    /// Basic statistics (min, max, mean, count of valid cells)
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum: f64 = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }

            if min.map_or(true, |m| value < m) {
                min = Some(value);
            }
            if max.map_or(true, |m| value > m) {
                max = Some(value);
            }

            if let Some(v) = value.to_f64() {
                sum += v;
                count += 1;
            }
        }

        RasterStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f32> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<f64> = Raster::new(10, 10);
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_set_nodata_at_installs_default_sentinel() {
        let mut raster: Raster<f64> = Raster::new(3, 3);
        raster.set_nodata_at(1, 1).unwrap();
        assert!(!raster.is_valid(1, 1));
        assert!(raster.is_valid(0, 0));
        assert!(!raster.is_valid(3, 0));
    }

    #[test]
    fn test_valid_neighbor_skips_nodata_and_edges() {
        let mut raster: Raster<f64> = Raster::filled(3, 3, 1.0);
        raster.set(1, 2, f64::NAN).unwrap();
        assert!(raster.valid_neighbor(1, 1, 0).is_none()); // E is NaN
        assert_eq!(raster.valid_neighbor(1, 1, 6), Some((2, 1, 1.0))); // S
        assert!(raster.valid_neighbor(0, 0, 2).is_none()); // off grid
    }

    #[test]
    fn test_step_length_uses_cell_size() {
        let mut raster: Raster<f64> = Raster::new(3, 3);
        raster.set_transform(GeoTransform::with_cell_size(10.0));
        assert_eq!(raster.step_length(0), 10.0);
        assert!((raster.step_length(1) - 10.0 * std::f64::consts::SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn test_border() {
        let raster: Raster<f64> = Raster::new(4, 5);
        assert!(raster.is_border(0, 2));
        assert!(raster.is_border(3, 2));
        assert!(raster.is_border(2, 4));
        assert!(!raster.is_border(1, 1));
    }

    #[test]
    fn test_size_mismatch() {
        let a: Raster<f64> = Raster::new(3, 3);
        let b: Raster<u8> = Raster::new(3, 4);
        assert!(matches!(
            a.ensure_same_shape(&b),
            Err(Error::SizeMismatch { er: 3, ec: 3, ar: 3, ac: 4 })
        ));
    }

    #[test]
    fn test_raster_statistics() {
        let mut raster: Raster<f32> = Raster::new(10, 10);
        for i in 0..10 {
            for j in 0..10 {
                raster.set(i, j, (i * 10 + j) as f32).unwrap();
            }
        }
        raster.set(0, 0, f32::NAN).unwrap();

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(99.0));
        assert_eq!(stats.valid_count, 99);
        assert_eq!(stats.nodata_count, 1);
    }
}
