//! D8 neighborhood shared by every flow tool
//!
//! Direction encoding, counter-clockwise from east with rows growing
//! southwards:
//! ```text
//!   3  2  1
//!   4  .  0
//!   5  6  7
//! ```
//! Steepest-descent ties are resolved by this order: the lowest index wins.

use std::f64::consts::SQRT_2;

/// Number of D8 neighbors
pub const COUNT: usize = 8;

/// Direction offsets: (row_offset, col_offset), indexed by direction
pub const OFFSETS: [(isize, isize); COUNT] = [
    (0, 1),   // 0: E
    (-1, 1),  // 1: NE
    (-1, 0),  // 2: N
    (-1, -1), // 3: NW
    (0, -1),  // 4: W
    (1, -1),  // 5: SW
    (1, 0),   // 6: S
    (1, 1),   // 7: SE
];

/// Step length in cells: 1 for cardinal, sqrt(2) for diagonal directions
pub const DISTANCES: [f64; COUNT] = [1.0, SQRT_2, 1.0, SQRT_2, 1.0, SQRT_2, 1.0, SQRT_2];

/// Raster encoding of "no downhill neighbor"
pub const NO_FLOW: i8 = -1;

/// Direction pointing back at the cell we came from
#[inline]
pub fn opposite(dir: usize) -> usize {
    (dir + 4) % COUNT
}

/// Neighbor of (row, col) in direction `dir`, or `None` off the grid
#[inline]
pub fn neighbor(row: usize, col: usize, dir: usize, rows: usize, cols: usize) -> Option<(usize, usize)> {
    let (dr, dc) = OFFSETS[dir];
    let nr = row as isize + dr;
    let nc = col as isize + dc;
    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
        None
    } else {
        Some((nr as usize, nc as usize))
    }
}

/// Decode a direction raster value
#[inline]
pub fn decode(code: i8) -> Option<usize> {
    if (0..COUNT as i8).contains(&code) {
        Some(code as usize)
    } else {
        None
    }
}

/// Encode an optional direction for a direction raster
#[inline]
pub fn encode(dir: Option<usize>) -> i8 {
    dir.map_or(NO_FLOW, |d| d as i8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite() {
        assert_eq!(opposite(0), 4); // E -> W
        assert_eq!(opposite(2), 6); // N -> S
        assert_eq!(opposite(1), 5); // NE -> SW
        assert_eq!(opposite(7), 3); // SE -> NW
    }

    #[test]
    fn test_offsets_are_opposite_pairs() {
        for dir in 0..COUNT {
            let (dr, dc) = OFFSETS[dir];
            let (or, oc) = OFFSETS[opposite(dir)];
            assert_eq!((dr + or, dc + oc), (0, 0));
        }
    }

    #[test]
    fn test_neighbor_clips_at_edges() {
        assert_eq!(neighbor(0, 0, 2, 3, 3), None);
        assert_eq!(neighbor(0, 0, 7, 3, 3), Some((1, 1)));
        assert_eq!(neighbor(2, 2, 0, 3, 3), None);
    }

    #[test]
    fn test_encode_roundtrip() {
        assert_eq!(decode(encode(None)), None);
        assert_eq!(decode(encode(Some(5))), Some(5));
        assert_eq!(decode(9), None);
    }
}
