//! Pixel map storage for a fixed sky resolution.
//!
//! A `PixelMap` holds one scalar per sky cell at a given `n_side`. Every map
//! participating in a reduction run shares the same length and pixel
//! indexing, so the container carries its resolution and checks it whenever
//! maps are combined.

use ndarray::Array1;
use std::ops::{AddAssign, Index, IndexMut};
use thiserror::Error;

/// Number of sky cells at a given resolution parameter.
pub fn n_pix(n_side: u32) -> usize {
    12 * n_side as usize * n_side as usize
}

/// A map value list does not match the pixel count implied by its `n_side`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("map has {found} pixels, expected {expected} for n_side {n_side}")]
pub struct GeometryMismatch {
    pub n_side: u32,
    pub expected: usize,
    pub found: usize,
}

/// One scalar per sky cell at a fixed resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelMap {
    n_side: u32,
    values: Array1<f64>,
}

impl PixelMap {
    /// Allocate a zero-filled map at the given resolution.
    pub fn zeroed(n_side: u32) -> Self {
        Self {
            n_side,
            values: Array1::zeros(n_pix(n_side)),
        }
    }

    /// Wrap an existing value list, checking it against the resolution.
    pub fn from_values(n_side: u32, values: Vec<f64>) -> Result<Self, GeometryMismatch> {
        let expected = n_pix(n_side);
        if values.len() != expected {
            return Err(GeometryMismatch {
                n_side,
                expected,
                found: values.len(),
            });
        }
        Ok(Self {
            n_side,
            values: Array1::from_vec(values),
        })
    }

    /// Resolution parameter this map was allocated for.
    pub fn n_side(&self) -> u32 {
        self.n_side
    }

    /// Number of pixels in the map.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the map has no pixels (`n_side` 0).
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when `other` shares this map's resolution and length.
    pub fn same_geometry(&self, other: &PixelMap) -> bool {
        self.n_side == other.n_side && self.values.len() == other.values.len()
    }

    /// Contiguous view of the pixel values.
    pub fn as_slice(&self) -> &[f64] {
        // Maps are always allocated in standard layout.
        self.values
            .as_slice()
            .expect("pixel map storage is contiguous")
    }

    /// Iterate over the pixel values in index order.
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.values.iter()
    }
}

impl Index<usize> for PixelMap {
    type Output = f64;

    fn index(&self, pixel: usize) -> &f64 {
        &self.values[pixel]
    }
}

impl IndexMut<usize> for PixelMap {
    fn index_mut(&mut self, pixel: usize) -> &mut f64 {
        &mut self.values[pixel]
    }
}

impl AddAssign<&PixelMap> for PixelMap {
    /// Elementwise addition; both maps must share the same geometry.
    fn add_assign(&mut self, other: &PixelMap) {
        debug_assert!(self.same_geometry(other));
        self.values += &other.values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_map_has_expected_length() {
        let map = PixelMap::zeroed(8);
        assert_eq!(map.len(), 768);
        assert_eq!(map.n_side(), 8);
        assert!(map.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_from_values_rejects_wrong_length() {
        let err = PixelMap::from_values(4, vec![0.0; 100]).unwrap_err();
        assert_eq!(err.expected, 192);
        assert_eq!(err.found, 100);
    }

    #[test]
    fn test_from_values_accepts_exact_length() {
        let map = PixelMap::from_values(2, vec![1.5; 48]).unwrap();
        assert_eq!(map.len(), 48);
        assert_eq!(map[47], 1.5);
    }

    #[test]
    fn test_indexed_writes() {
        let mut map = PixelMap::zeroed(2);
        map[3] += 2.0;
        map[3] += 0.5;
        assert_eq!(map[3], 2.5);
        assert_eq!(map[4], 0.0);
    }

    #[test]
    fn test_elementwise_addition() {
        let mut a = PixelMap::zeroed(2);
        let mut b = PixelMap::zeroed(2);
        a[0] = 1.0;
        b[0] = 2.0;
        b[5] = 3.0;
        a += &b;
        assert_eq!(a[0], 3.0);
        assert_eq!(a[5], 3.0);
        assert_eq!(a[1], 0.0);
    }

    #[test]
    fn test_geometry_comparison() {
        let a = PixelMap::zeroed(2);
        let b = PixelMap::zeroed(2);
        let c = PixelMap::zeroed(4);
        assert!(a.same_geometry(&b));
        assert!(!a.same_geometry(&c));
    }
}
