//! Cell coordinates for the paging grid.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Position of a page in the infinite logical paging grid.
///
/// Cell `(x, z)` is centered on world `(x * page_size, z * page_size)`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(C)]
pub struct CellCoord {
    pub x: i32,
    pub z: i32,
}

impl CellCoord {
    /// Create a new cell coordinate
    #[inline]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Pack into a grid key.
    ///
    /// The upper 32 bits hold `x`, the lower 32 bits hold `z`, both as their
    /// two's complement bit patterns. Every `(x, z)` pair in `i32 × i32` maps
    /// to a distinct key.
    #[inline]
    pub const fn key(self) -> u64 {
        ((self.x as u32 as u64) << 32) | (self.z as u32 as u64)
    }

    /// Unpack a key produced by [`CellCoord::key`].
    #[inline]
    pub const fn from_key(key: u64) -> Self {
        Self::new((key >> 32) as u32 as i32, key as u32 as i32)
    }

    /// Cell containing a world position.
    ///
    /// Each axis is `w / page_size` rounded to the nearest integer with halves
    /// rounded away from zero, so cell boundaries sit half a page either side
    /// of each cell center and the origin lies at the center of cell `(0, 0)`.
    #[inline]
    pub fn from_world(pos: Vec3, page_size: f32) -> Self {
        Self::new(
            (pos.x / page_size).round() as i32,
            (pos.z / page_size).round() as i32,
        )
    }

    /// World-space center of this cell on the `y = 0` plane.
    #[inline]
    pub fn center(self, page_size: f32) -> Vec3 {
        Vec3::new(self.x as f32 * page_size, 0.0, self.z as f32 * page_size)
    }

    /// Cell offset by `(dx, dz)`.
    #[inline]
    pub const fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }

    /// Chebyshev distance in cells.
    #[inline]
    pub fn chebyshev(self, other: Self) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    /// Whether this cell lies inside the square window of `radius` around `center`.
    #[inline]
    pub fn in_window(self, center: Self, radius: i32) -> bool {
        self.chebyshev(center) <= radius
    }

    /// All cells of the `(2 * radius + 1)²` window centered on `self`, row by row.
    pub fn window(self, radius: i32) -> impl Iterator<Item = CellCoord> {
        (-radius..=radius)
            .flat_map(move |dz| (-radius..=radius).map(move |dx| self.offset(dx, dz)))
    }
}

impl std::fmt::Display for CellCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn key_roundtrip_over_working_range() {
        let mut seen = HashSet::new();
        for z in -64..=64 {
            for x in -64..=64 {
                let cell = CellCoord::new(x, z);
                let key = cell.key();
                assert_eq!(CellCoord::from_key(key), cell);
                assert!(seen.insert(key), "duplicate key for {cell}");
            }
        }
    }

    #[test]
    fn key_roundtrip_at_extremes() {
        for cell in [
            CellCoord::new(i32::MIN, i32::MAX),
            CellCoord::new(i32::MAX, i32::MIN),
            CellCoord::new(-1, -1),
            CellCoord::new(-1, 0),
            CellCoord::new(0, -1),
        ] {
            assert_eq!(CellCoord::from_key(cell.key()), cell);
        }
        // Negative cells must not alias positive ones.
        assert_ne!(CellCoord::new(-1, 0).key(), CellCoord::new(1, 0).key());
        assert_ne!(CellCoord::new(0, -1).key(), CellCoord::new(0, 1).key());
    }

    #[test]
    fn from_world_centers_origin() {
        let size = 64.0;
        assert_eq!(CellCoord::from_world(Vec3::ZERO, size), CellCoord::new(0, 0));
        assert_eq!(
            CellCoord::from_world(Vec3::new(31.0, 0.0, -31.0), size),
            CellCoord::new(0, 0)
        );
        assert_eq!(
            CellCoord::from_world(Vec3::new(32.0, 0.0, -32.0), size),
            CellCoord::new(1, -1)
        );
        assert_eq!(
            CellCoord::from_world(Vec3::new(-64.0, 5.0, 64.0), size),
            CellCoord::new(-1, 1)
        );
        assert_eq!(
            CellCoord::from_world(Vec3::new(-97.0, 0.0, 95.0), size),
            CellCoord::new(-2, 1)
        );
    }

    #[test]
    fn window_is_square_and_centered() {
        let center = CellCoord::new(-3, 7);
        let cells: Vec<_> = center.window(2).collect();
        assert_eq!(cells.len(), 25);
        assert!(cells.iter().all(|c| c.in_window(center, 2)));
        assert!(cells.contains(&CellCoord::new(-5, 5)));
        assert!(cells.contains(&CellCoord::new(-1, 9)));
    }
}
