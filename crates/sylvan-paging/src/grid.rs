//! Sparse 2D container keyed by cell coordinate.

use hashbrown::HashMap;
use sylvan_core::CellCoord;

/// Sparse grid of values indexed by [`CellCoord`].
///
/// Keys are [`CellCoord::key`], which is collision-free over the whole
/// `i32 × i32` coordinate space.
#[derive(Debug, Clone)]
pub struct Grid2D<P> {
    cells: HashMap<u64, P>,
}

impl<P> Grid2D<P> {
    pub fn new() -> Self {
        Self {
            cells: HashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: HashMap::with_capacity(capacity),
        }
    }

    /// Insert by raw key, returning any previous occupant.
    pub fn put(&mut self, key: u64, value: P) -> Option<P> {
        self.cells.insert(key, value)
    }

    /// Look up by raw key.
    pub fn get(&self, key: u64) -> Option<&P> {
        self.cells.get(&key)
    }

    pub fn get_cell(&self, cell: CellCoord) -> Option<&P> {
        self.cells.get(&cell.key())
    }

    pub fn get_cell_mut(&mut self, cell: CellCoord) -> Option<&mut P> {
        self.cells.get_mut(&cell.key())
    }

    pub fn contains_cell(&self, cell: CellCoord) -> bool {
        self.cells.contains_key(&cell.key())
    }

    pub fn remove_cell(&mut self, cell: CellCoord) -> Option<P> {
        self.cells.remove(&cell.key())
    }

    /// Replace whatever occupies `cell`, returning the displaced value.
    pub fn set_cell(&mut self, cell: CellCoord, value: P) -> Option<P> {
        self.cells.insert(cell.key(), value)
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Remove and yield every value.
    pub fn drain(&mut self) -> impl Iterator<Item = (CellCoord, P)> + '_ {
        self.cells
            .drain()
            .map(|(key, value)| (CellCoord::from_key(key), value))
    }

    /// All live values, in no particular order.
    pub fn values(&self) -> impl Iterator<Item = &P> {
        self.cells.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut P> {
        self.cells.values_mut()
    }

    /// All occupied cells, in no particular order.
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        self.cells.keys().map(|&key| CellCoord::from_key(key))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (CellCoord, &mut P)> {
        self.cells
            .iter_mut()
            .map(|(&key, value)| (CellCoord::from_key(key), value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl<P> Default for Grid2D<P> {
    fn default() -> Self {
        Self::new()
    }
}
