//! Page loader contract and generated page contents.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use sylvan_core::{CellCoord, Mesh, Result};

use crate::detail::DetailLevels;
use crate::executor::CancelToken;
use crate::page::Page;

/// Geometry generated for one block, one entry per detail level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockGeometry {
    /// Linear block index (`z * resolution + x`).
    pub index: u32,
    pub levels: Vec<Option<Mesh>>,
}

/// Output of a load task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContents {
    /// `false` when the region has nothing to render.
    pub has_contents: bool,
    pub blocks: Vec<BlockGeometry>,
}

impl PageContents {
    /// Contents for a region with nothing to render.
    pub const fn empty() -> Self {
        Self {
            has_contents: false,
            blocks: Vec::new(),
        }
    }

    /// Wrap generated blocks, deciding `has_contents` from their geometry.
    pub fn from_blocks(blocks: Vec<BlockGeometry>) -> Self {
        let has_contents = blocks
            .iter()
            .flat_map(|b| b.levels.iter().flatten())
            .any(|mesh| !mesh.is_empty());
        Self {
            has_contents,
            blocks,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|b| b.levels.iter().flatten())
            .map(Mesh::triangle_count)
            .sum()
    }
}

/// Deferred generation work for one page.
///
/// Runs on a worker thread; it must only read shared immutable inputs and
/// return fresh geometry.
pub type LoadTask = Box<dyn FnOnce(&CancelToken) -> Result<PageContents> + Send + 'static>;

/// Monotonically wrapping configuration version.
#[derive(Debug, Default)]
pub struct PageVersion(AtomicU32);

impl PageVersion {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Bump the version, returning the new value.
    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }
}

/// Turns page coordinates into generated geometry.
pub trait PageLoader: Send + Sync {
    /// Layer tag used for scene keys and archive file names.
    fn type_tag(&self) -> &'static str;

    /// Page edge length in world units.
    fn page_size(&self) -> f32;

    /// Blocks per page edge.
    fn resolution(&self) -> u32;

    fn detail_levels(&self) -> &DetailLevels;

    /// Current configuration version.
    fn page_version(&self) -> u32;

    /// Mark all previously generated pages as stale.
    fn increment_page_version(&self) -> u32;

    /// Create an unloaded page (deterministic for a given configuration).
    fn create_page(&self, cell: CellCoord) -> Page {
        Page::new(
            self.type_tag(),
            cell,
            self.page_size(),
            self.resolution(),
            self.detail_levels().len(),
            self.page_version(),
        )
    }

    /// Build the generation task for `page`.
    fn load_page(&self, page: &Page) -> LoadTask;

    /// Per-frame hook for loaded pages of interactive layers.
    fn update_page(&self, _page: &mut Page, _tpf: f32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_wraps() {
        let version = PageVersion(AtomicU32::new(u32::MAX));
        assert_eq!(version.increment(), 0);
        assert_eq!(version.get(), 0);
        assert_eq!(version.increment(), 1);
    }

    #[test]
    fn empty_blocks_have_no_contents() {
        let contents = PageContents::from_blocks(vec![BlockGeometry {
            index: 0,
            levels: vec![None, Some(Mesh::default())],
        }]);
        assert!(!contents.has_contents);
        assert_eq!(contents.triangle_count(), 0);
    }
}
