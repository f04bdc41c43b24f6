//! Eviction cache holding recently dropped pages for reuse.

use sylvan_core::CellCoord;

use crate::grid::Grid2D;
use crate::page::Page;

/// Pages that left the active window, kept for `cache_time` seconds.
#[derive(Debug)]
pub struct PageCache {
    pages: Grid2D<Page>,
    cache_time: f32,
}

impl PageCache {
    pub fn new(cache_time: f32) -> Self {
        Self {
            pages: Grid2D::new(),
            cache_time,
        }
    }

    pub const fn cache_time(&self) -> f32 {
        self.cache_time
    }

    /// Store a page with a fresh timer, returning any page it displaced.
    pub fn insert(&mut self, mut page: Page) -> Option<Page> {
        page.reset_cache_timer();
        self.pages.set_cell(page.cell(), page)
    }

    /// Take the cached page at `cell`, whatever its version.
    pub fn take(&mut self, cell: CellCoord) -> Option<Page> {
        self.pages.remove_cell(cell)
    }

    pub fn contains(&self, cell: CellCoord) -> bool {
        self.pages.contains_cell(cell)
    }

    /// Age every page by `tpf` and return the ones that expired.
    pub fn age(&mut self, tpf: f32) -> Vec<Page> {
        let cache_time = self.cache_time;
        let mut expired = Vec::new();
        let cells: Vec<CellCoord> = self
            .pages
            .iter_mut()
            .filter_map(|(cell, page)| {
                page.increase_cache_timer(tpf);
                (page.cache_timer() > cache_time).then_some(cell)
            })
            .collect();
        for cell in cells {
            if let Some(page) = self.pages.remove_cell(cell) {
                expired.push(page);
            }
        }
        expired
    }

    /// Remove every cached page.
    pub fn drain(&mut self) -> Vec<Page> {
        self.pages.drain().map(|(_, page)| page).collect()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
