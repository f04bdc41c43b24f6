//! Active paging manager that follows the camera.

use std::sync::Arc;

use crossbeam::channel::Receiver;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use sylvan_core::{CellCoord, Error, Result};

use crate::executor::Executor;
use crate::layer::PagingLayer;
use crate::loader::PageLoader;
use crate::page::{Page, PageStatus};
use crate::scene::SceneSink;

/// Largest accepted window radius.
pub const MAX_RADIUS: i32 = 64;

/// Configuration for a paging manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    /// Pages on each side of the center page; the window is `2 * radius + 1`
    /// pages wide. Reactive managers ignore it.
    pub radius: i32,
    /// Seconds an evicted page stays reusable (`None` disables the cache).
    pub cache_time: Option<f32>,
    /// Cross-fade between detail levels.
    pub fading: bool,
    /// Call the per-frame page hook on loaded pages.
    pub page_updates: bool,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            radius: 2,
            cache_time: None,
            fading: true,
            page_updates: false,
        }
    }
}

impl PagingConfig {
    /// Edge length of the active window in pages (always odd).
    pub const fn grid_size(&self) -> i32 {
        2 * self.radius + 1
    }

    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_RADIUS).contains(&self.radius) {
            return Err(Error::InvalidConfig(format!(
                "paging radius must be in 0..={MAX_RADIUS}, got {}",
                self.radius
            )));
        }
        if let Some(time) = self.cache_time {
            if time.is_nan() || time <= 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "cache time must be positive, got {time}"
                )));
            }
        }
        Ok(())
    }
}

/// Grid membership change published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageEvent {
    /// The page at this cell finished loading (or was restored from cache).
    Loaded(CellCoord),
    /// A previously loaded page left the grid or was reloaded.
    Unloaded(CellCoord),
}

/// Something a [`crate::ReactiveManager`] can follow.
pub trait PageEventSource {
    fn subscribe(&mut self) -> Receiver<PageEvent>;
    fn page_size(&self) -> f32;
}

/// Page counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PagingStats {
    pub pages: usize,
    pub unrequested: usize,
    pub pending: usize,
    pub loaded: usize,
    pub idle: usize,
    pub cached: usize,
    /// Tasks running on the shared executor (all layers).
    pub in_flight: usize,
    pub triangles: usize,
    /// Mesh bytes held by loaded pages.
    pub memory_bytes: usize,
}

/// Keeps a square window of pages centered on the camera.
pub struct PagingManager {
    layer: PagingLayer,
    center: Option<CellCoord>,
}

impl PagingManager {
    pub fn new(
        loader: Arc<dyn PageLoader>,
        executor: Arc<Executor>,
        scene: Box<dyn SceneSink>,
        config: PagingConfig,
    ) -> Result<Self> {
        Ok(Self {
            layer: PagingLayer::new(loader, executor, scene, config)?,
            center: None,
        })
    }

    /// Advance one frame.
    ///
    /// Scrolls or displaces the window if the camera changed cell, then
    /// submits, polls and processes pages, then ages the eviction cache.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn update(&mut self, camera_pos: Vec3, tpf: f32) {
        let cell = CellCoord::from_world(camera_pos, self.layer.loader.page_size());

        match self.center {
            None => self.displace(cell),
            Some(old) if old != cell => {
                let dx = cell.x - old.x;
                let dz = cell.z - old.z;
                if dx.abs() > 1 || dz.abs() > 1 {
                    self.displace(cell);
                } else {
                    // A diagonal step is two single-axis scrolls, x first.
                    if dx != 0 {
                        self.scroll_x(dx);
                    }
                    if dz != 0 {
                        self.scroll_z(dz);
                    }
                }
            }
            Some(_) => {}
        }

        self.layer.sweep(camera_pos, tpf);
        self.layer.age_cache(tpf);
    }

    /// Rebuild the window around `center` after a jump.
    fn displace(&mut self, center: CellCoord) {
        let radius = self.layer.config.radius;
        tracing::debug!(
            "{}: displacing grid to {center} (from {:?})",
            self.layer.tag(),
            self.center
        );

        let outside: Vec<CellCoord> = self
            .layer
            .grid
            .cells()
            .filter(|cell| !cell.in_window(center, radius))
            .collect();
        for cell in outside {
            self.layer.evict(cell);
        }
        for cell in center.window(radius) {
            if !self.layer.grid.contains_cell(cell) {
                self.layer.admit(cell);
            }
        }
        self.center = Some(center);
    }

    /// Shift the window one column along x.
    fn scroll_x(&mut self, dir: i32) {
        let Some(old) = self.center else { return };
        let radius = self.layer.config.radius;
        let new = old.offset(dir, 0);
        let trailing = old.x - dir * radius;
        let leading = new.x + dir * radius;

        for z in (old.z - radius)..=(old.z + radius) {
            self.evict_expected(CellCoord::new(trailing, z));
        }
        for z in (old.z - radius)..=(old.z + radius) {
            self.layer.admit(CellCoord::new(leading, z));
        }
        self.center = Some(new);
    }

    /// Shift the window one row along z.
    fn scroll_z(&mut self, dir: i32) {
        let Some(old) = self.center else { return };
        let radius = self.layer.config.radius;
        let new = old.offset(0, dir);
        let trailing = old.z - dir * radius;
        let leading = new.z + dir * radius;

        for x in (old.x - radius)..=(old.x + radius) {
            self.evict_expected(CellCoord::new(x, trailing));
        }
        for x in (old.x - radius)..=(old.x + radius) {
            self.layer.admit(CellCoord::new(x, leading));
        }
        self.center = Some(new);
    }

    fn evict_expected(&mut self, cell: CellCoord) {
        if !self.layer.evict(cell) {
            let err = Error::GridConsistency(format!("page {cell} missing from grid during scroll"));
            tracing::error!("{}: {err}", self.layer.tag());
            debug_assert!(false, "{err}");
        }
    }

    /// Cell the window is centered on, once the first update ran.
    pub const fn center(&self) -> Option<CellCoord> {
        self.center
    }

    pub const fn config(&self) -> &PagingConfig {
        &self.layer.config
    }

    pub fn loader(&self) -> &Arc<dyn PageLoader> {
        &self.layer.loader
    }

    /// Cells currently in the grid, in no particular order.
    pub fn cells(&self) -> Vec<CellCoord> {
        self.layer.grid.cells().collect()
    }

    pub fn page(&self, cell: CellCoord) -> Option<&Page> {
        self.layer.grid.get_cell(cell)
    }

    pub fn page_status(&self, cell: CellCoord) -> Option<PageStatus> {
        self.page(cell).map(Page::status)
    }

    /// Discard the page at `cell` and load it again.
    pub fn reload_page(&mut self, cell: CellCoord) -> bool {
        self.layer.reload(cell)
    }

    /// Discard and reload every page, dropping the eviction cache.
    pub fn reload_all(&mut self) {
        self.layer.reload_all();
    }

    /// Unload everything; the next update refills the window.
    pub fn clear(&mut self) {
        self.layer.clear();
        self.center = None;
    }

    pub fn stats(&self) -> PagingStats {
        self.layer.stats()
    }

    /// Errors that need an operator (e.g. stale page files).
    pub fn drain_operator_errors(&mut self) -> Vec<Error> {
        self.layer.drain_operator_errors()
    }
}

impl PageEventSource for PagingManager {
    fn subscribe(&mut self) -> Receiver<PageEvent> {
        self.layer.subscribe()
    }

    fn page_size(&self) -> f32 {
        self.layer.loader.page_size()
    }
}
