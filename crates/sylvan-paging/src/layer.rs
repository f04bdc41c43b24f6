//! Page set shared by active and reactive managers.

use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use glam::Vec3;
use sylvan_core::{CellCoord, Error, Result};

use crate::cache::PageCache;
use crate::executor::Executor;
use crate::grid::Grid2D;
use crate::loader::{PageContents, PageLoader};
use crate::manager::{PageEvent, PagingConfig, PagingStats};
use crate::page::{Page, PageStatus};
use crate::scene::SceneSink;

/// Grid, eviction cache and lifecycle driver for one loader.
///
/// Only the coordinator thread touches this; workers see nothing but the
/// [`crate::LoadTask`]s handed to the executor.
pub(crate) struct PagingLayer {
    pub(crate) loader: Arc<dyn PageLoader>,
    executor: Arc<Executor>,
    scene: Box<dyn SceneSink>,
    pub(crate) grid: Grid2D<Page>,
    cache: Option<PageCache>,
    pub(crate) config: PagingConfig,
    listeners: Vec<Sender<PageEvent>>,
    operator_errors: Vec<Error>,
}

impl PagingLayer {
    pub(crate) fn new(
        loader: Arc<dyn PageLoader>,
        executor: Arc<Executor>,
        scene: Box<dyn SceneSink>,
        config: PagingConfig,
    ) -> Result<Self> {
        config.validate()?;
        if loader.detail_levels().is_empty() {
            return Err(Error::InvalidConfig(format!(
                "{} loader has no detail levels",
                loader.type_tag()
            )));
        }
        let grid_size = config.grid_size() as usize;
        Ok(Self {
            cache: config.cache_time.map(PageCache::new),
            grid: Grid2D::with_capacity(grid_size * grid_size),
            loader,
            executor,
            scene,
            config,
            listeners: Vec::new(),
            operator_errors: Vec::new(),
        })
    }

    pub(crate) fn tag(&self) -> &'static str {
        self.loader.type_tag()
    }

    /// Put a page for `cell` into the grid, recycling a cached one if it is current.
    pub(crate) fn admit(&mut self, cell: CellCoord) {
        if self.grid.contains_cell(cell) {
            let err = Error::GridConsistency(format!("page {cell} admitted while already live"));
            tracing::error!("{}: {err}", self.tag());
            debug_assert!(false, "{err}");
            return;
        }

        let version = self.loader.page_version();
        let page = match self.cache.as_mut().and_then(|cache| cache.take(cell)) {
            Some(cached) if cached.version() == version => {
                tracing::trace!("{}: reusing cached page {cell}", self.tag());
                cached
            }
            Some(mut stale) => {
                stale.unload(self.scene.as_mut());
                self.loader.create_page(cell)
            }
            None => self.loader.create_page(cell),
        };

        if page.status() == PageStatus::Loaded {
            self.publish(&[PageEvent::Loaded(cell)]);
        }
        self.grid.set_cell(cell, page);
    }

    /// Remove the page at `cell`, caching it when possible.
    ///
    /// Returns `false` if no page was live there.
    pub(crate) fn evict(&mut self, cell: CellCoord) -> bool {
        let Some(mut page) = self.grid.remove_cell(cell) else {
            return false;
        };
        if page.status() == PageStatus::Loaded {
            self.publish(&[PageEvent::Unloaded(cell)]);
        }

        let scene = self.scene.as_mut();
        match (&mut self.cache, page.status()) {
            (Some(cache), PageStatus::Loaded | PageStatus::Idle) => {
                page.hide(scene);
                if let Some(mut displaced) = cache.insert(page) {
                    displaced.unload(scene);
                }
            }
            _ => page.unload(scene),
        }
        true
    }

    /// Submit, poll and process every live page.
    pub(crate) fn sweep(&mut self, camera: Vec3, tpf: f32) {
        let current = self.loader.page_version();
        let tag = self.loader.type_tag();
        let mut events = Vec::new();

        for page in self.grid.values_mut() {
            let cell = page.cell();

            if page.idle_is_outdated(current) {
                tracing::debug!("{tag}: retrying idle page {cell} for version {current}");
                *page = self.loader.create_page(cell);
            }

            if page.status() == PageStatus::Unrequested {
                submit(self.loader.as_ref(), &self.executor, page);
            }

            if page.status() == PageStatus::Pending {
                if let Some(result) = page.poll_task() {
                    // Generation may have bumped the version while it ran.
                    let now = self.loader.page_version();
                    if page.version() != now && !page.regenerated() {
                        tracing::debug!(
                            "{tag}: page {cell} finished under stale version {}, regenerating",
                            page.version()
                        );
                        page.unload(self.scene.as_mut());
                        *page = self.loader.create_page(cell);
                        page.set_regenerated();
                        submit(self.loader.as_ref(), &self.executor, page);
                    } else {
                        if page.version() != now {
                            tracing::error!(
                                "{tag}: page {cell} still stale after regeneration \
                                 (page version {}, loader version {now}); keeping result",
                                page.version()
                            );
                        }
                        match result {
                            Ok(contents) => {
                                if accept(page, contents, self.scene.as_mut()) {
                                    events.push(PageEvent::Loaded(cell));
                                }
                            }
                            Err(e) => {
                                if e.is_operator_error() {
                                    tracing::error!("{tag}: page {cell} cannot load: {e}");
                                    self.operator_errors.push(e);
                                } else {
                                    tracing::error!("{tag}: generation of page {cell} failed: {e}");
                                }
                                page.mark_idle();
                            }
                        }
                        page.settle_idle(now);
                    }
                }
            }

            if page.status() == PageStatus::Loaded {
                if self.config.page_updates {
                    page.update(tpf);
                    self.loader.update_page(page, tpf);
                }
                page.process(
                    camera,
                    self.loader.detail_levels(),
                    self.config.fading,
                    self.scene.as_mut(),
                );
            }
        }

        self.publish(&events);
    }

    /// Advance cache timers and drop expired pages.
    pub(crate) fn age_cache(&mut self, tpf: f32) {
        if let Some(cache) = &mut self.cache {
            for mut page in cache.age(tpf) {
                tracing::trace!("{}: cached page {} expired", self.loader.type_tag(), page.cell());
                page.unload(self.scene.as_mut());
            }
        }
    }

    /// Force the page at `cell` to regenerate.
    pub(crate) fn reload(&mut self, cell: CellCoord) -> bool {
        let Some(page) = self.grid.get_cell_mut(cell) else {
            return false;
        };
        let was_loaded = page.status() == PageStatus::Loaded;
        page.unload(self.scene.as_mut());
        *page = self.loader.create_page(cell);
        if was_loaded {
            self.publish(&[PageEvent::Unloaded(cell)]);
        }
        true
    }

    pub(crate) fn reload_all(&mut self) {
        let cells: Vec<CellCoord> = self.grid.cells().collect();
        for cell in cells {
            self.reload(cell);
        }
        if let Some(cache) = &mut self.cache {
            for mut page in cache.drain() {
                page.unload(self.scene.as_mut());
            }
        }
    }

    /// Unload every live and cached page.
    pub(crate) fn clear(&mut self) {
        let mut events = Vec::new();
        let scene = self.scene.as_mut();
        for (cell, mut page) in self.grid.drain() {
            if page.status() == PageStatus::Loaded {
                events.push(PageEvent::Unloaded(cell));
            }
            page.unload(scene);
        }
        if let Some(cache) = &mut self.cache {
            for mut page in cache.drain() {
                page.unload(scene);
            }
        }
        self.publish(&events);
    }

    /// Subscribe to load/unload events, replaying pages that are already loaded.
    pub(crate) fn subscribe(&mut self) -> Receiver<PageEvent> {
        let (tx, rx) = channel::unbounded();
        for page in self.grid.values() {
            if page.status() == PageStatus::Loaded {
                let _ = tx.send(PageEvent::Loaded(page.cell()));
            }
        }
        self.listeners.push(tx);
        rx
    }

    fn publish(&mut self, events: &[PageEvent]) {
        if events.is_empty() {
            return;
        }
        self.listeners
            .retain(|tx| events.iter().all(|&event| tx.send(event).is_ok()));
    }

    pub(crate) fn drain_operator_errors(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.operator_errors)
    }

    pub(crate) fn stats(&self) -> PagingStats {
        let mut stats = PagingStats {
            cached: self.cache.as_ref().map_or(0, PageCache::len),
            in_flight: self.executor.in_flight(),
            ..PagingStats::default()
        };
        for page in self.grid.values() {
            stats.pages += 1;
            match page.status() {
                PageStatus::Unrequested => stats.unrequested += 1,
                PageStatus::Pending => stats.pending += 1,
                PageStatus::Loaded => {
                    stats.loaded += 1;
                    stats.triangles += page.triangle_count();
                    stats.memory_bytes += page.memory_usage();
                }
                PageStatus::Idle => stats.idle += 1,
            }
        }
        stats
    }
}

impl Drop for PagingLayer {
    fn drop(&mut self) {
        self.clear();
    }
}

fn submit(loader: &dyn PageLoader, executor: &Executor, page: &mut Page) {
    let task = loader.load_page(page);
    page.begin_load(executor.submit(move |token| task(token)));
}

/// Attach finished contents. Returns `true` if the page became `Loaded`.
fn accept(page: &mut Page, contents: PageContents, scene: &mut dyn SceneSink) -> bool {
    if contents.has_contents {
        page.attach(contents, scene);
        true
    } else {
        page.mark_idle();
        false
    }
}
