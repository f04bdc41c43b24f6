//! Reactive manager that mirrors another manager's pages.

use std::sync::Arc;

use crossbeam::channel::{Receiver, TryRecvError};
use glam::Vec3;
use sylvan_core::{CellCoord, Error, Result};

use crate::executor::Executor;
use crate::layer::PagingLayer;
use crate::loader::PageLoader;
use crate::manager::{PageEvent, PageEventSource, PagingConfig, PagingStats};
use crate::page::{Page, PageStatus};
use crate::scene::SceneSink;

/// Loads a page wherever its source has a loaded page, and drops it when
/// the source does.
///
/// It never decides on its own which cells to hold, so a dependent layer
/// cannot outlive the tile it belongs to.
pub struct ReactiveManager {
    layer: PagingLayer,
    source: Receiver<PageEvent>,
    source_lost: bool,
}

impl ReactiveManager {
    /// Bind to `source`; the loader's page size must match the source's.
    pub fn new(
        loader: Arc<dyn PageLoader>,
        executor: Arc<Executor>,
        scene: Box<dyn SceneSink>,
        config: PagingConfig,
        source: &mut dyn PageEventSource,
    ) -> Result<Self> {
        if (loader.page_size() - source.page_size()).abs() > f32::EPSILON {
            return Err(Error::InvalidConfig(format!(
                "{} page size {} does not match its source page size {}",
                loader.type_tag(),
                loader.page_size(),
                source.page_size()
            )));
        }
        let events = source.subscribe();
        Self::from_receiver(loader, executor, scene, config, events)
    }

    /// Follow an explicit event stream.
    pub fn from_receiver(
        loader: Arc<dyn PageLoader>,
        executor: Arc<Executor>,
        scene: Box<dyn SceneSink>,
        config: PagingConfig,
        source: Receiver<PageEvent>,
    ) -> Result<Self> {
        Ok(Self {
            layer: PagingLayer::new(loader, executor, scene, config)?,
            source,
            source_lost: false,
        })
    }

    /// Advance one frame: mirror pending events, then submit, poll and
    /// process pages, then age the eviction cache.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn update(&mut self, camera_pos: Vec3, tpf: f32) {
        self.apply_events();
        self.layer.sweep(camera_pos, tpf);
        self.layer.age_cache(tpf);
    }

    fn apply_events(&mut self) {
        loop {
            match self.source.try_recv() {
                Ok(PageEvent::Loaded(cell)) => {
                    if !self.layer.grid.contains_cell(cell) {
                        self.layer.admit(cell);
                    }
                }
                Ok(PageEvent::Unloaded(cell)) => {
                    if !self.layer.evict(cell) {
                        tracing::trace!(
                            "{}: ignoring unload of untracked page {cell}",
                            self.layer.tag()
                        );
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.source_lost {
                        tracing::warn!(
                            "{}: source manager dropped; keeping {} pages",
                            self.layer.tag(),
                            self.layer.grid.len()
                        );
                        self.source_lost = true;
                    }
                    break;
                }
            }
        }
    }

    pub const fn config(&self) -> &PagingConfig {
        &self.layer.config
    }

    pub fn loader(&self) -> &Arc<dyn PageLoader> {
        &self.layer.loader
    }

    pub fn cells(&self) -> Vec<CellCoord> {
        self.layer.grid.cells().collect()
    }

    pub fn page(&self, cell: CellCoord) -> Option<&Page> {
        self.layer.grid.get_cell(cell)
    }

    pub fn page_status(&self, cell: CellCoord) -> Option<PageStatus> {
        self.page(cell).map(Page::status)
    }

    pub fn reload_page(&mut self, cell: CellCoord) -> bool {
        self.layer.reload(cell)
    }

    pub fn reload_all(&mut self) {
        self.layer.reload_all();
    }

    pub fn stats(&self) -> PagingStats {
        self.layer.stats()
    }

    pub fn drain_operator_errors(&mut self) -> Vec<Error> {
        self.layer.drain_operator_errors()
    }
}

impl PageEventSource for ReactiveManager {
    fn subscribe(&mut self) -> Receiver<PageEvent> {
        self.layer.subscribe()
    }

    fn page_size(&self) -> f32 {
        self.layer.loader.page_size()
    }
}
