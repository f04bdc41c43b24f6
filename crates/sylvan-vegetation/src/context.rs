//! Shared handles every vegetation layer needs.

use std::sync::Arc;

use sylvan_core::Result;
use sylvan_paging::{
    Executor, PageEventSource, PageLoader, PagingConfig, PagingManager, ReactiveManager,
    SceneSink,
};

use crate::provider::DataProvider;
use crate::terrain::TerrainQuery;

/// Executor, terrain and placement source passed to loader and manager
/// constructors.
#[derive(Clone)]
pub struct WorldContext {
    executor: Arc<Executor>,
    terrain: Arc<dyn TerrainQuery>,
    provider: Arc<dyn DataProvider>,
}

impl WorldContext {
    pub fn new(
        executor: Arc<Executor>,
        terrain: Arc<dyn TerrainQuery>,
        provider: Arc<dyn DataProvider>,
    ) -> Self {
        Self {
            executor,
            terrain,
            provider,
        }
    }

    pub const fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub const fn terrain(&self) -> &Arc<dyn TerrainQuery> {
        &self.terrain
    }

    pub const fn provider(&self) -> &Arc<dyn DataProvider> {
        &self.provider
    }

    /// Same executor and terrain with another placement source.
    pub fn with_provider(&self, provider: Arc<dyn DataProvider>) -> Self {
        Self {
            provider,
            ..self.clone()
        }
    }

    /// Camera-driven manager on the shared executor.
    pub fn active_manager(
        &self,
        loader: Arc<dyn PageLoader>,
        scene: Box<dyn SceneSink>,
        config: PagingConfig,
    ) -> Result<PagingManager> {
        PagingManager::new(loader, Arc::clone(&self.executor), scene, config)
    }

    /// Manager following `source` on the shared executor.
    pub fn reactive_manager(
        &self,
        loader: Arc<dyn PageLoader>,
        scene: Box<dyn SceneSink>,
        config: PagingConfig,
        source: &mut dyn PageEventSource,
    ) -> Result<ReactiveManager> {
        ReactiveManager::new(loader, Arc::clone(&self.executor), scene, config, source)
    }
}

impl std::fmt::Debug for WorldContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldContext")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
