//! Terrain-relative page streaming for the Sylvan engine.
//!
//! A [`PagingManager`] keeps a square window of [`Page`]s centered on the
//! camera, submitting generation work to an [`Executor`] and polling the
//! results each frame. [`ReactiveManager`]s mirror another manager's pages so
//! dependent layers follow the tiles they sit on.

pub mod archive;
pub mod block;
pub mod cache;
pub mod detail;
pub mod executor;
pub mod grid;
mod layer;
pub mod loader;
pub mod manager;
pub mod page;
pub mod reactive;
pub mod scene;

pub use archive::{ArchiveLookup, PageArchive};
pub use block::Block;
pub use cache::PageCache;
pub use detail::{DetailLevel, DetailLevels};
pub use executor::{CancelToken, Executor, ExecutorConfig, TaskHandle};
pub use grid::Grid2D;
pub use loader::{BlockGeometry, LoadTask, PageContents, PageLoader, PageVersion};
pub use manager::{PageEvent, PageEventSource, PagingConfig, PagingManager, PagingStats};
pub use page::{BlockInfo, Page, PageInfo, PageStatus};
pub use reactive::ReactiveManager;
pub use scene::{NodeKey, NullScene, RecordingScene, SceneSink};
