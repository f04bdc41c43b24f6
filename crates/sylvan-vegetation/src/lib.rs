//! Vegetation layers for the Sylvan paging engine.
//!
//! Grass and tree loaders turn placement data from a [`DataProvider`] into
//! merged per-block meshes planted on a [`TerrainQuery`] surface. A
//! [`TerrainLoader`] pages the ground itself so vegetation managers can
//! follow its tiles reactively.

pub mod context;
pub mod density;
pub mod grass;
pub mod heightfield;
pub mod provider;
pub mod terrain;
pub mod tree;

pub use context::WorldContext;
pub use density::{DensityConfig, DensityMapProvider};
pub use grass::{GrassConfig, GrassLayer, GrassLoader};
pub use heightfield::{TerrainLoader, TerrainLoaderConfig};
pub use provider::{DataProvider, Placement};
pub use terrain::{FlatTerrain, NoiseTerrain, TerrainConfig, TerrainQuery};
pub use tree::{TreeConfig, TreeLoader, TreeRegistry, TreeShape, TreeSpec};
