//! Core types, math, and meshes for the Sylvan paging engine.
//!
//! This crate provides the foundational types used throughout the engine:
//! - Cell coordinates for the paging grid
//! - Bounding volumes and planar distance helpers
//! - CPU-side meshes produced by page generation
//! - Common error types

pub mod coords;
pub mod error;
pub mod math;
pub mod mesh;

pub use coords::CellCoord;
pub use error::{Error, Result};
pub use math::Aabb;
pub use mesh::{Mesh, MeshBuilder, Vertex};

/// Engine-wide constants
pub mod constants {
    /// Smallest page edge length accepted by loaders (world units).
    pub const MIN_PAGE_SIZE: f32 = 16.0;
    /// Smallest block edge length; resolutions are reduced to respect it.
    pub const MIN_BLOCK_SIZE: f32 = 8.0;
}
