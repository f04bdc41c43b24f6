//! Placement data consumed by vegetation loaders.

use serde::{Deserialize, Serialize};
use sylvan_paging::{BlockInfo, PageInfo};

/// One plant instance.
///
/// `y` is a placeholder; loaders always replace it with the terrain height.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Size fraction in `[0, 1]`, mapped onto a layer's size range.
    pub scale: f32,
    /// Rotation about the vertical axis, radians.
    pub rotation: f32,
}

/// Source of per-block placement records.
///
/// Called from worker threads, so implementations must tolerate concurrent
/// reads.
pub trait DataProvider: Send + Sync {
    /// `false` when nothing grows anywhere on the page.
    fn has_contents(&self, page: &PageInfo) -> bool;

    /// Placements inside `block`'s footprint for one layer.
    fn get_data(&self, page: &PageInfo, block: &BlockInfo, layer: usize) -> Vec<Placement>;
}

/// Map a `[0, 1]` fraction onto `min..=max`.
pub(crate) fn lerp_range(min: f32, max: f32, t: f32) -> f32 {
    (max - min).mul_add(t.clamp(0.0, 1.0), min)
}
