//! Block: one sub-cell of a page holding geometry per detail level.

use std::f32::consts::SQRT_2;
use std::sync::Arc;

use glam::Vec3;
use sylvan_core::math::planar_distance;
use sylvan_core::{CellCoord, Mesh};

use crate::detail::DetailLevels;
use crate::scene::{NodeKey, SceneSink};

/// A `page_size / resolution` square of a page.
#[derive(Debug)]
pub struct Block {
    tag: &'static str,
    cell: CellCoord,
    /// Local indices within the page.
    pub x: u32,
    pub z: u32,
    index: u32,
    center: Vec3,
    half_width: f32,
    nodes: Vec<Option<Arc<Mesh>>>,
    visible: Vec<bool>,
    real_max: Vec<f32>,
}

impl Block {
    pub fn new(
        tag: &'static str,
        cell: CellCoord,
        (x, z): (u32, u32),
        index: u32,
        center: Vec3,
        half_width: f32,
        levels: usize,
    ) -> Self {
        Self {
            tag,
            cell,
            x,
            z,
            index,
            center,
            half_width,
            nodes: vec![None; levels],
            visible: vec![false; levels],
            real_max: vec![half_width * SQRT_2; levels],
        }
    }

    /// Linear index within the page (`z * resolution + x`).
    pub const fn index(&self) -> u32 {
        self.index
    }

    pub const fn center(&self) -> Vec3 {
        self.center
    }

    pub const fn half_width(&self) -> f32 {
        self.half_width
    }

    pub fn level_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, level: usize) -> Option<&Arc<Mesh>> {
        self.nodes.get(level).and_then(Option::as_ref)
    }

    pub fn is_visible(&self, level: usize) -> bool {
        self.visible.get(level).copied().unwrap_or(false)
    }

    pub fn real_max(&self, level: usize) -> f32 {
        self.real_max
            .get(level)
            .copied()
            .unwrap_or(self.half_width * SQRT_2)
    }

    fn key(&self, level: usize) -> NodeKey {
        NodeKey {
            tag: self.tag,
            cell: self.cell,
            block: self.index,
            level: level as u8,
        }
    }

    /// Assign freshly generated geometry, one entry per detail level.
    ///
    /// Each mesh is placed at the block center. Levels that are currently
    /// visible swap their live node for the new one.
    pub fn set_nodes(&mut self, meshes: Vec<Option<Mesh>>, scene: &mut dyn SceneSink) {
        let center = self.center;
        for (level, mesh) in meshes.into_iter().enumerate().take(self.nodes.len()) {
            let was_visible = self.visible[level];
            if was_visible {
                self.set_visible(false, level, scene);
            }
            self.nodes[level] = mesh
                .filter(|m| !m.is_empty())
                .map(|mut m| {
                    m.translation = center;
                    Arc::new(m)
                });
            self.calculate_real_max(level);
            if was_visible {
                self.set_visible(true, level, scene);
            }
        }
    }

    /// Attach or detach one level's node. Returns `true` if anything changed.
    pub fn set_visible(&mut self, visible: bool, level: usize, scene: &mut dyn SceneSink) -> bool {
        if level >= self.visible.len() || self.visible[level] == visible {
            return false;
        }
        if let Some(mesh) = &self.nodes[level] {
            let key = self.key(level);
            if visible {
                scene.attach(key, mesh);
            } else {
                scene.detach(key);
            }
        }
        self.visible[level] = visible;
        true
    }

    /// Recompute the enclosing-circle radius of one level's geometry.
    pub fn calculate_real_max(&mut self, level: usize) -> f32 {
        let fallback = self.half_width * SQRT_2;
        let radius = self.nodes[level]
            .as_ref()
            .and_then(|mesh| mesh.world_bound())
            .map_or(fallback, |bound| {
                bound.planar_radius_from(self.center).max(fallback)
            });
        self.real_max[level] = radius;
        radius
    }

    /// Refresh every level's visibility for the camera position.
    pub fn process(
        &mut self,
        camera: Vec3,
        levels: &DetailLevels,
        fading: bool,
        scene: &mut dyn SceneSink,
    ) {
        let dist = planar_distance(self.center, camera);
        for level in 0..self.visible.len() {
            let show = levels.is_visible(level, dist, self.real_max[level], fading);
            self.set_visible(show, level, scene);
        }
    }

    /// Detach every level without dropping geometry.
    pub fn hide(&mut self, scene: &mut dyn SceneSink) {
        for level in 0..self.visible.len() {
            self.set_visible(false, level, scene);
        }
    }

    /// Detach and release all geometry.
    pub fn unload(&mut self, scene: &mut dyn SceneSink) {
        self.hide(scene);
        for node in &mut self.nodes {
            *node = None;
        }
    }

    /// Triangles held across all levels.
    pub fn triangle_count(&self) -> usize {
        self.nodes
            .iter()
            .flatten()
            .map(|mesh| mesh.triangle_count())
            .sum()
    }

    /// Bytes held by this block's meshes.
    pub fn memory_usage(&self) -> usize {
        self.nodes.iter().flatten().map(|mesh| mesh.memory_usage()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::RecordingScene;
    use approx::assert_relative_eq;
    use sylvan_core::MeshBuilder;

    fn quad_at(offset: Vec3, half: f32) -> Mesh {
        let mut builder = MeshBuilder::new();
        builder.quad(
            [
                offset + Vec3::new(-half, 0.0, -half),
                offset + Vec3::new(half, 0.0, -half),
                offset + Vec3::new(half, 0.0, half),
                offset + Vec3::new(-half, 0.0, half),
            ],
            Vec3::Y,
            [[0.0, 0.0]; 4],
        );
        builder.build()
    }

    fn test_block(levels: usize) -> Block {
        Block::new(
            "Test",
            CellCoord::new(0, 0),
            (0, 0),
            0,
            Vec3::new(8.0, 0.0, 8.0),
            4.0,
            levels,
        )
    }

    #[test]
    fn real_max_falls_back_to_half_diagonal() {
        let mut block = test_block(1);
        assert_relative_eq!(block.calculate_real_max(0), 4.0 * SQRT_2);
    }

    #[test]
    fn real_max_grows_with_overhanging_geometry() {
        let mut scene = RecordingScene::new();
        let mut block = test_block(1);
        // Quad offset 3 units along x with half extent 4: reaches x = 7 and z = 4.
        block.set_nodes(vec![Some(quad_at(Vec3::new(3.0, 0.0, 0.0), 4.0))], &mut scene);
        assert_relative_eq!(block.real_max(0), (49.0_f32 + 16.0).sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn set_nodes_places_mesh_at_center() {
        let mut scene = RecordingScene::new();
        let mut block = test_block(1);
        block.set_nodes(vec![Some(quad_at(Vec3::ZERO, 1.0))], &mut scene);
        assert_eq!(block.node(0).unwrap().translation, Vec3::new(8.0, 0.0, 8.0));
    }

    #[test]
    fn set_visible_is_idempotent() {
        let mut scene = RecordingScene::new();
        let mut block = test_block(1);
        block.set_nodes(vec![Some(quad_at(Vec3::ZERO, 1.0))], &mut scene);

        assert!(block.set_visible(true, 0, &mut scene));
        assert!(!block.set_visible(true, 0, &mut scene));
        assert_eq!(scene.attach_calls(), 1);
        assert_eq!(scene.attached_count(), 1);

        assert!(block.set_visible(false, 0, &mut scene));
        assert!(!block.set_visible(false, 0, &mut scene));
        assert_eq!(scene.detach_calls(), 1);
        assert_eq!(scene.attached_count(), 0);
    }

    #[test]
    fn hiding_a_never_shown_block_is_a_noop() {
        let mut scene = RecordingScene::new();
        let mut block = test_block(2);
        assert!(!block.set_visible(false, 1, &mut scene));
        assert_eq!(scene.detach_calls(), 0);
    }

    #[test]
    fn process_switches_levels_with_distance() {
        let levels = DetailLevels::new()
            .with_level(50.0, 0.0)
            .unwrap()
            .with_level(200.0, 0.0)
            .unwrap();
        let mut scene = RecordingScene::new();
        let mut block = test_block(2);
        block.set_nodes(
            vec![Some(quad_at(Vec3::ZERO, 1.0)), Some(quad_at(Vec3::ZERO, 2.0))],
            &mut scene,
        );

        block.process(Vec3::new(8.0, 0.0, 18.0), &levels, false, &mut scene);
        assert!(block.is_visible(0));
        assert!(!block.is_visible(1));

        block.process(Vec3::new(8.0, 0.0, 108.0), &levels, false, &mut scene);
        assert!(!block.is_visible(0));
        assert!(block.is_visible(1));

        block.process(Vec3::new(8.0, 0.0, 1000.0), &levels, false, &mut scene);
        assert!(!block.is_visible(0));
        assert!(!block.is_visible(1));
        assert_eq!(scene.attached_count(), 0);
    }

    #[test]
    fn unload_detaches_and_releases() {
        let mut scene = RecordingScene::new();
        let mut block = test_block(1);
        block.set_nodes(vec![Some(quad_at(Vec3::ZERO, 1.0))], &mut scene);
        block.set_visible(true, 0, &mut scene);

        block.unload(&mut scene);
        assert!(block.node(0).is_none());
        assert!(!block.is_visible(0));
        assert_eq!(scene.attached_count(), 0);

        block.unload(&mut scene);
        assert_eq!(scene.detach_calls(), 1);
    }
}
