//! Page: one grid cell and its lifecycle.

use glam::Vec3;
use sylvan_core::{CellCoord, Result};

use crate::block::Block;
use crate::detail::DetailLevels;
use crate::executor::TaskHandle;
use crate::loader::PageContents;
use crate::scene::SceneSink;

/// State of a page in the loading pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageStatus {
    /// Created but no load task submitted yet.
    #[default]
    Unrequested,
    /// A load task is in flight.
    Pending,
    /// Geometry attached.
    Loaded,
    /// Confirmed empty (or failed); not retried until the version changes.
    Idle,
}

/// Immutable description of a page, safe to hand to worker threads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageInfo {
    pub tag: &'static str,
    pub cell: CellCoord,
    /// World-space center on the `y = 0` plane.
    pub center: Vec3,
    pub page_size: f32,
    pub resolution: u32,
    pub version: u32,
}

impl PageInfo {
    pub fn block_size(&self) -> f32 {
        self.page_size / self.resolution as f32
    }

    /// Minimum world corner of the page footprint.
    pub fn origin(&self) -> Vec3 {
        self.center - Vec3::new(self.page_size * 0.5, 0.0, self.page_size * 0.5)
    }

    /// Layout of block `(x, z)`.
    pub fn block(&self, x: u32, z: u32) -> BlockInfo {
        let size = self.block_size();
        let origin = self.origin();
        BlockInfo {
            x,
            z,
            index: z * self.resolution + x,
            center: Vec3::new(
                origin.x + (x as f32 + 0.5) * size,
                0.0,
                origin.z + (z as f32 + 0.5) * size,
            ),
            half_width: size * 0.5,
        }
    }

    /// All blocks, row by row.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        let res = self.resolution;
        (0..res).flat_map(move |z| (0..res).map(move |x| self.block(x, z)))
    }
}

/// Immutable description of one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockInfo {
    pub x: u32,
    pub z: u32,
    pub index: u32,
    pub center: Vec3,
    pub half_width: f32,
}

impl BlockInfo {
    /// Whether a world `(x, z)` lies in the block footprint.
    ///
    /// The footprint is half-open so neighbouring blocks never share a point.
    pub fn contains(&self, x: f32, z: f32) -> bool {
        let min_x = self.center.x - self.half_width;
        let min_z = self.center.z - self.half_width;
        x >= min_x && x < min_x + 2.0 * self.half_width && z >= min_z && z < min_z + 2.0 * self.half_width
    }
}

/// A square region of world space tracked by the paging grid.
pub struct Page {
    info: PageInfo,
    levels: usize,
    blocks: Option<Vec<Block>>,
    status: PageStatus,
    task: Option<TaskHandle<Result<PageContents>>>,
    cache_timer: f32,
    live_time: f32,
    regenerated: bool,
    /// Loader version observed when the page last went `Idle`.
    idle_version: u32,
}

impl Page {
    pub fn new(
        tag: &'static str,
        cell: CellCoord,
        page_size: f32,
        resolution: u32,
        levels: usize,
        version: u32,
    ) -> Self {
        Self {
            info: PageInfo {
                tag,
                cell,
                center: cell.center(page_size),
                page_size,
                resolution: resolution.max(1),
                version,
            },
            levels,
            blocks: None,
            status: PageStatus::Unrequested,
            task: None,
            cache_timer: 0.0,
            live_time: 0.0,
            regenerated: false,
            idle_version: version,
        }
    }

    pub const fn cell(&self) -> CellCoord {
        self.info.cell
    }

    pub const fn version(&self) -> u32 {
        self.info.version
    }

    pub const fn center(&self) -> Vec3 {
        self.info.center
    }

    pub const fn info(&self) -> &PageInfo {
        &self.info
    }

    pub const fn status(&self) -> PageStatus {
        self.status
    }

    pub fn blocks(&self) -> Option<&[Block]> {
        self.blocks.as_deref()
    }

    pub fn blocks_mut(&mut self) -> Option<&mut [Block]> {
        self.blocks.as_deref_mut()
    }

    /// Partition the page into `resolution²` empty blocks.
    pub fn create_blocks(&self) -> Vec<Block> {
        self.info
            .blocks()
            .map(|b| {
                Block::new(
                    self.info.tag,
                    self.info.cell,
                    (b.x, b.z),
                    b.index,
                    b.center,
                    b.half_width,
                    self.levels,
                )
            })
            .collect()
    }

    /// Record the in-flight task and enter `Pending`.
    pub(crate) fn begin_load(&mut self, task: TaskHandle<Result<PageContents>>) {
        debug_assert!(self.task.is_none(), "page {} submitted twice", self.info.cell);
        self.task = Some(task);
        self.status = PageStatus::Pending;
    }

    /// Take the task result once it is ready.
    pub(crate) fn poll_task(&mut self) -> Option<Result<PageContents>> {
        let result = self.task.as_mut()?.poll()?;
        self.task = None;
        Some(result.and_then(|inner| inner))
    }

    /// Attach generated geometry and enter `Loaded`.
    pub fn attach(&mut self, contents: PageContents, scene: &mut dyn SceneSink) {
        let mut blocks = self.create_blocks();
        for geometry in contents.blocks {
            match blocks.get_mut(geometry.index as usize) {
                Some(block) => block.set_nodes(geometry.levels, scene),
                None => tracing::warn!(
                    "Discarding geometry for block {} outside page {}",
                    geometry.index,
                    self.info.cell
                ),
            }
        }
        self.blocks = Some(blocks);
        self.status = PageStatus::Loaded;
        self.live_time = 0.0;
    }

    /// Enter `Idle`: nothing to render here.
    pub fn mark_idle(&mut self) {
        self.blocks = None;
        self.status = PageStatus::Idle;
    }

    /// Cancel any in-flight task, release all blocks and return to `Unrequested`.
    ///
    /// Safe to call repeatedly.
    pub fn unload(&mut self, scene: &mut dyn SceneSink) {
        if let Some(task) = self.task.take() {
            task.cancel();
        }
        if let Some(mut blocks) = self.blocks.take() {
            for block in &mut blocks {
                block.unload(scene);
            }
        }
        self.status = PageStatus::Unrequested;
    }

    /// Detach all geometry from the scene but keep it for reuse.
    pub fn hide(&mut self, scene: &mut dyn SceneSink) {
        if let Some(blocks) = &mut self.blocks {
            for block in blocks {
                block.hide(scene);
            }
        }
    }

    /// Refresh block visibility for the camera position.
    pub fn process(
        &mut self,
        camera: Vec3,
        levels: &DetailLevels,
        fading: bool,
        scene: &mut dyn SceneSink,
    ) {
        if let Some(blocks) = &mut self.blocks {
            for block in blocks {
                block.process(camera, levels, fading, scene);
            }
        }
    }

    /// Per-frame hook.
    pub fn update(&mut self, tpf: f32) {
        self.live_time += tpf;
    }

    /// Seconds since the page became loaded.
    pub const fn live_time(&self) -> f32 {
        self.live_time
    }

    pub fn reset_cache_timer(&mut self) {
        self.cache_timer = 0.0;
    }

    pub fn increase_cache_timer(&mut self, tpf: f32) {
        self.cache_timer += tpf;
    }

    pub const fn cache_timer(&self) -> f32 {
        self.cache_timer
    }

    pub(crate) const fn regenerated(&self) -> bool {
        self.regenerated
    }

    pub(crate) fn set_regenerated(&mut self) {
        self.regenerated = true;
    }

    /// Whether an `Idle` page should be retried under `loader_version`.
    pub(crate) fn idle_is_outdated(&self, loader_version: u32) -> bool {
        self.status == PageStatus::Idle && self.idle_version != loader_version
    }

    pub(crate) fn settle_idle(&mut self, loader_version: u32) {
        self.idle_version = loader_version;
    }

    pub fn has_task(&self) -> bool {
        self.task.is_some()
    }

    pub fn triangle_count(&self) -> usize {
        self.blocks
            .as_ref()
            .map_or(0, |blocks| blocks.iter().map(Block::triangle_count).sum())
    }

    pub fn memory_usage(&self) -> usize {
        self.blocks
            .as_ref()
            .map_or(0, |blocks| blocks.iter().map(Block::memory_usage).sum())
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("cell", &self.info.cell)
            .field("version", &self.info.version)
            .field("status", &self.status)
            .field("blocks", &self.blocks.as_ref().map(Vec::len))
            .field("task", &self.task.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::BlockGeometry;
    use crate::scene::RecordingScene;
    use sylvan_core::MeshBuilder;

    fn tri_mesh() -> sylvan_core::Mesh {
        let mut builder = MeshBuilder::new();
        builder.quad([Vec3::ZERO, Vec3::X, Vec3::ONE, Vec3::Z], Vec3::Y, [[0.0; 2]; 4]);
        builder.build()
    }

    #[test]
    fn blocks_tile_the_page_centered_on_cell() {
        let page = Page::new("Test", CellCoord::new(1, -1), 64.0, 4, 1, 0);
        let blocks = page.create_blocks();
        assert_eq!(blocks.len(), 16);

        assert_eq!(blocks[0].center(), Vec3::new(40.0, 0.0, -88.0));
        assert_eq!(blocks[15].center(), Vec3::new(88.0, 0.0, -40.0));
        assert_eq!(blocks[5].x, 1);
        assert_eq!(blocks[5].z, 1);

        let mean = blocks.iter().map(Block::center).sum::<Vec3>() / 16.0;
        assert_eq!(mean, page.center());
    }

    #[test]
    fn block_footprints_do_not_overlap() {
        let page = Page::new("Test", CellCoord::new(0, 0), 32.0, 2, 1, 0);
        let info = *page.info();
        let hits = info.blocks().filter(|b| b.contains(0.0, 0.0)).count();
        assert_eq!(hits, 1);
        assert!(info.block(0, 0).contains(-16.0, -16.0));
        assert!(!info.block(1, 1).contains(16.0, 16.0));
    }

    #[test]
    fn attach_then_unload_releases_blocks() {
        let mut scene = RecordingScene::new();
        let mut page = Page::new("Test", CellCoord::new(0, 0), 32.0, 2, 1, 0);
        page.attach(
            PageContents::from_blocks(vec![BlockGeometry {
                index: 3,
                levels: vec![Some(tri_mesh())],
            }]),
            &mut scene,
        );
        assert_eq!(page.status(), PageStatus::Loaded);
        assert_eq!(page.triangle_count(), 2);

        page.process(Vec3::ZERO, &DetailLevels::new().with_level(100.0, 0.0).unwrap(), false, &mut scene);
        assert_eq!(scene.attached_count(), 1);

        page.unload(&mut scene);
        assert!(page.blocks().is_none());
        assert_eq!(page.status(), PageStatus::Unrequested);
        assert_eq!(scene.attached_count(), 0);

        page.unload(&mut scene);
        assert_eq!(scene.detach_calls(), 1);
    }

    #[test]
    fn cache_timer_accumulates() {
        let mut page = Page::new("Test", CellCoord::new(0, 0), 32.0, 1, 1, 0);
        page.increase_cache_timer(0.5);
        page.increase_cache_timer(0.25);
        assert_eq!(page.cache_timer(), 0.75);
        page.reset_cache_timer();
        assert_eq!(page.cache_timer(), 0.0);
    }
}
