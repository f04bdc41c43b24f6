//! Scripted page loader shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::Vec3;
use parking_lot::Mutex;
use sylvan_core::{CellCoord, MeshBuilder, Result};
use sylvan_paging::{
    BlockGeometry, CancelToken, DetailLevels, Executor, LoadTask, Page, PageContents, PageLoader, PageVersion,
    PagingConfig, PagingManager, RecordingScene,
};

pub const PAGE_SIZE: f32 = 64.0;

/// What a task does for a given cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Geometry,
    Empty,
    Panic,
    /// Bump the loader version while generating (once, or every time),
    /// then return geometry or nothing.
    BumpVersion { always: bool, empty: bool },
}

/// Loader producing `version + 1` quads per block and level.
pub struct TestLoader {
    tag: &'static str,
    page_size: f32,
    levels: DetailLevels,
    resolution: u32,
    version: Arc<PageVersion>,
    behaviour: Mutex<HashMap<CellCoord, Behaviour>>,
    loads: Mutex<HashMap<CellCoord, usize>>,
    bumped: Arc<AtomicBool>,
}

impl TestLoader {
    pub fn new(tag: &'static str) -> Self {
        let levels = DetailLevels::new()
            .with_level(100.0, 0.0)
            .and_then(|l| l.with_level(400.0, 0.0))
            .unwrap();
        Self {
            tag,
            page_size: PAGE_SIZE,
            levels,
            resolution: 2,
            version: Arc::new(PageVersion::new()),
            behaviour: Mutex::new(HashMap::new()),
            loads: Mutex::new(HashMap::new()),
            bumped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub const fn with_page_size(mut self, page_size: f32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn set_behaviour(&self, cell: CellCoord, behaviour: Behaviour) {
        self.behaviour.lock().insert(cell, behaviour);
    }

    /// Number of load tasks built for `cell`.
    pub fn loads(&self, cell: CellCoord) -> usize {
        self.loads.lock().get(&cell).copied().unwrap_or(0)
    }

    pub fn total_loads(&self) -> usize {
        self.loads.lock().values().sum()
    }

    /// Triangles one loaded page carries at `version`.
    pub fn page_triangles(&self, version: u32) -> usize {
        let blocks = (self.resolution * self.resolution) as usize;
        blocks * self.levels.len() * 2 * (version as usize + 1)
    }
}

impl PageLoader for TestLoader {
    fn type_tag(&self) -> &'static str {
        self.tag
    }

    fn page_size(&self) -> f32 {
        self.page_size
    }

    fn resolution(&self) -> u32 {
        self.resolution
    }

    fn detail_levels(&self) -> &DetailLevels {
        &self.levels
    }

    fn page_version(&self) -> u32 {
        self.version.get()
    }

    fn increment_page_version(&self) -> u32 {
        self.version.increment()
    }

    fn load_page(&self, page: &Page) -> LoadTask {
        let info = *page.info();
        *self.loads.lock().entry(info.cell).or_default() += 1;
        let behaviour = self
            .behaviour
            .lock()
            .get(&info.cell)
            .copied()
            .unwrap_or(Behaviour::Geometry);
        let levels = self.levels.len();
        let version = Arc::clone(&self.version);
        let bumped = Arc::clone(&self.bumped);

        Box::new(move |_token: &CancelToken| -> Result<PageContents> {
            match behaviour {
                Behaviour::Empty => return Ok(PageContents::empty()),
                Behaviour::Panic => panic!("generator bug at {}", info.cell),
                Behaviour::BumpVersion { always, empty } => {
                    if always || !bumped.swap(true, Ordering::AcqRel) {
                        version.increment();
                    }
                    if empty {
                        return Ok(PageContents::empty());
                    }
                }
                Behaviour::Geometry => {}
            }

            let blocks = info
                .blocks()
                .map(|block| {
                    let h = block.half_width * 0.5;
                    let mesh = (0..=info.version)
                        .fold(MeshBuilder::new(), |mut builder, _| {
                            builder.quad(
                                [
                                    Vec3::new(-h, 0.0, -h),
                                    Vec3::new(h, 0.0, -h),
                                    Vec3::new(h, 0.0, h),
                                    Vec3::new(-h, 0.0, h),
                                ],
                                Vec3::Y,
                                [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
                            );
                            builder
                        })
                        .build();
                    BlockGeometry {
                        index: block.index,
                        levels: vec![Some(mesh); levels],
                    }
                })
                .collect();
            Ok(PageContents::from_blocks(blocks))
        })
    }
}

/// World position at the center of `cell`.
pub fn at(x: i32, z: i32) -> Vec3 {
    CellCoord::new(x, z).center(PAGE_SIZE)
}

pub fn config(radius: i32) -> PagingConfig {
    PagingConfig {
        radius,
        ..PagingConfig::default()
    }
}

/// Inline-executor manager over a fresh [`TestLoader`].
pub fn manager(
    radius: i32,
    cache_time: Option<f32>,
) -> (PagingManager, Arc<TestLoader>, RecordingScene) {
    let loader = Arc::new(TestLoader::new("Test"));
    let scene = RecordingScene::new();
    let manager = PagingManager::new(
        loader.clone(),
        Arc::new(Executor::inline()),
        Box::new(scene.clone()),
        PagingConfig {
            cache_time,
            ..config(radius)
        },
    )
    .unwrap();
    (manager, loader, scene)
}

pub fn sorted(mut cells: Vec<CellCoord>) -> Vec<CellCoord> {
    cells.sort_by_key(|c| (c.x, c.z));
    cells
}

/// Every attached scene node belongs to a cell in `cells`.
pub fn attached_within(scene: &RecordingScene, cells: &[CellCoord]) -> bool {
    scene.with_record(|record| record.attached.keys().all(|key| cells.contains(&key.cell)))
}
