//! Terrain tiles as a pageable layer.
//!
//! Vegetation managers follow a [`TerrainLoader`]'s active manager so grass
//! and trees only exist on loaded ground.

use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use sylvan_core::{Error, Mesh, Result, Vertex};
use sylvan_paging::{
    BlockGeometry, BlockInfo, CancelToken, DetailLevels, LoadTask, Page, PageContents,
    PageLoader, PageVersion,
};

use crate::context::WorldContext;
use crate::grass::{clamp_resolution, validate_page_size};
use crate::terrain::TerrainQuery;

/// Scene tag of terrain pages.
pub const TERRAIN_TAG: &str = "Terrain";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainLoaderConfig {
    pub page_size: f32,
    pub resolution: u32,
    /// Grid cells per block edge at the finest level; halved per level.
    pub samples: u32,
    /// Far distance of each detail level, ascending.
    pub level_far: Vec<f32>,
    pub transition: f32,
}

impl Default for TerrainLoaderConfig {
    fn default() -> Self {
        Self {
            page_size: 64.0,
            resolution: 4,
            samples: 8,
            level_far: vec![200.0, 500.0, 1200.0],
            transition: 0.0,
        }
    }
}

impl TerrainLoaderConfig {
    pub fn validate(&self) -> Result<()> {
        validate_page_size(self.page_size)?;
        if self.resolution == 0 || self.samples == 0 {
            return Err(Error::InvalidConfig(format!(
                "terrain resolution and samples must be at least 1 (got {} and {})",
                self.resolution, self.samples
            )));
        }
        self.detail_levels().map(|_| ())
    }

    pub fn detail_levels(&self) -> Result<DetailLevels> {
        if self.level_far.is_empty() {
            return Err(Error::InvalidConfig(
                "terrain needs at least one detail level".to_string(),
            ));
        }
        self.level_far
            .iter()
            .try_fold(DetailLevels::new(), |levels, &far| {
                levels.with_level(far, self.transition)
            })
    }
}

/// Generates a height-field patch per block from a [`TerrainQuery`].
pub struct TerrainLoader {
    page_size: f32,
    resolution: u32,
    samples: u32,
    levels: DetailLevels,
    version: PageVersion,
    terrain: Arc<dyn TerrainQuery>,
}

impl TerrainLoader {
    pub fn new(config: &TerrainLoaderConfig, ctx: &WorldContext) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            page_size: config.page_size,
            resolution: clamp_resolution(TERRAIN_TAG, config.page_size, config.resolution),
            samples: config.samples,
            levels: config.detail_levels()?,
            version: PageVersion::new(),
            terrain: Arc::clone(ctx.terrain()),
        })
    }
}

impl PageLoader for TerrainLoader {
    fn type_tag(&self) -> &'static str {
        TERRAIN_TAG
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
        let terrain = Arc::clone(&self.terrain);
        let samples = self.samples;
        let level_count = self.levels.len();

        Box::new(move |token: &CancelToken| -> Result<PageContents> {
            let mut blocks = Vec::with_capacity((info.resolution * info.resolution) as usize);
            for block in info.blocks() {
                if token.is_cancelled() {
                    return Err(Error::Generation(format!("page {} cancelled", info.cell)));
                }
                let levels = (0..level_count)
                    .map(|level| {
                        Some(patch(&block, level_cells(samples, level), terrain.as_ref()))
                    })
                    .collect();
                blocks.push(BlockGeometry {
                    index: block.index,
                    levels,
                });
            }
            Ok(PageContents::from_blocks(blocks))
        })
    }
}

/// Grid cells per block edge at `level`: halved per level, never below one.
fn level_cells(samples: u32, level: usize) -> u32 {
    u32::try_from(level)
        .ok()
        .and_then(|shift| samples.checked_shr(shift))
        .unwrap_or(0)
        .max(1)
}

/// `cells × cells` grid over the block footprint, relative to its center.
fn patch(block: &BlockInfo, cells: u32, terrain: &dyn TerrainQuery) -> Mesh {
    let side = cells + 1;
    let step = block.half_width * 2.0 / cells as f32;
    let min = block.center - Vec3::new(block.half_width, 0.0, block.half_width);

    let mut vertices = Vec::with_capacity((side * side) as usize);
    for j in 0..side {
        for i in 0..side {
            let x = (i as f32).mul_add(step, min.x);
            let z = (j as f32).mul_add(step, min.z);
            let position = Vec3::new(x, terrain.height(x, z), z) - block.center;
            let uv = [i as f32 / cells as f32, j as f32 / cells as f32];
            vertices.push(Vertex::new(position, terrain.normal(x, z), uv));
        }
    }

    let mut indices = Vec::with_capacity((cells * cells * 6) as usize);
    for j in 0..cells {
        for i in 0..cells {
            let a = j * side + i;
            let b = a + 1;
            let c = a + side + 1;
            let d = a + side;
            indices.extend_from_slice(&[a, d, c, a, c, b]);
        }
    }
    Mesh::new(vertices, indices)
}
