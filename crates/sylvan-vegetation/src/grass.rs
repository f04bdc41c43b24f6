//! Grass layer configuration and page loader.

use std::f32::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;

use glam::Vec3;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sylvan_core::constants::{MIN_BLOCK_SIZE, MIN_PAGE_SIZE};
use sylvan_core::math::slope_tangent;
use sylvan_core::{Error, Mesh, MeshBuilder, Result};
use sylvan_paging::{
    BlockGeometry, BlockInfo, CancelToken, DetailLevels, LoadTask, Page, PageArchive,
    PageContents, PageInfo, PageLoader, PageVersion,
};

use crate::context::WorldContext;
use crate::provider::{lerp_range, DataProvider};
use crate::terrain::TerrainQuery;

/// Scene and archive tag of grass pages.
pub const GRASS_TAG: &str = "Grass";

/// One kind of grass planted from one density layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrassLayer {
    pub name: String,
    /// Texture asset path, resolved by the renderer.
    pub texture: String,
    /// Layer index passed to [`DataProvider::get_data`].
    pub density_layer: usize,
    pub min_width: f32,
    pub max_width: f32,
    pub min_height: f32,
    pub max_height: f32,
    /// Steepest ground (rise over run) grass stands on.
    pub max_slope: f32,
    /// Crossed quads per instance.
    pub billboards: u32,
}

impl Default for GrassLayer {
    fn default() -> Self {
        Self {
            name: "grass".to_string(),
            texture: "textures/grass.png".to_string(),
            density_layer: 0,
            min_width: 0.6,
            max_width: 1.0,
            min_height: 0.3,
            max_height: 0.8,
            max_slope: 1.0,
            billboards: 2,
        }
    }
}

impl GrassLayer {
    pub fn validate(&self) -> Result<()> {
        let invalid =
            |msg: String| Err(Error::InvalidConfig(format!("grass layer {}: {msg}", self.name)));
        if self.texture.trim().is_empty() {
            return invalid("texture is required".to_string());
        }
        if self.min_width.is_nan()
            || self.min_width <= 0.0
            || self.min_height.is_nan()
            || self.min_height < 0.0
        {
            return invalid(format!(
                "sizes must be positive (width {}, height {})",
                self.min_width, self.min_height
            ));
        }
        if self.min_width > self.max_width {
            return invalid(format!(
                "min width {} exceeds max width {}",
                self.min_width, self.max_width
            ));
        }
        if self.min_height > self.max_height {
            return invalid(format!(
                "min height {} exceeds max height {}",
                self.min_height, self.max_height
            ));
        }
        if self.max_slope.is_nan() || self.max_slope < 0.0 {
            return invalid(format!(
                "max slope must not be negative, got {}",
                self.max_slope
            ));
        }
        if self.billboards == 0 {
            return invalid("needs at least one billboard".to_string());
        }
        Ok(())
    }
}

/// Grass loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrassConfig {
    /// Page edge length; a power of two no smaller than [`MIN_PAGE_SIZE`].
    pub page_size: f32,
    /// Blocks per page edge.
    pub resolution: u32,
    /// Distance at which grass starts fading out.
    pub far: f32,
    /// Length of the fade band.
    pub transition: f32,
    pub layers: Vec<GrassLayer>,
    /// Where generated pages are persisted, if anywhere.
    pub archive_dir: Option<PathBuf>,
}

impl Default for GrassConfig {
    fn default() -> Self {
        Self {
            page_size: 64.0,
            resolution: 4,
            far: 80.0,
            transition: 20.0,
            layers: vec![GrassLayer::default()],
            archive_dir: None,
        }
    }
}

impl GrassConfig {
    pub fn validate(&self) -> Result<()> {
        validate_page_size(self.page_size)?;
        if self.resolution == 0 {
            return Err(Error::InvalidConfig(
                "grass resolution must be at least 1".to_string(),
            ));
        }
        for layer in &self.layers {
            layer.validate()?;
        }
        Ok(())
    }

    /// Resolution after the minimum block size safeguard.
    pub fn effective_resolution(&self) -> u32 {
        clamp_resolution(GRASS_TAG, self.page_size, self.resolution)
    }
}

/// Pages must be a power of two and at least [`MIN_PAGE_SIZE`] wide.
pub(crate) fn validate_page_size(page_size: f32) -> Result<()> {
    let is_pow2 = page_size.fract() == 0.0 && (page_size as u32).is_power_of_two();
    if page_size.is_nan() || page_size < MIN_PAGE_SIZE || !is_pow2 {
        return Err(Error::InvalidConfig(format!(
            "page size must be a power of two of at least {MIN_PAGE_SIZE}, got {page_size}"
        )));
    }
    Ok(())
}

/// Reduce `resolution` so blocks are at least [`MIN_BLOCK_SIZE`] wide.
pub(crate) fn clamp_resolution(tag: &str, page_size: f32, resolution: u32) -> u32 {
    let max = ((page_size / MIN_BLOCK_SIZE) as u32).max(1);
    if resolution > max {
        tracing::warn!(
            "{tag}: resolution {resolution} gives blocks under {MIN_BLOCK_SIZE} units, using {max}"
        );
        max
    } else {
        resolution
    }
}

/// Plants grass quads on terrain pages.
pub struct GrassLoader {
    page_size: f32,
    resolution: u32,
    levels: DetailLevels,
    layers: RwLock<Arc<Vec<GrassLayer>>>,
    version: PageVersion,
    terrain: Arc<dyn TerrainQuery>,
    provider: Arc<dyn DataProvider>,
    archive: Option<Arc<PageArchive>>,
}

impl GrassLoader {
    pub fn new(config: GrassConfig, ctx: &WorldContext) -> Result<Self> {
        config.validate()?;
        let resolution = config.effective_resolution();
        let levels = DetailLevels::new().with_level(config.far, config.transition)?;
        let archive = config
            .archive_dir
            .map(|dir| PageArchive::new(dir, GRASS_TAG, resolution, config.page_size))
            .transpose()?
            .map(Arc::new);

        tracing::info!(
            "Grass loader: page size {}, {resolution}x{resolution} blocks, {} layers",
            config.page_size,
            config.layers.len()
        );

        Ok(Self {
            page_size: config.page_size,
            resolution,
            levels,
            layers: RwLock::new(Arc::new(config.layers)),
            version: PageVersion::new(),
            terrain: Arc::clone(ctx.terrain()),
            provider: Arc::clone(ctx.provider()),
            archive,
        })
    }

    /// Current layer set.
    pub fn layers(&self) -> Arc<Vec<GrassLayer>> {
        Arc::clone(&self.layers.read())
    }

    /// Replace every layer; returns the new page version.
    pub fn set_layers(&self, layers: Vec<GrassLayer>) -> Result<u32> {
        for layer in &layers {
            layer.validate()?;
        }
        *self.layers.write() = Arc::new(layers);
        Ok(self.increment_page_version())
    }

    /// Replace the layer at `index`; returns the new page version.
    pub fn set_layer(&self, index: usize, layer: GrassLayer) -> Result<u32> {
        layer.validate()?;
        {
            let mut guard = self.layers.write();
            let mut layers = guard.as_ref().clone();
            let slot = layers
                .get_mut(index)
                .ok_or_else(|| Error::NotFound(format!("grass layer {index}")))?;
            *slot = layer;
            *guard = Arc::new(layers);
        }
        Ok(self.increment_page_version())
    }

    pub fn archive(&self) -> Option<&PageArchive> {
        self.archive.as_deref()
    }
}

impl PageLoader for GrassLoader {
    fn type_tag(&self) -> &'static str {
        GRASS_TAG
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
        let layers = self.layers();
        let terrain = Arc::clone(&self.terrain);
        let provider = Arc::clone(&self.provider);
        let archive = self.archive.clone();

        Box::new(move |token: &CancelToken| -> Result<PageContents> {
            if layers.is_empty() || !provider.has_contents(&info) {
                return Ok(PageContents::empty());
            }
            let generate = || {
                let mut blocks = Vec::with_capacity((info.resolution * info.resolution) as usize);
                for block in info.blocks() {
                    if token.is_cancelled() {
                        return Err(Error::Generation(format!("page {} cancelled", info.cell)));
                    }
                    let mesh =
                        block_mesh(&info, &block, &layers, terrain.as_ref(), provider.as_ref());
                    blocks.push(BlockGeometry {
                        index: block.index,
                        levels: vec![Some(mesh)],
                    });
                }
                Ok(PageContents::from_blocks(blocks))
            };
            match &archive {
                Some(archive) => archive.load_or_generate(&info, generate),
                None => generate(),
            }
        })
    }
}

/// Merge every layer's grass in one block, relative to the block center.
///
/// Each layer maps onto its own horizontal slot of a shared texture atlas.
fn block_mesh(
    info: &PageInfo,
    block: &BlockInfo,
    layers: &[GrassLayer],
    terrain: &dyn TerrainQuery,
    provider: &dyn DataProvider,
) -> Mesh {
    let mut builder = MeshBuilder::new();
    let slots = layers.len() as f32;

    for (slot, layer) in layers.iter().enumerate() {
        let u0 = slot as f32 / slots;
        let u1 = (slot + 1) as f32 / slots;
        let uvs = [[u0, 1.0], [u1, 1.0], [u1, 0.0], [u0, 0.0]];

        for p in provider.get_data(info, block, layer.density_layer) {
            if !block.contains(p.x, p.z) {
                continue;
            }
            let normal = terrain.normal(p.x, p.z);
            let width = lerp_range(layer.min_width, layer.max_width, p.scale);
            let height = if slope_tangent(normal) > layer.max_slope {
                0.0
            } else {
                lerp_range(layer.min_height, layer.max_height, p.scale)
            };
            let base = Vec3::new(p.x, terrain.height(p.x, p.z), p.z) - block.center;
            let up = Vec3::Y * height;

            for k in 0..layer.billboards {
                let angle = p.rotation + k as f32 * PI / layer.billboards as f32;
                let half = Vec3::new(angle.cos(), 0.0, angle.sin()) * (width * 0.5);
                builder.quad(
                    [base - half, base + half, base + half + up, base - half + up],
                    normal,
                    uvs,
                );
            }
        }
    }
    builder.build()
}
