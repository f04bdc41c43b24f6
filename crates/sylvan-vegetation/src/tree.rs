//! Tree types and the tree page loader.
//!
//! Trees have two detail levels: merged template geometry up close and a
//! crossed-quad impostor further out.

use std::path::PathBuf;
use std::sync::Arc;

use glam::{Affine3A, Quat, Vec3};
use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sylvan_core::{Error, Mesh, MeshBuilder, Result};
use sylvan_paging::{
    BlockGeometry, BlockInfo, CancelToken, DetailLevels, LoadTask, Page, PageArchive,
    PageContents, PageInfo, PageLoader, PageVersion,
};

use crate::context::WorldContext;
use crate::grass::{clamp_resolution, validate_page_size};
use crate::provider::{lerp_range, DataProvider};
use crate::terrain::TerrainQuery;

/// Scene and archive tag of tree pages.
pub const TREE_TAG: &str = "Trees";

const FULL_UVS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];

/// Dimensions of a procedural tree template, in model units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeShape {
    pub trunk_height: f32,
    pub trunk_radius: f32,
    pub crown_height: f32,
    pub crown_radius: f32,
}

/// One registered tree type.
#[derive(Debug, Clone)]
pub struct TreeSpec {
    pub id: String,
    /// Model asset path, resolved by the renderer.
    pub model: String,
    pub impostor_texture: String,
    pub min_scale: f32,
    pub max_scale: f32,
    /// Layer index passed to [`DataProvider::get_data`].
    pub density_layer: usize,
    full: Mesh,
    impostor: Mesh,
}

impl TreeSpec {
    /// Build a spec whose templates are generated from `shape`.
    pub fn procedural(
        id: impl Into<String>,
        model: impl Into<String>,
        impostor_texture: impl Into<String>,
        shape: TreeShape,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            impostor_texture: impostor_texture.into(),
            min_scale: 0.8,
            max_scale: 1.2,
            density_layer: 0,
            full: full_template(shape),
            impostor: impostor_template(shape),
        }
    }

    #[must_use]
    pub fn with_scale(mut self, min_scale: f32, max_scale: f32) -> Self {
        self.min_scale = min_scale;
        self.max_scale = max_scale;
        self
    }

    #[must_use]
    pub fn with_density_layer(mut self, layer: usize) -> Self {
        self.density_layer = layer;
        self
    }

    /// Template mesh for detail level 0 (full) or 1 (impostor).
    pub const fn template(&self, level: usize) -> Option<&Mesh> {
        match level {
            0 => Some(&self.full),
            1 => Some(&self.impostor),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::InvalidConfig("tree id is required".to_string()));
        }
        if self.model.trim().is_empty() || self.impostor_texture.trim().is_empty() {
            return Err(Error::InvalidConfig(format!(
                "tree {} needs a model and an impostor texture",
                self.id
            )));
        }
        if self.min_scale.is_nan()
            || self.max_scale.is_nan()
            || self.min_scale <= 0.0
            || self.min_scale > self.max_scale
        {
            return Err(Error::InvalidConfig(format!(
                "tree {} scale range {}..{} is invalid",
                self.id, self.min_scale, self.max_scale
            )));
        }
        Ok(())
    }
}

/// Four-sided frustum between two square rings.
fn ring_quads(builder: &mut MeshBuilder, bottom: (f32, f32), top: (f32, f32)) {
    let (y0, r0) = bottom;
    let (y1, r1) = top;
    let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
    for side in 0..4 {
        let (ax, az) = corners[side];
        let (bx, bz) = corners[(side + 1) % 4];
        let normal = Vec3::new(ax + bx, 0.0, az + bz).normalize_or_zero();
        builder.quad(
            [
                Vec3::new(ax * r0, y0, az * r0),
                Vec3::new(bx * r0, y0, bz * r0),
                Vec3::new(bx * r1, y1, bz * r1),
                Vec3::new(ax * r1, y1, az * r1),
            ],
            normal,
            FULL_UVS,
        );
    }
}

fn full_template(shape: TreeShape) -> Mesh {
    let mut builder = MeshBuilder::with_capacity(8);
    ring_quads(
        &mut builder,
        (0.0, shape.trunk_radius),
        (shape.trunk_height, shape.trunk_radius),
    );
    ring_quads(
        &mut builder,
        (shape.trunk_height, shape.crown_radius),
        (shape.trunk_height + shape.crown_height, shape.crown_radius * 0.2),
    );
    builder.build()
}

fn impostor_template(shape: TreeShape) -> Mesh {
    let h = shape.trunk_height + shape.crown_height;
    let r = shape.crown_radius;
    let mut builder = MeshBuilder::with_capacity(2);
    builder.quad(
        [
            Vec3::new(-r, 0.0, 0.0),
            Vec3::new(r, 0.0, 0.0),
            Vec3::new(r, h, 0.0),
            Vec3::new(-r, h, 0.0),
        ],
        Vec3::Z,
        FULL_UVS,
    );
    builder.quad(
        [
            Vec3::new(0.0, 0.0, r),
            Vec3::new(0.0, 0.0, -r),
            Vec3::new(0.0, h, -r),
            Vec3::new(0.0, h, r),
        ],
        Vec3::X,
        FULL_UVS,
    );
    builder.build()
}

/// Tree types by id, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct TreeRegistry {
    specs: Vec<TreeSpec>,
    index: HashMap<String, usize>,
}

impl TreeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oak, pine and birch with procedural templates.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(TreeSpec::procedural(
            "oak",
            "models/trees/oak.glb",
            "textures/trees/oak_impostor.png",
            TreeShape {
                trunk_height: 3.0,
                trunk_radius: 0.35,
                crown_height: 5.0,
                crown_radius: 3.0,
            },
        ))?;
        registry.register(
            TreeSpec::procedural(
                "pine",
                "models/trees/pine.glb",
                "textures/trees/pine_impostor.png",
                TreeShape {
                    trunk_height: 2.0,
                    trunk_radius: 0.25,
                    crown_height: 9.0,
                    crown_radius: 2.0,
                },
            )
            .with_scale(0.9, 1.5)
            .with_density_layer(1),
        )?;
        registry.register(
            TreeSpec::procedural(
                "birch",
                "models/trees/birch.glb",
                "textures/trees/birch_impostor.png",
                TreeShape {
                    trunk_height: 4.0,
                    trunk_radius: 0.2,
                    crown_height: 4.0,
                    crown_radius: 1.8,
                },
            )
            .with_scale(0.7, 1.1)
            .with_density_layer(2),
        )?;
        Ok(registry)
    }

    /// Add a tree type, returning its index.
    pub fn register(&mut self, spec: TreeSpec) -> Result<usize> {
        spec.validate()?;
        if self.index.contains_key(&spec.id) {
            return Err(Error::InvalidConfig(format!(
                "tree {} registered twice",
                spec.id
            )));
        }
        let index = self.specs.len();
        self.index.insert(spec.id.clone(), index);
        self.specs.push(spec);
        Ok(index)
    }

    pub fn get(&self, id: &str) -> Result<&TreeSpec> {
        self.index
            .get(id)
            .map(|&i| &self.specs[i])
            .ok_or_else(|| Error::NotFound(format!("tree type {id}")))
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Tree loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    pub page_size: f32,
    pub resolution: u32,
    /// Where full geometry gives way to impostors.
    pub near: f32,
    /// Where impostors end.
    pub impostor_far: f32,
    /// Cross-fade length at each boundary.
    pub transition: f32,
    pub archive_dir: Option<PathBuf>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            page_size: 128.0,
            resolution: 4,
            near: 150.0,
            impostor_far: 600.0,
            transition: 30.0,
            archive_dir: None,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<()> {
        validate_page_size(self.page_size)?;
        if self.resolution == 0 {
            return Err(Error::InvalidConfig(
                "tree resolution must be at least 1".to_string(),
            ));
        }
        self.detail_levels().map(|_| ())
    }

    pub fn detail_levels(&self) -> Result<DetailLevels> {
        DetailLevels::new()
            .with_level(self.near, self.transition)?
            .with_level(self.impostor_far, self.transition)
    }
}

/// Plants registered tree types on terrain pages.
pub struct TreeLoader {
    page_size: f32,
    resolution: u32,
    levels: DetailLevels,
    registry: RwLock<Arc<TreeRegistry>>,
    version: PageVersion,
    terrain: Arc<dyn TerrainQuery>,
    provider: Arc<dyn DataProvider>,
    archive: Option<Arc<PageArchive>>,
}

impl TreeLoader {
    pub fn new(config: TreeConfig, registry: TreeRegistry, ctx: &WorldContext) -> Result<Self> {
        config.validate()?;
        let resolution = clamp_resolution(TREE_TAG, config.page_size, config.resolution);
        let archive = config
            .archive_dir
            .as_ref()
            .map(|dir| PageArchive::new(dir, TREE_TAG, resolution, config.page_size))
            .transpose()?
            .map(Arc::new);

        tracing::info!(
            "Tree loader: page size {}, {resolution}x{resolution} blocks, {} tree types",
            config.page_size,
            registry.len()
        );

        Ok(Self {
            page_size: config.page_size,
            resolution,
            levels: config.detail_levels()?,
            registry: RwLock::new(Arc::new(registry)),
            version: PageVersion::new(),
            terrain: Arc::clone(ctx.terrain()),
            provider: Arc::clone(ctx.provider()),
            archive,
        })
    }

    pub fn registry(&self) -> Arc<TreeRegistry> {
        Arc::clone(&self.registry.read())
    }

    /// Swap the tree table; returns the new page version.
    pub fn set_registry(&self, registry: TreeRegistry) -> u32 {
        *self.registry.write() = Arc::new(registry);
        self.increment_page_version()
    }
}

impl PageLoader for TreeLoader {
    fn type_tag(&self) -> &'static str {
        TREE_TAG
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
        let registry = self.registry();
        let terrain = Arc::clone(&self.terrain);
        let provider = Arc::clone(&self.provider);
        let archive = self.archive.clone();

        Box::new(move |token: &CancelToken| -> Result<PageContents> {
            if registry.is_empty() || !provider.has_contents(&info) {
                return Ok(PageContents::empty());
            }
            let generate = || {
                let mut blocks = Vec::with_capacity((info.resolution * info.resolution) as usize);
                for block in info.blocks() {
                    if token.is_cancelled() {
                        return Err(Error::Generation(format!("page {} cancelled", info.cell)));
                    }
                    let [full, impostor] =
                        block_meshes(&info, &block, &registry, terrain.as_ref(), provider.as_ref());
                    blocks.push(BlockGeometry {
                        index: block.index,
                        levels: vec![Some(full), Some(impostor)],
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

/// Merged full and impostor geometry for one block, relative to its center.
fn block_meshes(
    info: &PageInfo,
    block: &BlockInfo,
    registry: &TreeRegistry,
    terrain: &dyn TerrainQuery,
    provider: &dyn DataProvider,
) -> [Mesh; 2] {
    let mut full = MeshBuilder::new();
    let mut impostor = MeshBuilder::new();

    for spec in registry.iter() {
        for p in provider.get_data(info, block, spec.density_layer) {
            if !block.contains(p.x, p.z) {
                continue;
            }
            let base = Vec3::new(p.x, terrain.height(p.x, p.z), p.z) - block.center;
            let transform = Affine3A::from_scale_rotation_translation(
                Vec3::splat(lerp_range(spec.min_scale, spec.max_scale, p.scale)),
                Quat::from_rotation_y(p.rotation),
                base,
            );
            full.append_transformed(&spec.full, &transform);
            impostor.append_transformed(&spec.impostor, &transform);
        }
    }
    [full.build(), impostor.build()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_lookup() {
        let registry = TreeRegistry::builtin().unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.index_of("pine"), Some(1));
        assert_eq!(registry.get("birch").unwrap().density_layer, 2);
        assert!(matches!(registry.get("palm"), Err(Error::NotFound(_))));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut registry = TreeRegistry::builtin().unwrap();
        let oak = registry.get("oak").unwrap().clone();
        assert!(registry.register(oak).is_err());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn templates_have_expected_shape() {
        let registry = TreeRegistry::builtin().unwrap();
        let oak = registry.get("oak").unwrap();
        assert_eq!(oak.template(0).unwrap().triangle_count(), 16);
        assert_eq!(oak.template(1).unwrap().triangle_count(), 4);
        assert!(oak.template(2).is_none());

        let bound = oak.template(1).unwrap().bound.unwrap();
        assert!((bound.max.y - 8.0).abs() < 1e-5);
    }

    #[test]
    fn config_builds_two_contiguous_levels() {
        let levels = TreeConfig::default().detail_levels().unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels.get(1).unwrap().near, 150.0);

        let inverted = TreeConfig {
            impostor_far: 100.0,
            ..TreeConfig::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn invalid_spec_is_rejected() {
        let spec = TreeSpec::procedural(
            "shrub",
            "models/shrub.glb",
            "",
            TreeShape {
                trunk_height: 0.5,
                trunk_radius: 0.1,
                crown_height: 1.0,
                crown_radius: 0.8,
            },
        );
        assert!(TreeRegistry::new().register(spec.clone()).is_err());
        let spec = TreeSpec {
            impostor_texture: "textures/shrub.png".to_string(),
            ..spec
        }
        .with_scale(2.0, 1.0);
        assert!(spec.validate().is_err());
    }
}
