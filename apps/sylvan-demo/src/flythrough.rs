//! Terrain, grass and trees paged along a scripted camera path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;
use sylvan_core::Result;
use sylvan_paging::{
    Executor, ExecutorConfig, NullScene, PagingConfig, PagingManager, PagingStats,
    ReactiveManager,
};
use sylvan_vegetation::{
    DensityConfig, DensityMapProvider, GrassConfig, GrassLoader, NoiseTerrain, TerrainLoader,
    TerrainLoaderConfig, TerrainQuery, TreeConfig, TreeLoader, TreeRegistry, WorldContext,
};
use tracing::{error, info, info_span};

/// Simulated frame time.
const FRAME_TIME: f32 = 1.0 / 60.0;
/// Shared page size of all three layers; reactive layers must match their source.
const PAGE_SIZE: f32 = 64.0;
/// Eye height above the ground.
const EYE_HEIGHT: f32 = 1.8;
/// Sideways swing of the flight path.
const SWING: f32 = 200.0;
/// How far the teleport jumps along x.
const TELEPORT_DISTANCE: f32 = 5000.0;
/// Upper bound on frames spent waiting for in-flight pages after the flight.
const SETTLE_FRAMES: u32 = 2000;

pub struct Flythrough {
    terrain: Arc<dyn TerrainQuery>,
    ground: PagingManager,
    grass: ReactiveManager,
    trees: ReactiveManager,
    frame: u32,
}

impl Flythrough {
    pub fn new(params: &crate::params::DemoParams) -> Result<Self> {
        let executor = Arc::new(Executor::new(&ExecutorConfig {
            threads: params.threads,
            inline: params.inline,
        })?);
        let terrain: Arc<dyn TerrainQuery> = Arc::new(NoiseTerrain::with_seed(params.seed)?);
        let grass_density = Arc::new(DensityMapProvider::new(DensityConfig {
            seed: params.seed,
            ..DensityConfig::default()
        })?);
        let tree_density = Arc::new(DensityMapProvider::new(DensityConfig {
            seed: params.seed.wrapping_add(1),
            layers: vec![0.004, 0.003, 0.002],
            noise_scale: 250.0,
            coverage: 0.45,
        })?);

        let ctx = WorldContext::new(executor, Arc::clone(&terrain), grass_density);
        let tree_ctx = ctx.with_provider(tree_density);

        let paging = PagingConfig {
            radius: params.radius,
            cache_time: params.cache_time,
            ..PagingConfig::default()
        };

        let ground_loader = TerrainLoader::new(
            &TerrainLoaderConfig {
                page_size: PAGE_SIZE,
                ..TerrainLoaderConfig::default()
            },
            &ctx,
        )?;
        let mut ground =
            ctx.active_manager(Arc::new(ground_loader), Box::new(NullScene), paging.clone())?;

        let grass_loader = GrassLoader::new(
            GrassConfig {
                page_size: PAGE_SIZE,
                archive_dir: params.archive.as_ref().map(|dir| dir.join("grass")),
                ..GrassConfig::default()
            },
            &ctx,
        )?;
        let grass = ctx.reactive_manager(
            Arc::new(grass_loader),
            Box::new(NullScene),
            paging.clone(),
            &mut ground,
        )?;

        let tree_loader = TreeLoader::new(
            TreeConfig {
                page_size: PAGE_SIZE,
                archive_dir: params.archive.as_ref().map(|dir| dir.join("trees")),
                ..TreeConfig::default()
            },
            TreeRegistry::builtin()?,
            &tree_ctx,
        )?;
        let trees = tree_ctx.reactive_manager(
            Arc::new(tree_loader),
            Box::new(NullScene),
            paging,
            &mut ground,
        )?;

        Ok(Self {
            terrain,
            ground,
            grass,
            trees,
            frame: 0,
        })
    }

    pub fn run(&mut self, params: &crate::params::DemoParams) {
        let _span = info_span!("flythrough", frames = params.frames).entered();
        let started = Instant::now();
        let teleport = params.teleport_frame();

        for frame in 0..params.frames {
            let offset = if frame >= teleport {
                TELEPORT_DISTANCE
            } else {
                0.0
            };
            let camera = self.camera_at(frame as f32 * FRAME_TIME, params.speed, offset);
            if frame == teleport {
                info!("Teleporting to ({:.0}, {:.0})", camera.x, camera.z);
            }
            self.step(camera);
            if frame % params.log_every == 0 {
                self.log_stats();
            }
        }

        if !self.settle(params) {
            error!("Pages still in flight after {SETTLE_FRAMES} settle frames");
        }
        self.log_stats();
        info!("Simulated {} frames in {:.2?}", self.frame, started.elapsed());
    }

    fn camera_at(&self, time: f32, speed: f32, offset: f32) -> Vec3 {
        let x = time * speed + offset;
        let z = SWING * (x / (SWING * 1.5)).sin();
        Vec3::new(x, self.terrain.height(x, z) + EYE_HEIGHT, z)
    }

    fn step(&mut self, camera: Vec3) {
        self.ground.update(camera, FRAME_TIME);
        self.grass.update(camera, FRAME_TIME);
        self.trees.update(camera, FRAME_TIME);
        self.frame += 1;

        for (layer, errors) in [
            ("terrain", self.ground.drain_operator_errors()),
            ("grass", self.grass.drain_operator_errors()),
            ("trees", self.trees.drain_operator_errors()),
        ] {
            for err in errors {
                error!("{layer}: {err}");
            }
        }
    }

    /// Keep updating at the last camera position until nothing is pending.
    fn settle(&mut self, params: &crate::params::DemoParams) -> bool {
        let end = self.frame.saturating_sub(1) as f32 * FRAME_TIME;
        let offset = if params.frames > params.teleport_frame() {
            TELEPORT_DISTANCE
        } else {
            0.0
        };
        let camera = self.camera_at(end, params.speed, offset);

        for _ in 0..SETTLE_FRAMES {
            if [self.ground.stats(), self.grass.stats(), self.trees.stats()]
                .iter()
                .all(|stats| stats.pending == 0 && stats.unrequested == 0)
            {
                return true;
            }
            self.step(camera);
            if !params.inline {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        false
    }

    fn log_stats(&self) {
        let center = self.ground.center();
        info!(frame = self.frame, ?center, "{}", summary("terrain", &self.ground.stats()));
        info!(frame = self.frame, "{}", summary("grass", &self.grass.stats()));
        info!(frame = self.frame, "{}", summary("trees", &self.trees.stats()));
    }
}

fn summary(layer: &str, stats: &PagingStats) -> String {
    format!(
        "{layer}: {} pages ({} loaded, {} pending, {} idle, {} cached), {} triangles, {} KiB",
        stats.pages,
        stats.loaded,
        stats.pending,
        stats.idle,
        stats.cached,
        stats.triangles,
        stats.memory_bytes / 1024
    )
}
