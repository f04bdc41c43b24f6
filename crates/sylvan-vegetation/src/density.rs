//! Noise-driven placement provider.

use std::f32::consts::TAU;

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sylvan_core::{Error, Result};
use sylvan_paging::{BlockInfo, PageInfo};

use crate::provider::{DataProvider, Placement};

/// Lattice steps per page edge when probing for any coverage.
const COVERAGE_PROBES: u32 = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DensityConfig {
    pub seed: u32,
    /// Instances per square world unit, one entry per layer.
    pub layers: Vec<f32>,
    /// Horizontal scale of density patches.
    pub noise_scale: f64,
    /// Density (in `[0, 1]`) below which nothing grows.
    pub coverage: f32,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            layers: vec![0.5],
            noise_scale: 80.0,
            coverage: 0.35,
        }
    }
}

impl DensityConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some((layer, d)) = self
            .layers
            .iter()
            .enumerate()
            .find(|(_, d)| !d.is_finite() || **d < 0.0)
        {
            return Err(Error::InvalidConfig(format!(
                "density of layer {layer} must be a non-negative number, got {d}"
            )));
        }
        if self.noise_scale.is_nan() || self.noise_scale <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "density noise scale must be positive, got {}",
                self.noise_scale
            )));
        }
        if !(0.0..=1.0).contains(&self.coverage) {
            return Err(Error::InvalidConfig(format!(
                "coverage must be in [0, 1], got {}",
                self.coverage
            )));
        }
        Ok(())
    }
}

/// Jittered placements thinned by a noise density map.
///
/// Output is a pure function of the seed, cell, block, layer and page
/// version, so regenerating a page reproduces it exactly.
pub struct DensityMapProvider {
    config: DensityConfig,
    noise: Fbm<Perlin>,
}

impl DensityMapProvider {
    pub fn new(config: DensityConfig) -> Result<Self> {
        config.validate()?;
        let noise = Fbm::<Perlin>::new(config.seed).set_octaves(3);
        Ok(Self { config, noise })
    }

    pub const fn config(&self) -> &DensityConfig {
        &self.config
    }

    /// Density in `[0, 1]` at world `(x, z)`.
    pub fn density(&self, x: f32, z: f32) -> f32 {
        let scale = self.config.noise_scale;
        let value = self.noise.get([f64::from(x) / scale, f64::from(z) / scale]);
        ((value as f32 + 1.0) * 0.5).clamp(0.0, 1.0)
    }

    fn covered(&self, x: f32, z: f32) -> bool {
        self.density(x, z) >= self.config.coverage
    }
}

impl DataProvider for DensityMapProvider {
    /// Sampled on a coarse lattice, so patches smaller than a lattice step can
    /// be missed.
    fn has_contents(&self, page: &PageInfo) -> bool {
        if self.config.layers.iter().all(|&d| d <= 0.0) {
            return false;
        }
        let origin = page.origin();
        let step = page.page_size / COVERAGE_PROBES as f32;
        (0..=COVERAGE_PROBES).any(|i| {
            (0..=COVERAGE_PROBES).any(|j| {
                self.covered(origin.x + i as f32 * step, origin.z + j as f32 * step)
            })
        })
    }

    fn get_data(&self, page: &PageInfo, block: &BlockInfo, layer: usize) -> Vec<Placement> {
        let Some(&density) = self.config.layers.get(layer) else {
            return Vec::new();
        };
        let width = block.half_width * 2.0;
        let expected = density * width * width;
        let mut rng = StdRng::seed_from_u64(block_seed(
            self.config.seed,
            [page.cell.key(), u64::from(block.index), layer as u64, u64::from(page.version)],
        ));
        let extra = usize::from(rng.random::<f32>() < expected.fract());
        let count = expected as usize + extra;

        let min_x = block.center.x - block.half_width;
        let min_z = block.center.z - block.half_width;
        let span = (1.0 - self.config.coverage).max(f32::EPSILON);
        let mut placements = Vec::with_capacity(count);
        for _ in 0..count {
            let x = rng.random_range(min_x..min_x + width);
            let z = rng.random_range(min_z..min_z + width);
            let rotation = rng.random_range(0.0..TAU);
            let d = self.density(x, z);
            if d < self.config.coverage {
                continue;
            }
            placements.push(Placement {
                x,
                y: 0.0,
                z,
                scale: ((d - self.config.coverage) / span).clamp(0.0, 1.0),
                rotation,
            });
        }
        placements
    }
}

impl std::fmt::Debug for DensityMapProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DensityMapProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

const fn splitmix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn block_seed(seed: u32, parts: [u64; 4]) -> u64 {
    parts
        .iter()
        .fold(u64::from(seed), |hash, &part| splitmix(hash ^ part))
}
