//! Terrain height queries and a procedural noise terrain.

use glam::Vec3;
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use serde::{Deserialize, Serialize};
use sylvan_core::{Error, Result};

/// Step used for finite-difference normals (world units).
const NORMAL_STEP: f32 = 0.5;

/// Octave limit of the fractal noise.
const MAX_OCTAVES: usize = 32;

/// Read-only access to the ground surface.
///
/// Shared between the coordinator and worker threads.
pub trait TerrainQuery: Send + Sync {
    /// Surface height at world `(x, z)`.
    fn height(&self, x: f32, z: f32) -> f32;

    /// Unit surface normal at world `(x, z)`.
    ///
    /// The default takes central differences of [`TerrainQuery::height`].
    fn normal(&self, x: f32, z: f32) -> Vec3 {
        let dx = self.height(x + NORMAL_STEP, z) - self.height(x - NORMAL_STEP, z);
        let dz = self.height(x, z + NORMAL_STEP) - self.height(x, z - NORMAL_STEP);
        Vec3::new(-dx, 2.0 * NORMAL_STEP, -dz).normalize()
    }
}

/// Level ground.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatTerrain {
    pub height: f32,
}

impl TerrainQuery for FlatTerrain {
    fn height(&self, _x: f32, _z: f32) -> f32 {
        self.height
    }

    fn normal(&self, _x: f32, _z: f32) -> Vec3 {
        Vec3::Y
    }
}

/// Noise terrain configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainConfig {
    /// Seed for noise generation.
    pub seed: u32,
    /// Height of the lowest possible surface.
    pub base_height: f32,
    /// Horizontal scale of terrain features.
    pub terrain_scale: f64,
    /// Maximum terrain height variation.
    pub terrain_height: f64,
    /// Number of noise octaves for detail.
    pub octaves: usize,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            base_height: 0.0,
            terrain_scale: 400.0,
            terrain_height: 60.0,
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
        }
    }
}

impl TerrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.terrain_scale.is_nan() || self.terrain_scale <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "terrain scale must be positive, got {}",
                self.terrain_scale
            )));
        }
        if self.terrain_height < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "terrain height must not be negative, got {}",
                self.terrain_height
            )));
        }
        if !(1..=MAX_OCTAVES).contains(&self.octaves) {
            return Err(Error::InvalidConfig(format!(
                "octaves must be in 1..={MAX_OCTAVES}, got {}",
                self.octaves
            )));
        }
        Ok(())
    }
}

/// Fractal-noise height field.
pub struct NoiseTerrain {
    config: TerrainConfig,
    height_noise: Fbm<Perlin>,
}

impl NoiseTerrain {
    pub fn new(config: TerrainConfig) -> Result<Self> {
        config.validate()?;
        let height_noise = Fbm::<Perlin>::new(config.seed)
            .set_octaves(config.octaves)
            .set_lacunarity(config.lacunarity)
            .set_persistence(config.persistence);

        Ok(Self {
            config,
            height_noise,
        })
    }

    pub fn with_seed(seed: u32) -> Result<Self> {
        Self::new(TerrainConfig {
            seed,
            ..TerrainConfig::default()
        })
    }

    pub const fn config(&self) -> &TerrainConfig {
        &self.config
    }
}

impl TerrainQuery for NoiseTerrain {
    fn height(&self, x: f32, z: f32) -> f32 {
        let nx = f64::from(x) / self.config.terrain_scale;
        let nz = f64::from(z) / self.config.terrain_scale;

        // Noise returns [-1, 1], map to [0, terrain_height]
        let value = self.height_noise.get([nx, nz]).clamp(-1.0, 1.0);
        ((value + 1.0) * 0.5 * self.config.terrain_height) as f32 + self.config.base_height
    }
}

impl std::fmt::Debug for NoiseTerrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseTerrain")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Ramp;

    impl TerrainQuery for Ramp {
        fn height(&self, x: f32, _z: f32) -> f32 {
            x
        }
    }

    #[test]
    fn finite_difference_normal() {
        let n = Ramp.normal(3.0, -7.0);
        assert_relative_eq!(n.length(), 1.0, epsilon = 1e-5);
        // 45 degree ramp rising along +x tilts the normal toward -x.
        assert_relative_eq!(n.x, -n.y, epsilon = 1e-5);
        assert_relative_eq!(n.z, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn noise_height_stays_in_range() {
        let terrain = NoiseTerrain::new(TerrainConfig {
            base_height: 10.0,
            ..TerrainConfig::default()
        })
        .unwrap();
        for i in -20..20 {
            let h = terrain.height(i as f32 * 37.0, i as f32 * -11.0);
            assert!((10.0..=70.0).contains(&h), "height {h} out of range");
        }
    }

    #[test]
    fn noise_terrain_is_deterministic() {
        let a = NoiseTerrain::with_seed(7).unwrap();
        let b = NoiseTerrain::with_seed(7).unwrap();
        assert_eq!(a.height(120.5, -40.25), b.height(120.5, -40.25));
    }

    #[test]
    fn rejects_bad_config() {
        let config = TerrainConfig {
            octaves: 0,
            ..TerrainConfig::default()
        };
        assert!(NoiseTerrain::new(config).is_err());

        let config = TerrainConfig {
            terrain_scale: 0.0,
            ..TerrainConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
