//! Detail levels and distance-based visibility.

use serde::{Deserialize, Serialize};
use sylvan_core::{Error, Result};

/// One distance band with its own geometry representation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetailLevel {
    /// Distance where this level starts.
    pub near: f32,
    /// Distance where this level hands over to the next.
    pub far: f32,
    /// Width of the cross-fade band past `far` (0 disables fading).
    pub transition: f32,
}

impl DetailLevel {
    /// End of the cross-fade band.
    #[inline]
    pub fn far_trans(&self) -> f32 {
        self.far + self.transition
    }

    #[inline]
    pub fn fades(&self) -> bool {
        self.transition > 0.0
    }
}

/// Ordered, contiguous list of detail levels.
///
/// Level `i` starts where level `i - 1` ends.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailLevels {
    levels: Vec<DetailLevel>,
}

impl DetailLevels {
    pub const fn new() -> Self {
        Self { levels: Vec::new() }
    }

    /// Append a level ending at `far`.
    pub fn push(&mut self, far: f32, transition: f32) -> Result<()> {
        let near = self.levels.last().map_or(0.0, |l| l.far);
        if far.is_nan() || far <= near {
            return Err(Error::InvalidConfig(format!(
                "detail level {} must end beyond {near} (got {far})",
                self.levels.len()
            )));
        }
        if transition.is_nan() || transition < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "detail level {} has negative transition {transition}",
                self.levels.len()
            )));
        }
        self.levels.push(DetailLevel {
            near,
            far,
            transition,
        });
        Ok(())
    }

    /// Builder form of [`DetailLevels::push`].
    pub fn with_level(mut self, far: f32, transition: f32) -> Result<Self> {
        self.push(far, transition)?;
        Ok(self)
    }

    /// Validate an explicit list.
    pub fn from_levels(levels: Vec<DetailLevel>) -> Result<Self> {
        let mut out = Self::new();
        for (i, level) in levels.iter().enumerate() {
            let expected_near = out.levels.last().map_or(0.0, |l| l.far);
            if (level.near - expected_near).abs() > f32::EPSILON {
                return Err(Error::InvalidConfig(format!(
                    "detail level {i} starts at {} but previous level ends at {expected_near}",
                    level.near
                )));
            }
            out.push(level.far, level.transition)?;
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn get(&self, level: usize) -> Option<&DetailLevel> {
        self.levels.get(level)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DetailLevel> {
        self.levels.iter()
    }

    /// Farthest distance at which anything is visible.
    pub fn max_distance(&self) -> f32 {
        self.levels.last().map_or(0.0, DetailLevel::far_trans)
    }

    /// Whether `level` should be shown for a block at planar distance `dist`.
    ///
    /// A boundary is a hard cut at `far` unless fading is enabled and the
    /// level ending there has a transition band. Across a fading boundary
    /// the block is treated as a disc of radius `real_max`: the closer level
    /// stays visible until the near edge of the disc leaves the band, and
    /// the farther level appears as soon as the far edge reaches its near
    /// distance, so both are shown while the renderer cross-fades them.
    pub fn is_visible(&self, level: usize, dist: f32, real_max: f32, fading: bool) -> bool {
        let Some(band) = self.levels.get(level) else {
            return false;
        };

        let fades_out = fading && band.fades();
        let before_end = if fades_out {
            dist - real_max < band.far_trans()
        } else {
            dist < band.far
        };

        let fades_in = fading
            && level
                .checked_sub(1)
                .and_then(|prev| self.levels.get(prev))
                .is_some_and(DetailLevel::fades);
        let past_start = if fades_in {
            dist + real_max >= band.near
        } else {
            dist >= band.near
        };

        before_end && past_start
    }
}
