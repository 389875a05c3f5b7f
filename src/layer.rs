//! Dual-position particle layers.
//!
//! A [`ParticleLayer`] holds two index-aligned point sets: where each entity
//! sits in the chaos state and where it sits in the formed state, plus
//! optional static per-entity attributes. Layers are built once and are
//! read-only afterwards; animators borrow them.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A homogeneous set of entities sharing one chaos/formed transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleLayer {
    chaos: Vec<Vec3>,
    target: Vec<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sizes: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    colors: Option<Vec<Vec3>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    speeds: Option<Vec<f32>>,
}

impl ParticleLayer {
    /// Build a layer from its two position sets.
    ///
    /// Fails if the sets are empty or differ in length.
    pub fn new(chaos: Vec<Vec3>, target: Vec<Vec3>) -> Result<Self, ConfigError> {
        if chaos.is_empty() {
            return Err(ConfigError::EmptyCount { what: "layer" });
        }
        check_len("target positions", chaos.len(), target.len())?;
        Ok(Self {
            chaos,
            target,
            sizes: None,
            colors: None,
            speeds: None,
        })
    }

    /// Attach per-entity sizes.
    pub fn with_sizes(mut self, sizes: Vec<f32>) -> Result<Self, ConfigError> {
        check_len("sizes", self.count(), sizes.len())?;
        self.sizes = Some(sizes);
        Ok(self)
    }

    /// Attach per-entity linear RGB colours.
    pub fn with_colors(mut self, colors: Vec<Vec3>) -> Result<Self, ConfigError> {
        check_len("colors", self.count(), colors.len())?;
        self.colors = Some(colors);
        Ok(self)
    }

    /// Attach per-entity speed multipliers.
    pub fn with_speeds(mut self, speeds: Vec<f32>) -> Result<Self, ConfigError> {
        check_len("speeds", self.count(), speeds.len())?;
        self.speeds = Some(speeds);
        Ok(self)
    }

    /// Number of entities.
    #[inline]
    pub fn count(&self) -> usize {
        self.chaos.len()
    }

    #[inline]
    pub fn chaos_positions(&self) -> &[Vec3] {
        &self.chaos
    }

    #[inline]
    pub fn target_positions(&self) -> &[Vec3] {
        &self.target
    }

    #[inline]
    pub fn sizes(&self) -> Option<&[f32]> {
        self.sizes.as_deref()
    }

    #[inline]
    pub fn colors(&self) -> Option<&[Vec3]> {
        self.colors.as_deref()
    }

    #[inline]
    pub fn speeds(&self) -> Option<&[f32]> {
        self.speeds.as_deref()
    }

    /// Size of entity `i`, or `default` if the layer carries no sizes.
    #[inline]
    pub fn size_or(&self, i: usize, default: f32) -> f32 {
        self.sizes.as_ref().map_or(default, |s| s[i])
    }

    /// Colour of entity `i`, or `default` if the layer carries no colours.
    #[inline]
    pub fn color_or(&self, i: usize, default: Vec3) -> Vec3 {
        self.colors.as_ref().map_or(default, |c| c[i])
    }

    /// Speed multiplier of entity `i`, or `1.0` if the layer carries none.
    #[inline]
    pub fn speed(&self, i: usize) -> f32 {
        self.speeds.as_ref().map_or(1.0, |s| s[i])
    }

    /// Destination of entity `i` for a discrete state.
    #[inline]
    pub fn destination(&self, i: usize, formed: bool) -> Vec3 {
        if formed {
            self.target[i]
        } else {
            self.chaos[i]
        }
    }

    /// Serialize the layer to JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Restore a layer from JSON, re-checking all length invariants.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: ParticleLayer = serde_json::from_str(json)?;
        let mut layer = ParticleLayer::new(raw.chaos, raw.target)?;
        if let Some(sizes) = raw.sizes {
            layer = layer.with_sizes(sizes)?;
        }
        if let Some(colors) = raw.colors {
            layer = layer.with_colors(colors)?;
        }
        if let Some(speeds) = raw.speeds {
            layer = layer.with_speeds(speeds)?;
        }
        Ok(layer)
    }
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), ConfigError> {
    if expected != actual {
        return Err(ConfigError::LengthMismatch {
            what,
            expected,
            actual,
        });
    }
    Ok(())
}
