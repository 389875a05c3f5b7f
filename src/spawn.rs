//! Spatial field generation.
//!
//! Produces the paired chaos/target point sets and static per-entity
//! attributes for each visual layer. Generation is pure apart from the
//! random source, so tests pass a seeded RNG.
//!
//! ```ignore
//! let mut rng = StdRng::seed_from_u64(7);
//! let layer = SpatialFieldGenerator::new(&mut rng).generate(15_000, &ShapeParams {
//!     chaos: ChaosShape::Sphere { radius: 20.0 },
//!     target: TargetShape::ConeVolume { cone: Cone::default() },
//!     size: Some(ValueRange::new(0.5, 1.0)),
//!     ..Default::default()
//! })?;
//! ```

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use crate::error::ConfigError;
use crate::layer::ParticleLayer;

/// Half-open `[min, max)` range for a scalar attribute.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f32,
    pub max: f32,
}

impl ValueRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    fn validate(&self, what: &'static str) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(ConfigError::InvalidRange {
                what,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Uniform sample, strictly below `max`. A degenerate range yields `min`.
    #[inline]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        if self.min < self.max {
            rng.gen_range(self.min..self.max)
        } else {
            self.min
        }
    }
}

/// The "tree": a cone standing on its base, apex up.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cone {
    /// Total height `H`; local y spans `[-H/2, H/2]`.
    pub height: f32,
    /// Base radius `Rmax`.
    pub radius: f32,
    /// Vertical offset added to every target y.
    pub lift: f32,
}

impl Default for Cone {
    fn default() -> Self {
        Self {
            height: 14.0,
            radius: 5.0,
            lift: 2.0,
        }
    }
}

impl Cone {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.height > 0.0 && self.height.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                what: "cone height",
                reason: format!("must be positive, got {}", self.height),
            });
        }
        if !(self.radius > 0.0 && self.radius.is_finite()) {
            return Err(ConfigError::InvalidParameter {
                what: "cone radius",
                reason: format!("must be positive, got {}", self.radius),
            });
        }
        if !self.lift.is_finite() {
            return Err(ConfigError::InvalidParameter {
                what: "cone lift",
                reason: "must be finite".into(),
            });
        }
        Ok(())
    }

    /// Lowest target y (base of the cone after lift).
    #[inline]
    pub fn base_y(&self) -> f32 {
        self.lift - self.height * 0.5
    }

    /// Normalized height in `[0, 1]` of a lifted y coordinate.
    #[inline]
    pub fn normalized_height(&self, y: f32) -> f32 {
        (y - self.base_y()) / self.height
    }

    /// Cone radius at a lifted y coordinate.
    #[inline]
    pub fn radius_at(&self, y: f32) -> f32 {
        self.radius * (1.0 - self.normalized_height(y))
    }
}

/// Distribution for the scattered state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChaosShape {
    /// Uniform by volume inside a sphere centred at the origin.
    Sphere { radius: f32 },
    /// Uniform inside an axis-aligned box of the given full extents.
    Box { extents: Vec3 },
}

/// Distribution for the formed state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetShape {
    /// Uniform inside the cone volume.
    ConeVolume { cone: Cone },
    /// On the cone surface, pushed `outset` outward.
    ConeSurface { cone: Cone, outset: f32 },
}

impl TargetShape {
    pub fn cone(&self) -> &Cone {
        match self {
            TargetShape::ConeVolume { cone } | TargetShape::ConeSurface { cone, .. } => cone,
        }
    }
}

/// Everything [`SpatialFieldGenerator::generate`] needs besides the count.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeParams {
    pub chaos: ChaosShape,
    pub target: TargetShape,
    pub size: Option<ValueRange>,
    pub speed: Option<ValueRange>,
    /// Linear RGB colours picked uniformly per entity.
    pub palette: Option<Vec<Vec3>>,
}

impl Default for ShapeParams {
    fn default() -> Self {
        Self {
            chaos: ChaosShape::Sphere { radius: 20.0 },
            target: TargetShape::ConeVolume {
                cone: Cone::default(),
            },
            size: None,
            speed: None,
            palette: None,
        }
    }
}

impl ShapeParams {
    /// Check every parameter without generating anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.chaos {
            ChaosShape::Sphere { radius } if !(radius > 0.0 && radius.is_finite()) => {
                return Err(ConfigError::InvalidParameter {
                    what: "chaos radius",
                    reason: format!("must be positive, got {radius}"),
                });
            }
            ChaosShape::Box { extents } if !(extents.is_finite() && extents.min_element() >= 0.0) => {
                return Err(ConfigError::InvalidParameter {
                    what: "chaos box extents",
                    reason: format!("must be finite and non-negative, got {extents}"),
                });
            }
            _ => {}
        }
        self.target.cone().validate()?;
        if let TargetShape::ConeSurface { outset, .. } = self.target {
            if !outset.is_finite() {
                return Err(ConfigError::InvalidParameter {
                    what: "cone outset",
                    reason: "must be finite".into(),
                });
            }
        }
        if let Some(range) = &self.size {
            range.validate("size")?;
        }
        if let Some(range) = &self.speed {
            range.validate("speed")?;
        }
        if let Some(palette) = &self.palette {
            if palette.is_empty() {
                return Err(ConfigError::EmptyCount { what: "palette" });
            }
        }
        Ok(())
    }
}

/// Builds [`ParticleLayer`]s from a random source.
pub struct SpatialFieldGenerator<'a, R: Rng + ?Sized> {
    rng: &'a mut R,
}

impl<'a, R: Rng + ?Sized> SpatialFieldGenerator<'a, R> {
    pub fn new(rng: &'a mut R) -> Self {
        Self { rng }
    }

    /// Generate a layer of `count` entities.
    ///
    /// Attribute draws are independent per entity; the order of draws is
    /// chaos, target, size, speed, colour.
    pub fn generate(&mut self, count: usize, params: &ShapeParams) -> Result<ParticleLayer, ConfigError> {
        if count == 0 {
            return Err(ConfigError::EmptyCount { what: "layer" });
        }
        params.validate()?;

        let mut chaos = Vec::with_capacity(count);
        let mut target = Vec::with_capacity(count);
        let mut sizes = params.size.map(|_| Vec::with_capacity(count));
        let mut speeds = params.speed.map(|_| Vec::with_capacity(count));
        let mut colors = params.palette.as_ref().map(|_| Vec::with_capacity(count));

        for _ in 0..count {
            chaos.push(match params.chaos {
                ChaosShape::Sphere { radius } => self.random_in_sphere(radius),
                ChaosShape::Box { extents } => self.random_in_box(extents),
            });
            target.push(match params.target {
                TargetShape::ConeVolume { cone } => self.random_in_cone(&cone),
                TargetShape::ConeSurface { cone, outset } => self.random_on_cone(&cone, outset),
            });
            if let (Some(out), Some(range)) = (sizes.as_mut(), params.size) {
                out.push(range.sample(&mut *self.rng));
            }
            if let (Some(out), Some(range)) = (speeds.as_mut(), params.speed) {
                out.push(range.sample(&mut *self.rng));
            }
            if let (Some(out), Some(palette)) = (colors.as_mut(), params.palette.as_ref()) {
                out.push(palette[self.rng.gen_range(0..palette.len())]);
            }
        }

        let mut layer = ParticleLayer::new(chaos, target)?;
        if let Some(sizes) = sizes {
            layer = layer.with_sizes(sizes)?;
        }
        if let Some(speeds) = speeds {
            layer = layer.with_speeds(speeds)?;
        }
        if let Some(colors) = colors {
            layer = layer.with_colors(colors)?;
        }
        Ok(layer)
    }

    /// Random point inside a sphere, uniform by volume.
    ///
    /// `r = R * cbrt(U)`, `theta = 2*pi*U`, `phi = acos(2U - 1)`.
    pub fn random_in_sphere(&mut self, radius: f32) -> Vec3 {
        let r = radius * self.rng.gen::<f32>().cbrt();
        let theta = self.rng.gen::<f32>() * TAU;
        let phi = (2.0 * self.rng.gen::<f32>() - 1.0).clamp(-1.0, 1.0).acos();

        Vec3::new(
            r * phi.sin() * theta.cos(),
            r * phi.sin() * theta.sin(),
            r * phi.cos(),
        )
    }

    /// Random point inside a box of the given full extents, centred at the origin.
    pub fn random_in_box(&mut self, extents: Vec3) -> Vec3 {
        Vec3::new(
            (self.rng.gen::<f32>() - 0.5) * extents.x,
            (self.rng.gen::<f32>() - 0.5) * extents.y,
            (self.rng.gen::<f32>() - 0.5) * extents.z,
        )
    }

    /// Random point inside the cone, uniform by area at each height.
    pub fn random_in_cone(&mut self, cone: &Cone) -> Vec3 {
        let (y, radius_at_y) = self.cone_slice(cone);
        // sqrt for uniform disk
        let r = self.rng.gen::<f32>().sqrt() * radius_at_y;
        let angle = self.rng.gen::<f32>() * TAU;
        Vec3::new(r * angle.cos(), y + cone.lift, r * angle.sin())
    }

    /// Random point on the cone surface, pushed `outset` outward.
    pub fn random_on_cone(&mut self, cone: &Cone, outset: f32) -> Vec3 {
        let (y, radius_at_y) = self.cone_slice(cone);
        let r = radius_at_y + outset;
        let angle = self.rng.gen::<f32>() * TAU;
        Vec3::new(r * angle.cos(), y + cone.lift, r * angle.sin())
    }

    /// Unlifted height and the cone radius there.
    fn cone_slice(&mut self, cone: &Cone) -> (f32, f32) {
        let half = cone.height * 0.5;
        let y = self.rng.gen::<f32>() * cone.height - half;
        let ny = (y + half) / cone.height;
        (y, cone.radius * (1.0 - ny))
    }
}
