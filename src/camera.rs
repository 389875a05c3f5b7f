//! Gesture-steered camera rig.
//!
//! The hand position picks a point on a plane in front of the tree; the
//! camera eases toward it and always looks at a fixed focus point.

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// How the camera approaches its target each tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CameraSmoothing {
    /// Constant fraction of the remaining distance per tick.
    ///
    /// Responsiveness depends on frame rate.
    PerTick { factor: f32 },
    /// Exponential decay, `1 - exp(-rate * dt)` per tick.
    Exponential { rate: f32 },
}

impl Default for CameraSmoothing {
    fn default() -> Self {
        CameraSmoothing::PerTick { factor: 0.05 }
    }
}

impl CameraSmoothing {
    /// Blend factor for one tick of `delta_time` seconds.
    #[inline]
    pub fn blend(&self, delta_time: f32) -> f32 {
        match *self {
            CameraSmoothing::PerTick { factor } => factor.clamp(0.0, 1.0),
            CameraSmoothing::Exponential { rate } => 1.0 - (-rate.max(0.0) * delta_time.max(0.0)).exp(),
        }
    }
}

/// Rig geometry.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigParams {
    pub scale_x: f32,
    pub scale_y: f32,
    pub base_y: f32,
    pub distance_z: f32,
    pub focus: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub smoothing: CameraSmoothing,
}

impl Default for RigParams {
    fn default() -> Self {
        Self {
            scale_x: 10.0,
            scale_y: 5.0,
            base_y: 4.0,
            distance_z: 20.0,
            focus: Vec3::new(0.0, 4.0, 0.0),
            fov_y: 50.0,
            near: 0.1,
            far: 200.0,
            smoothing: CameraSmoothing::default(),
        }
    }
}

/// Smoothed camera following the latest gesture target.
#[derive(Clone, Debug)]
pub struct CameraRig {
    params: RigParams,
    position: Vec3,
}

impl CameraRig {
    /// Rig resting at the neutral position.
    pub fn new(params: RigParams) -> Self {
        let position = Self::goal_for(&params, Vec2::ZERO);
        Self { params, position }
    }

    fn goal_for(params: &RigParams, target: Vec2) -> Vec3 {
        Vec3::new(
            target.x * params.scale_x,
            params.base_y + target.y * params.scale_y,
            params.distance_z,
        )
    }

    /// Where the camera is heading for a gesture target in `[-1, 1]^2`.
    pub fn goal(&self, target: Vec2) -> Vec3 {
        Self::goal_for(&self.params, target)
    }

    /// Move one tick toward the goal for `target`.
    pub fn tick(&mut self, target: Vec2, delta_time: f32) {
        let goal = self.goal(target);
        self.position = self.position.lerp(goal, self.params.smoothing.blend(delta_time));
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn focus(&self) -> Vec3 {
        self.params.focus
    }

    /// View matrix looking at the fixed focus point.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.params.focus, Vec3::Y)
    }

    /// Projection for the given aspect ratio.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(
            self.params.fov_y.to_radians(),
            aspect,
            self.params.near,
            self.params.far,
        )
    }
}
