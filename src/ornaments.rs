//! Instanced ornament bodies.
//!
//! Unlike foliage, ornaments are moved on the host. Each one chases the
//! destination picked by the discrete tree state with an exponential lerp
//! at its own speed, spins about Y, and gets a fresh transform every tick.
//! The instance buffer is flagged for upload once per pass.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};
use std::f32::consts::TAU;

use crate::layer::ParticleLayer;
use crate::transition::TreeState;

/// Per-instance data uploaded to the GPU.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
}

impl InstanceRaw {
    pub fn new(model: Mat4, color: Vec3) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            color: color.extend(1.0).to_array(),
        }
    }
}

/// Scale, then rotate, then translate.
#[inline]
pub fn compute_transform(position: Vec3, scale: f32, rotation: Quat) -> Mat4 {
    Mat4::from_scale_rotation_translation(Vec3::splat(scale), rotation, position)
}

/// Tuning for [`InstancedBodyAnimator`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyMotion {
    /// Lerp rate multiplier; the per-tick factor is `speed * follow_rate * dt`.
    pub follow_rate: f32,
    /// Spin in radians per second per unit of speed.
    pub spin_rate: f32,
    /// Scale used when the layer carries no sizes.
    pub default_scale: f32,
    /// Colour used when the layer carries no colours.
    pub default_color: Vec3,
}

impl Default for BodyMotion {
    fn default() -> Self {
        Self {
            follow_rate: 2.0,
            spin_rate: 0.5,
            default_scale: 0.25,
            default_color: Vec3::ONE,
        }
    }
}

/// Host-side animator for instanced bodies.
pub struct InstancedBodyAnimator {
    layer: ParticleLayer,
    motion: BodyMotion,
    current: Vec<Vec3>,
    angles: Vec<f32>,
    instances: Vec<InstanceRaw>,
    dirty: bool,
}

impl InstancedBodyAnimator {
    /// Every body starts at its chaos position.
    pub fn new(layer: ParticleLayer, motion: BodyMotion) -> Self {
        let current = layer.chaos_positions().to_vec();
        let angles = vec![0.0; layer.count()];
        let instances = (0..layer.count())
            .map(|i| {
                InstanceRaw::new(
                    compute_transform(current[i], layer.size_or(i, motion.default_scale), Quat::IDENTITY),
                    layer.color_or(i, motion.default_color),
                )
            })
            .collect();

        Self {
            layer,
            motion,
            current,
            angles,
            instances,
            dirty: true,
        }
    }

    pub fn layer(&self) -> &ParticleLayer {
        &self.layer
    }

    pub fn count(&self) -> u32 {
        self.layer.count() as u32
    }

    /// Current (already lerped) positions.
    pub fn positions(&self) -> &[Vec3] {
        &self.current
    }

    /// Instance buffer contents as of the last tick.
    pub fn instances(&self) -> &[InstanceRaw] {
        &self.instances
    }

    /// Whether the instance buffer changed since the last upload.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Hand out the whole buffer for upload if it changed, clearing the flag.
    pub fn take_dirty(&mut self) -> Option<&[InstanceRaw]> {
        if self.dirty {
            self.dirty = false;
            Some(&self.instances)
        } else {
            None
        }
    }

    /// One full pass over every instance.
    pub fn tick(&mut self, state: TreeState, delta_time: f32) {
        let formed = state.is_formed();
        let dt = delta_time.max(0.0);

        for i in 0..self.layer.count() {
            let speed = self.layer.speed(i);
            let destination = self.layer.destination(i, formed);
            let factor = (speed * self.motion.follow_rate * dt).clamp(0.0, 1.0);
            self.current[i] = self.current[i].lerp(destination, factor);

            self.angles[i] = (self.angles[i] + dt * self.motion.spin_rate * speed).rem_euclid(TAU);

            let model = compute_transform(
                self.current[i],
                self.layer.size_or(i, self.motion.default_scale),
                Quat::from_rotation_y(self.angles[i]),
            );
            self.instances[i] = InstanceRaw::new(model, self.layer.color_or(i, self.motion.default_color));
        }

        self.dirty = true;
    }
}

/// Instanced ornament program.
///
/// Vertex slot 0 is the unit sphere mesh, slot 1 the [`InstanceRaw`] buffer.
pub const ORNAMENT_SHADER: &str = r#"
struct Camera {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    model: mat4x4<f32>,
    viewport: vec2<f32>,
    _pad: vec2<f32>,
    eye: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: Camera;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
};

struct InstanceInput {
    @location(3) model_0: vec4<f32>,
    @location(4) model_1: vec4<f32>,
    @location(5) model_2: vec4<f32>,
    @location(6) model_3: vec4<f32>,
    @location(7) color: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec3<f32>,
};

@vertex
fn vs_main(v: VertexInput, inst: InstanceInput) -> VertexOutput {
    let model = camera.model * mat4x4<f32>(inst.model_0, inst.model_1, inst.model_2, inst.model_3);
    let world = model * vec4<f32>(v.position, 1.0);

    var out: VertexOutput;
    out.clip_position = camera.proj * camera.view * world;
    out.world_pos = world.xyz;
    // Uniform scale only, so the model matrix is fine for normals.
    out.normal = (model * vec4<f32>(v.normal, 0.0)).xyz;
    out.color = inst.color.rgb;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let n = normalize(in.normal);
    let l = normalize(vec3<f32>(0.4, 1.0, 0.6));
    let v = normalize(camera.eye.xyz - in.world_pos);
    let h = normalize(l + v);

    let diffuse = max(dot(n, l), 0.0);
    let spec = pow(max(dot(n, h), 0.0), 48.0);
    let rim = pow(1.0 - max(dot(n, v), 0.0), 3.0) * 0.3;

    let rgb = in.color * (0.25 + 0.75 * diffuse) + vec3<f32>(spec * 0.8) + in.color * rim;
    return vec4<f32>(rgb, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(speeds: Vec<f32>) -> ParticleLayer {
        let n = speeds.len();
        ParticleLayer::new(vec![Vec3::new(10.0, 0.0, 0.0); n], vec![Vec3::ZERO; n])
            .unwrap()
            .with_speeds(speeds)
            .unwrap()
    }

    #[test]
    fn test_starts_at_chaos() {
        let anim = InstancedBodyAnimator::new(layer(vec![1.0, 2.0]), BodyMotion::default());
        assert!(anim.positions().iter().all(|p| *p == Vec3::new(10.0, 0.0, 0.0)));
        assert!(anim.is_dirty());
    }

    #[test]
    fn test_faster_instance_leads() {
        let mut anim = InstancedBodyAnimator::new(layer(vec![1.0, 2.0]), BodyMotion::default());
        for _ in 0..30 {
            anim.tick(TreeState::Formed, 1.0 / 60.0);
        }
        let slow = anim.positions()[0].length();
        let fast = anim.positions()[1].length();
        assert!(fast < slow);
        assert!(slow < 10.0);
    }

    #[test]
    fn test_long_frame_does_not_overshoot() {
        let mut anim = InstancedBodyAnimator::new(layer(vec![2.5]), BodyMotion::default());
        anim.tick(TreeState::Formed, 5.0);
        assert_eq!(anim.positions()[0], Vec3::ZERO);
    }

    #[test]
    fn test_destination_snaps_on_state_flip() {
        let mut anim = InstancedBodyAnimator::new(layer(vec![1.0]), BodyMotion::default());
        for _ in 0..10 {
            anim.tick(TreeState::Formed, 0.05);
        }
        let mid = anim.positions()[0];
        anim.tick(TreeState::Chaos, 0.05);
        assert!(anim.positions()[0].x > mid.x, "did not head back to chaos");
    }

    #[test]
    fn test_dirty_flag_is_batched() {
        let mut anim = InstancedBodyAnimator::new(layer(vec![1.0, 1.5, 2.0]), BodyMotion::default());
        assert_eq!(anim.take_dirty().map(|b| b.len()), Some(3));
        assert!(anim.take_dirty().is_none());

        anim.tick(TreeState::Formed, 0.016);
        assert_eq!(anim.take_dirty().map(|b| b.len()), Some(3));
        assert!(!anim.is_dirty());
    }

    #[test]
    fn test_transform_encodes_position_and_scale() {
        let layer = layer(vec![1.0]).with_sizes(vec![0.3]).unwrap();
        let mut anim = InstancedBodyAnimator::new(layer, BodyMotion::default());
        anim.tick(TreeState::Formed, 0.1);
        let model = Mat4::from_cols_array_2d(&anim.instances()[0].model);
        let (scale, _, translation) = model.to_scale_rotation_translation();
        assert!((translation - anim.positions()[0]).abs().max_element() < 1e-5);
        assert!((scale - Vec3::splat(0.3)).abs().max_element() < 1e-5);
    }

    #[test]
    fn test_spin_is_proportional_to_speed() {
        let mut anim = InstancedBodyAnimator::new(layer(vec![1.0, 2.0]), BodyMotion::default());
        anim.tick(TreeState::Formed, 0.5);
        assert!((anim.angles[0] - 0.25).abs() < 1e-6);
        assert!((anim.angles[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_compute_transform_identity() {
        let m = compute_transform(Vec3::ZERO, 1.0, Quat::IDENTITY);
        assert_eq!(m, Mat4::IDENTITY);
    }
}
