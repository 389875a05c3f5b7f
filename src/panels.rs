//! Floating photo panels.
//!
//! A small group of flat billboards that glide between a box-shaped scatter
//! and the cone surface at one shared rate. Rotation is fixed at creation:
//! each panel faces outward from the trunk with a small random tilt.

use glam::{EulerRot, Quat, Vec3};
use rand::Rng;
use std::f32::consts::FRAC_PI_2;

use crate::layer::ParticleLayer;
use crate::ornaments::{compute_transform, InstanceRaw};
use crate::transition::TreeState;

/// Tuning for [`PanelGroupAnimator`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PanelMotion {
    /// Per-tick lerp factor is `follow_rate * dt`.
    pub follow_rate: f32,
    /// Peak vertical float offset.
    pub float_amplitude: f32,
    /// Uniform panel scale.
    pub scale: f32,
    /// Maximum absolute tilt about the panel normal, radians.
    pub tilt_jitter: f32,
}

impl Default for PanelMotion {
    fn default() -> Self {
        Self {
            follow_rate: 1.5,
            float_amplitude: 0.12,
            scale: 1.5,
            tilt_jitter: 0.25,
        }
    }
}

/// Host-side animator for the panel group.
pub struct PanelGroupAnimator {
    layer: ParticleLayer,
    motion: PanelMotion,
    rotations: Vec<Quat>,
    current: Vec<Vec3>,
    instances: Vec<InstanceRaw>,
    dirty: bool,
}

impl PanelGroupAnimator {
    /// Panels start at their chaos positions.
    pub fn new<R: Rng + ?Sized>(layer: ParticleLayer, motion: PanelMotion, rng: &mut R) -> Self {
        let rotations: Vec<Quat> = layer
            .target_positions()
            .iter()
            .map(|t| {
                let theta = t.z.atan2(t.x);
                let tilt = (rng.gen::<f32>() * 2.0 - 1.0) * motion.tilt_jitter;
                Quat::from_euler(EulerRot::XYZ, 0.0, -theta + FRAC_PI_2, tilt)
            })
            .collect();
        let current = layer.chaos_positions().to_vec();
        let instances = current
            .iter()
            .zip(&rotations)
            .enumerate()
            .map(|(i, (&p, &r))| InstanceRaw::new(compute_transform(p, motion.scale, r), layer.color_or(i, Vec3::ONE)))
            .collect();

        Self {
            layer,
            motion,
            rotations,
            current,
            instances,
            dirty: true,
        }
    }

    pub fn count(&self) -> u32 {
        self.layer.count() as u32
    }

    /// Lerped positions, without the float offset.
    pub fn positions(&self) -> &[Vec3] {
        &self.current
    }

    /// Fixed per-panel orientation.
    pub fn rotations(&self) -> &[Quat] {
        &self.rotations
    }

    pub fn instances(&self) -> &[InstanceRaw] {
        &self.instances
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

    /// Float offset for panel `i` at `elapsed` seconds.
    #[inline]
    pub fn float_offset(&self, i: usize, elapsed: f32) -> f32 {
        (elapsed + i as f32).sin() * self.motion.float_amplitude
    }

    pub fn tick(&mut self, state: TreeState, delta_time: f32, elapsed: f32) {
        let formed = state.is_formed();
        let factor = (self.motion.follow_rate * delta_time.max(0.0)).clamp(0.0, 1.0);

        for i in 0..self.layer.count() {
            let destination = self.layer.destination(i, formed);
            self.current[i] = self.current[i].lerp(destination, factor);

            let shown = self.current[i] + Vec3::Y * self.float_offset(i, elapsed);
            self.instances[i] = InstanceRaw::new(
                compute_transform(shown, self.motion.scale, self.rotations[i]),
                self.layer.color_or(i, Vec3::ONE),
            );
        }

        self.dirty = true;
    }
}

/// Panel program: paper backing (first six vertices) plus a tinted photo.
///
/// Same vertex and instance layout as the ornament program.
pub const PANEL_SHADER: &str = r#"
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
    @location(0) normal: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) color: vec3<f32>,
    @location(3) photo: f32,
};

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    v: VertexInput,
    inst: InstanceInput,
) -> VertexOutput {
    let model = camera.model * mat4x4<f32>(inst.model_0, inst.model_1, inst.model_2, inst.model_3);

    var out: VertexOutput;
    out.clip_position = camera.proj * camera.view * model * vec4<f32>(v.position, 1.0);
    out.normal = (model * vec4<f32>(v.normal, 0.0)).xyz;
    out.uv = v.uv;
    out.color = inst.color.rgb;
    out.photo = select(0.0, 1.0, vertex_index >= 6u);
    return out;
}

@fragment
fn fs_main(in: VertexOutput, @builtin(front_facing) front: bool) -> @location(0) vec4<f32> {
    let paper = vec3<f32>(1.0, 0.965, 0.831);
    var n = normalize(in.normal);
    if !front {
        n = -n;
    }
    let light = 0.55 + 0.45 * max(dot(n, normalize(vec3<f32>(0.3, 0.8, 0.6))), 0.0);

    // Photo: tint with a soft vertical fade and darkened edges.
    let edge = min(min(in.uv.x, 1.0 - in.uv.x), min(in.uv.y, 1.0 - in.uv.y));
    let vignette = smoothstep(0.0, 0.15, edge);
    let photo = in.color * mix(0.55, 1.0, 1.0 - in.uv.y) * mix(0.6, 1.0, vignette);

    let rgb = mix(paper, photo, in.photo) * light;
    return vec4<f32>(rgb, 1.0);
}
"#;
