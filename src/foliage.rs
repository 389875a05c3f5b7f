//! Point-cloud foliage layer.
//!
//! The host never moves foliage points. It uploads the static chaos/target
//! pairs once and pushes two scalars per frame (`progress`, `time`); the
//! vertex program does all interpolation. [`shade_point`] is the CPU
//! reference of that program and must stay in lockstep with
//! [`FOLIAGE_SHADER`].

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::layer::ParticleLayer;
use crate::spawn::Cone;
use crate::transition::{ease_in_out_cubic, LayerId, TransitionScheduler};

/// Colour of scattered points.
pub const CHAOS_COLOR: Vec3 = Vec3::new(1.0, 0.8, 0.4);
/// Bottom of the formed-state height gradient.
pub const GRADIENT_LOW: Vec3 = Vec3::new(0.0, 0.2, 0.05);
/// Top of the formed-state height gradient.
pub const GRADIENT_HIGH: Vec3 = Vec3::new(0.0, 0.8, 0.3);

/// Per-point static vertex data.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct FoliageVertex {
    pub chaos: [f32; 3],
    pub size: f32,
    pub target: [f32; 3],
    pub _pad: f32,
}

/// Per-frame scalars consumed by the foliage vertex program.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct FoliageUniforms {
    /// Raw scheduler progress; eased on the GPU.
    pub progress: f32,
    /// Elapsed session time in seconds.
    pub time: f32,
    /// Lifted y where the height gradient starts.
    pub gradient_base: f32,
    /// Height over which the gradient runs.
    pub gradient_span: f32,
    /// Size attenuation numerator (`size * scale / depth` pixels).
    pub point_scale: f32,
    /// Wind/sparkle amplitude in chaos.
    pub wind: f32,
    pub _pad: [f32; 2],
}

impl FoliageUniforms {
    pub fn new(cone: &Cone, point_scale: f32, wind: f32) -> Self {
        Self {
            progress: 0.0,
            time: 0.0,
            gradient_base: cone.base_y(),
            gradient_span: cone.height + 1.0,
            point_scale,
            wind,
            _pad: [0.0; 2],
        }
    }
}

/// Result of the per-point program before camera projection.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShadedPoint {
    pub position: Vec3,
    pub color: Vec3,
    pub alpha: f32,
}

/// CPU reference of the foliage vertex program.
pub fn shade_point(chaos: Vec3, target: Vec3, u: &FoliageUniforms) -> ShadedPoint {
    let e = ease_in_out_cubic(u.progress);
    let mut pos = chaos.lerp(target, e);

    let sway = u.wind * (1.0 - e);
    pos.x += (u.time * 2.0 + pos.y).sin() * sway;
    pos.y += (u.time * 1.5 + pos.x).cos() * sway;

    let height = ((pos.y - u.gradient_base) / u.gradient_span).clamp(0.0, 1.0);
    let gradient = GRADIENT_LOW.lerp(GRADIENT_HIGH, height);

    ShadedPoint {
        position: pos,
        color: CHAOS_COLOR.lerp(gradient, e),
        alpha: 0.8 + 0.2 * (u.time * 5.0 + pos.x).sin(),
    }
}

/// Drives the foliage layer by pushing uniforms each frame.
pub struct ParticleFieldAnimator {
    layer: ParticleLayer,
    layer_id: LayerId,
    default_size: f32,
    uniforms: FoliageUniforms,
}

impl ParticleFieldAnimator {
    pub fn new(layer: ParticleLayer, layer_id: LayerId, uniforms: FoliageUniforms) -> Self {
        Self {
            layer,
            layer_id,
            default_size: 0.75,
            uniforms,
        }
    }

    pub fn layer(&self) -> &ParticleLayer {
        &self.layer
    }

    pub fn layer_id(&self) -> LayerId {
        self.layer_id
    }

    /// Number of points.
    pub fn count(&self) -> u32 {
        self.layer.count() as u32
    }

    /// Static vertex data for upload; built once per layer.
    pub fn vertices(&self) -> Vec<FoliageVertex> {
        let chaos = self.layer.chaos_positions();
        let target = self.layer.target_positions();
        (0..self.layer.count())
            .map(|i| FoliageVertex {
                chaos: chaos[i].to_array(),
                size: self.layer.size_or(i, self.default_size),
                target: target[i].to_array(),
                _pad: 0.0,
            })
            .collect()
    }

    /// Push this frame's progress and time.
    pub fn tick(&mut self, scheduler: &TransitionScheduler, elapsed: f32) -> &FoliageUniforms {
        self.uniforms.progress = scheduler.progress(self.layer_id);
        self.uniforms.time = elapsed;
        &self.uniforms
    }

    pub fn uniforms(&self) -> &FoliageUniforms {
        &self.uniforms
    }
}

/// Foliage point program.
///
/// Bind group 0: `camera` (binding 0), `foliage` (binding 1). One instance
/// per point, six vertices per instance.
pub const FOLIAGE_SHADER: &str = r#"
struct Camera {
    view: mat4x4<f32>,
    proj: mat4x4<f32>,
    model: mat4x4<f32>,
    viewport: vec2<f32>,
    _pad: vec2<f32>,
    eye: vec4<f32>,
};

struct Foliage {
    progress: f32,
    time: f32,
    gradient_base: f32,
    gradient_span: f32,
    point_scale: f32,
    wind: f32,
    _pad0: f32,
    _pad1: f32,
};

@group(0) @binding(0)
var<uniform> camera: Camera;

@group(0) @binding(1)
var<uniform> foliage: Foliage;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
    @location(1) alpha: f32,
    @location(2) uv: vec2<f32>,
};

fn ease(t: f32) -> f32 {
    if t < 0.5 {
        return 4.0 * t * t * t;
    }
    let u = -2.0 * t + 2.0;
    return 1.0 - u * u * u / 2.0;
}

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @location(0) chaos_pos: vec3<f32>,
    @location(1) size: f32,
    @location(2) target_pos: vec3<f32>,
) -> VertexOutput {
    var quad_vertices = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>( 1.0, -1.0),
        vec2<f32>(-1.0,  1.0),
        vec2<f32>(-1.0,  1.0),
        vec2<f32>( 1.0, -1.0),
        vec2<f32>( 1.0,  1.0),
    );
    let quad = quad_vertices[vertex_index];

    let e = ease(clamp(foliage.progress, 0.0, 1.0));
    var pos = mix(chaos_pos, target_pos, e);

    let sway = foliage.wind * (1.0 - e);
    pos.x += sin(foliage.time * 2.0 + pos.y) * sway;
    pos.y += cos(foliage.time * 1.5 + pos.x) * sway;

    let view_pos = camera.view * camera.model * vec4<f32>(pos, 1.0);
    var clip = camera.proj * view_pos;

    // Perspective size attenuation, in pixels.
    let depth = max(-view_pos.z, 0.001);
    let size_px = size * (foliage.point_scale / depth);
    clip.x += quad.x * size_px / camera.viewport.x * clip.w;
    clip.y += quad.y * size_px / camera.viewport.y * clip.w;

    let chaos_color = vec3<f32>(1.0, 0.8, 0.4);
    let height = clamp((pos.y - foliage.gradient_base) / foliage.gradient_span, 0.0, 1.0);
    let gradient = mix(vec3<f32>(0.0, 0.2, 0.05), vec3<f32>(0.0, 0.8, 0.3), height);

    var out: VertexOutput;
    out.clip_position = clip;
    out.color = mix(chaos_color, gradient, e);
    out.alpha = 0.8 + 0.2 * sin(foliage.time * 5.0 + pos.x);
    out.uv = quad;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let dist = length(in.uv);
    if dist > 1.0 {
        discard;
    }
    // Soft glow edge
    let glow = pow(1.0 - dist, 1.5);
    return vec4<f32>(in.color, in.alpha * glow);
}
"#;
