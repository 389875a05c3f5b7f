mod mesh;

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::error::GpuError;
use crate::foliage::{FoliageUniforms, FoliageVertex, FOLIAGE_SHADER};
use crate::ornaments::{InstanceRaw, ORNAMENT_SHADER};
use crate::panels::PANEL_SHADER;
use crate::scene::Scene;
use mesh::MeshVertex;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SPHERE_STACKS: u32 = 16;
const SPHERE_SLICES: u32 = 24;

/// Camera block shared by every program (bind group 0, binding 0).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct SceneUniforms {
    view: [[f32; 4]; 4],
    proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    viewport: [f32; 2],
    _pad: [f32; 2],
    eye: [f32; 4],
}

impl SceneUniforms {
    fn from_scene(scene: &Scene, width: u32, height: u32) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        let camera = scene.camera();
        Self {
            view: camera.view_matrix().to_cols_array_2d(),
            proj: camera.projection_matrix(aspect).to_cols_array_2d(),
            model: scene.group_transform().to_cols_array_2d(),
            viewport: [width as f32, height as f32],
            _pad: [0.0; 2],
            eye: camera.position().extend(1.0).to_array(),
        }
    }
}

const FOLIAGE_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32, 2 => Float32x3];

const INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    3 => Float32x4, 4 => Float32x4, 5 => Float32x4, 6 => Float32x4, 7 => Float32x4
];

fn foliage_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<FoliageVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &FOLIAGE_ATTRIBUTES,
    }
}

fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &INSTANCE_ATTRIBUTES,
    }
}

/// Buffers whose size depends on the generated layers.
struct LayerBuffers {
    generation: u64,
    foliage: wgpu::Buffer,
    foliage_count: u32,
    ornaments: wgpu::Buffer,
    ornament_count: u32,
    panels: wgpu::Buffer,
    panel_count: u32,
}

impl LayerBuffers {
    fn new(device: &wgpu::Device, scene: &Scene) -> Self {
        let foliage_vertices = scene.foliage().vertices();
        let foliage = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Foliage Vertices"),
            contents: bytemuck::cast_slice(&foliage_vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let ornaments = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Ornament Instances"),
            contents: bytemuck::cast_slice(scene.ornaments().instances()),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });
        let panels = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Panel Instances"),
            contents: bytemuck::cast_slice(scene.panels().instances()),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            generation: scene.generation(),
            foliage,
            foliage_count: scene.foliage().count(),
            ornaments,
            ornament_count: scene.ornaments().count(),
            panels,
            panel_count: scene.panels().count(),
        }
    }
}

/// Window surface plus the three layer pipelines.
pub struct GpuState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    foliage_pipeline: wgpu::RenderPipeline,
    ornament_pipeline: wgpu::RenderPipeline,
    panel_pipeline: wgpu::RenderPipeline,
    scene_buffer: wgpu::Buffer,
    foliage_uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    sphere_vertices: wgpu::Buffer,
    sphere_indices: wgpu::Buffer,
    sphere_index_count: u32,
    panel_vertices: wgpu::Buffer,
    panel_vertex_count: u32,
    layers: LayerBuffers,
    depth_texture: wgpu::TextureView,
    clear_color: wgpu::Color,
}

impl GpuState {
    pub async fn new(window: Arc<Window>, scene: &Scene) -> Result<Self, GpuError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;
        tracing::info!(adapter = ?adapter.get_info().name, "GPU adapter selected");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_texture = create_depth_texture(&device, &config);

        // Uniforms
        let scene_uniforms = SceneUniforms::from_scene(scene, config.width, config.height);
        let scene_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Uniforms"),
            contents: bytemuck::bytes_of(&scene_uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let foliage_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Foliage Uniforms"),
            contents: bytemuck::bytes_of(scene.foliage_uniforms()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: scene_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: foliage_uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        // Pipelines
        let foliage_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            PipelineSpec {
                label: "Foliage",
                source: FOLIAGE_SHADER,
                buffers: &[foliage_layout()],
                format: config.format,
                blend: wgpu::BlendState {
                    color: wgpu::BlendComponent {
                        src_factor: wgpu::BlendFactor::SrcAlpha,
                        dst_factor: wgpu::BlendFactor::One,
                        operation: wgpu::BlendOperation::Add,
                    },
                    alpha: wgpu::BlendComponent::OVER,
                },
                depth_write: false,
                cull_mode: None,
            },
        );
        let ornament_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            PipelineSpec {
                label: "Ornament",
                source: ORNAMENT_SHADER,
                buffers: &[MeshVertex::layout(), instance_layout()],
                format: config.format,
                blend: wgpu::BlendState::REPLACE,
                depth_write: true,
                cull_mode: Some(wgpu::Face::Back),
            },
        );
        let panel_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            PipelineSpec {
                label: "Panel",
                source: PANEL_SHADER,
                buffers: &[MeshVertex::layout(), instance_layout()],
                format: config.format,
                blend: wgpu::BlendState::REPLACE,
                depth_write: true,
                cull_mode: None,
            },
        );

        // Static meshes
        let (sphere, sphere_index_data) = mesh::uv_sphere(SPHERE_STACKS, SPHERE_SLICES);
        let sphere_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Vertices"),
            contents: bytemuck::cast_slice(&sphere),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let sphere_indices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Sphere Indices"),
            contents: bytemuck::cast_slice(&sphere_index_data),
            usage: wgpu::BufferUsages::INDEX,
        });
        let quads = mesh::panel_quads();
        let panel_vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Panel Vertices"),
            contents: bytemuck::cast_slice(&quads),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let layers = LayerBuffers::new(&device, scene);

        let bg: Vec3 = scene.config().background;
        let clear_color = wgpu::Color {
            r: bg.x as f64,
            g: bg.y as f64,
            b: bg.z as f64,
            a: 1.0,
        };

        Ok(Self {
            surface,
            device,
            queue,
            config,
            foliage_pipeline,
            ornament_pipeline,
            panel_pipeline,
            scene_buffer,
            foliage_uniform_buffer,
            bind_group,
            sphere_vertices,
            sphere_indices,
            sphere_index_count: sphere_index_data.len() as u32,
            panel_vertices,
            panel_vertex_count: quads.len() as u32,
            layers,
            depth_texture,
            clear_color,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = create_depth_texture(&self.device, &self.config);
        }
    }

    /// Push this frame's uniforms and any changed instance buffers.
    fn upload(&mut self, scene: &mut Scene) {
        if self.layers.generation != scene.generation() {
            self.layers = LayerBuffers::new(&self.device, scene);
            // Fresh buffers already hold the current instances.
            scene.ornaments_mut().take_dirty();
            scene.panels_mut().take_dirty();
        }

        let uniforms = SceneUniforms::from_scene(scene, self.config.width, self.config.height);
        self.queue.write_buffer(&self.scene_buffer, 0, bytemuck::bytes_of(&uniforms));
        self.queue
            .write_buffer(&self.foliage_uniform_buffer, 0, bytemuck::bytes_of(scene.foliage_uniforms()));

        // Whole-buffer uploads only, once per pass.
        if let Some(instances) = scene.ornaments_mut().take_dirty() {
            self.queue
                .write_buffer(&self.layers.ornaments, 0, bytemuck::cast_slice(instances));
        }
        if let Some(instances) = scene.panels_mut().take_dirty() {
            self.queue.write_buffer(&self.layers.panels, 0, bytemuck::cast_slice(instances));
        }
    }

    pub fn render(&mut self, scene: &mut Scene) -> Result<(), wgpu::SurfaceError> {
        self.upload(scene);

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_bind_group(0, &self.bind_group, &[]);

            // Opaque bodies first so the additive points depth-test against them.
            render_pass.set_pipeline(&self.ornament_pipeline);
            render_pass.set_vertex_buffer(0, self.sphere_vertices.slice(..));
            render_pass.set_vertex_buffer(1, self.layers.ornaments.slice(..));
            render_pass.set_index_buffer(self.sphere_indices.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..self.sphere_index_count, 0, 0..self.layers.ornament_count);

            render_pass.set_pipeline(&self.panel_pipeline);
            render_pass.set_vertex_buffer(0, self.panel_vertices.slice(..));
            render_pass.set_vertex_buffer(1, self.layers.panels.slice(..));
            render_pass.draw(0..self.panel_vertex_count, 0..self.layers.panel_count);

            render_pass.set_pipeline(&self.foliage_pipeline);
            render_pass.set_vertex_buffer(0, self.layers.foliage.slice(..));
            render_pass.draw(0..6, 0..self.layers.foliage_count);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

struct PipelineSpec<'a> {
    label: &'a str,
    source: &'a str,
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
    format: wgpu::TextureFormat,
    blend: wgpu::BlendState,
    depth_write: bool,
    cull_mode: Option<wgpu::Face>,
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    spec: PipelineSpec<'_>,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(spec.label),
        source: wgpu::ShaderSource::Wgsl(spec.source.into()),
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(spec.label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            buffers: spec.buffers,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: spec.format,
                blend: Some(spec.blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: spec.cull_mode,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: spec.depth_write,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn create_depth_texture(
    device: &wgpu::Device,
    config: &wgpu::SurfaceConfiguration,
) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}
