//! Static meshes for the instanced layers.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use std::f32::consts::{PI, TAU};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl MeshVertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Unit UV sphere, indexed, counter-clockwise from outside.
pub fn uv_sphere(stacks: u32, slices: u32) -> (Vec<MeshVertex>, Vec<u16>) {
    let stacks = stacks.max(2);
    let slices = slices.max(3);

    let mut vertices = Vec::with_capacity(((stacks + 1) * (slices + 1)) as usize);
    for i in 0..=stacks {
        let v = i as f32 / stacks as f32;
        let phi = v * PI;
        for j in 0..=slices {
            let u = j as f32 / slices as f32;
            let theta = u * TAU;
            let n = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
            vertices.push(MeshVertex {
                position: n.to_array(),
                normal: n.to_array(),
                uv: [u, v],
            });
        }
    }

    let row = slices + 1;
    let mut indices = Vec::with_capacity((stacks * slices * 6) as usize);
    for i in 0..stacks {
        for j in 0..slices {
            let a = (i * row + j) as u16;
            let b = ((i + 1) * row + j) as u16;
            let c = a + 1;
            let d = b + 1;
            indices.extend_from_slice(&[a, c, b, c, d, b]);
        }
    }

    (vertices, indices)
}

/// A paper backing quad (six vertices) followed by an inset photo quad,
/// facing +Z. The panel program tells the two apart by vertex index.
pub fn panel_quads() -> Vec<MeshVertex> {
    let quad = |min: [f32; 2], max: [f32; 2], z: f32| {
        let corner = |x: f32, y: f32, u: f32, v: f32| MeshVertex {
            position: [x, y, z],
            normal: [0.0, 0.0, 1.0],
            uv: [u, v],
        };
        [
            corner(min[0], min[1], 0.0, 1.0),
            corner(max[0], min[1], 1.0, 1.0),
            corner(min[0], max[1], 0.0, 0.0),
            corner(min[0], max[1], 0.0, 0.0),
            corner(max[0], min[1], 1.0, 1.0),
            corner(max[0], max[1], 1.0, 0.0),
        ]
    };

    let mut vertices = Vec::with_capacity(12);
    vertices.extend_from_slice(&quad([-0.5, -0.6], [0.5, 0.6], 0.0));
    vertices.extend_from_slice(&quad([-0.4, -0.3], [0.4, 0.5], 0.01));
    vertices
}
