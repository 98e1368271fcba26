// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! GPU-side mirror of scene geometry parts. Shared with the viewer's base
//! pass so both halves draw from the same buffers.

use chamber_scene::{GeomPart, PartKind, PointShader};
use wgpu::util::DeviceExt;

/// Vertex layout for meshes and line segments.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
}

/// Per-instance layout for point clouds (expanded to camera-facing quads in
/// the vertex shader).
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointInstance {
    pub center: [f32; 3],
    pub _pad: f32,
}

/// Pipeline category a geometry draws with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawCategory {
    Mesh,
    Lines,
    Points,
}

/// Uploaded geometry for one part.
pub struct GpuGeom {
    pub category: DrawCategory,
    pub vbuf: wgpu::Buffer,
    /// Vertex count for mesh/lines, instance count for points.
    pub count: u32,
    pub ibuf: Option<wgpu::Buffer>,
    pub icount: u32,
    pub point_size: f32,
    pub shader: PointShader,
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
}

/// Upload one geometry part. Point parts become instance buffers; the rest
/// become vertex (and optional index) buffers.
pub fn upload_part(device: &wgpu::Device, part: &GeomPart) -> GpuGeom {
    let model = part.model.to_cols_array_2d();
    match part.kind {
        PartKind::Points => {
            let instances: Vec<PointInstance> = part
                .positions
                .iter()
                .map(|&p| PointInstance {
                    center: p,
                    _pad: 0.0,
                })
                .collect();
            let vbuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("points_instances"),
                contents: bytemuck::cast_slice(&instances),
                usage: wgpu::BufferUsages::VERTEX,
            });
            GpuGeom {
                category: DrawCategory::Points,
                vbuf,
                count: instances.len() as u32,
                ibuf: None,
                icount: 0,
                point_size: part.point_size,
                shader: part.shader,
                model,
                color: part.color,
            }
        }
        PartKind::Mesh | PartKind::LineSegments => {
            let verts: Vec<MeshVertex> = part
                .positions
                .iter()
                .enumerate()
                .map(|(i, &p)| MeshVertex {
                    pos: p,
                    normal: part
                        .normals
                        .as_ref()
                        .and_then(|n| n.get(i))
                        .copied()
                        .unwrap_or([0.0, 0.0, 0.0]),
                })
                .collect();
            let vbuf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("part_vertices"),
                contents: bytemuck::cast_slice(&verts),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let (ibuf, icount) = match &part.indices {
                Some(idx) if part.kind == PartKind::Mesh => (
                    Some(
                        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some("part_indices"),
                            contents: bytemuck::cast_slice(idx.as_slice()),
                            usage: wgpu::BufferUsages::INDEX,
                        }),
                    ),
                    idx.len() as u32,
                ),
                _ => (None, 0),
            };
            GpuGeom {
                category: if part.kind == PartKind::Mesh {
                    DrawCategory::Mesh
                } else {
                    DrawCategory::Lines
                },
                vbuf,
                count: verts.len() as u32,
                ibuf,
                icount,
                point_size: part.point_size,
                shader: part.shader,
                model,
                color: part.color,
            }
        }
    }
}
