//! One scanned region's mesh and its GPU residency.
//!
//! Geometry is replaced wholesale whenever the scan reports the region
//! again; the GPU side is rebuilt lazily by the engine on the render thread.
//! A mesh that has not finished uploading is simply not ready and every pass
//! skips it the same way.

use cgmath::{Matrix4, SquareMatrix, Vector3};
use wgpu::util::DeviceExt;

use crate::engine::uniforms::TransformUniform;
use crate::mesh::encoding::{decode_surface, RawSurface, SurfaceGeometry};

/// GPU residency for one region: vertex-pull storage buffers plus the
/// transform uniform, bound as one bind group.
pub struct MeshBuffers {
    pub positions: wgpu::Buffer,
    pub normals: wgpu::Buffer,
    pub indices: wgpu::Buffer,
    pub transform: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub index_count: u32,
}

pub struct SurfaceMesh {
    geometry: SurfaceGeometry,
    position_scale: Vector3<f32>,
    mesh_to_reference: Matrix4<f32>,
    gpu: Option<MeshBuffers>,
    ready: bool,
    dirty: bool,
}

impl SurfaceMesh {
    pub fn from_scan(raw: &RawSurface) -> Self {
        Self {
            geometry: decode_surface(raw),
            position_scale: raw.position_scale,
            mesh_to_reference: raw.mesh_to_reference,
            gpu: None,
            ready: false,
            dirty: true,
        }
    }

    /// Replace the region's geometry with a newer scan of it. The mesh drops
    /// out of every pass until the engine re-uploads it.
    pub fn replace_geometry(&mut self, raw: &RawSurface) {
        self.geometry = decode_surface(raw);
        self.position_scale = raw.position_scale;
        self.mesh_to_reference = raw.mesh_to_reference;
        self.gpu = None;
        self.ready = false;
        self.dirty = true;
    }

    pub fn triangle_count(&self) -> u32 {
        self.geometry.triangle_count()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn geometry(&self) -> &SurfaceGeometry {
        &self.geometry
    }

    /// Mesh-local to reference-frame transforms for vertices and normals,
    /// with an additional reference-frame adjustment applied on top.
    pub fn transforms(&self, adjust: &Matrix4<f32>) -> (Matrix4<f32>, Matrix4<f32>) {
        let scale = Matrix4::from_nonuniform_scale(
            self.position_scale.x,
            self.position_scale.y,
            self.position_scale.z,
        );
        let vertex = adjust * self.mesh_to_reference * scale;
        let mut normal = adjust * self.mesh_to_reference;
        normal.w.x = 0.0;
        normal.w.y = 0.0;
        normal.w.z = 0.0;
        (vertex, normal)
    }

    /// Create GPU buffers for the current geometry and mark the mesh ready.
    /// Degenerate geometry clears residency instead; the mesh stays in the
    /// set but is never drawn.
    pub fn upload(&mut self, device: &wgpu::Device, mesh_layout: &wgpu::BindGroupLayout) {
        self.dirty = false;
        if self.geometry.is_empty() || self.geometry.positions.is_empty() {
            self.gpu = None;
            self.ready = false;
            return;
        }

        let positions: Vec<[f32; 4]> = self
            .geometry
            .positions
            .iter()
            .map(|p| [p[0], p[1], p[2], 1.0])
            .collect();
        let normals: Vec<[f32; 4]> = self
            .geometry
            .normals
            .iter()
            .map(|n| [n[0], n[1], n[2], 0.0])
            .collect();
        let indices: Vec<u32> = self.geometry.indices.iter().map(|&i| i as u32).collect();

        let positions = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Surface Mesh Positions"),
            contents: bytemuck::cast_slice(&positions),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let normals = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Surface Mesh Normals"),
            contents: bytemuck::cast_slice(&normals),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Surface Mesh Indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::STORAGE,
        });

        let (vertex, normal) = self.transforms(&Matrix4::identity());
        let transform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Surface Mesh Transform"),
            contents: bytemuck::bytes_of(&TransformUniform::new(vertex, normal)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Surface Mesh Bind Group"),
            layout: mesh_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: positions.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: normals.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: index_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: transform.as_entire_binding(),
                },
            ],
        });

        self.gpu = Some(MeshBuffers {
            positions,
            normals,
            indices: index_buffer,
            transform,
            bind_group,
            index_count: self.geometry.index_count(),
        });
        self.ready = true;
    }

    /// Rewrite the transform uniform against a new reference-frame
    /// adjustment. No-op until the mesh is ready.
    pub fn update_transform(&self, queue: &wgpu::Queue, adjust: &Matrix4<f32>) {
        if !self.ready {
            return;
        }
        if let Some(gpu) = &self.gpu {
            let (vertex, normal) = self.transforms(adjust);
            queue.write_buffer(
                &gpu.transform,
                0,
                bytemuck::bytes_of(&TransformUniform::new(vertex, normal)),
            );
        }
    }

    /// GPU buffers for drawing, only while the mesh is ready.
    pub fn buffers(&self) -> Option<&MeshBuffers> {
        if self.ready {
            self.gpu.as_ref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector4;

    fn raw(triangles: u32) -> RawSurface {
        let indices: Vec<u8> = (0..triangles * 3)
            .flat_map(|i| (i as u16).to_le_bytes())
            .collect();
        RawSurface {
            positions: vec![0; (triangles as usize * 3) * 8],
            normals: vec![0; (triangles as usize * 3) * 4],
            indices,
            position_scale: Vector3::new(2.0, 2.0, 2.0),
            mesh_to_reference: Matrix4::from_translation(Vector3::new(0.0, 1.0, 0.0)),
        }
    }

    #[test]
    fn starts_dirty_and_not_ready() {
        let mesh = SurfaceMesh::from_scan(&raw(4));
        assert!(mesh.is_dirty());
        assert!(!mesh.is_ready());
        assert_eq!(mesh.triangle_count(), 4);
    }

    #[test]
    fn replace_geometry_resets_readiness() {
        let mut mesh = SurfaceMesh::from_scan(&raw(4));
        mesh.replace_geometry(&raw(10));
        assert_eq!(mesh.triangle_count(), 10);
        assert!(mesh.is_dirty());
        assert!(!mesh.is_ready());
    }

    #[test]
    fn mesh_without_gpu_residency_exposes_no_buffers() {
        let mesh = SurfaceMesh::from_scan(&raw(4));
        assert!(mesh.buffers().is_none());
    }

    #[test]
    fn vertex_transform_applies_scale_then_placement() {
        let mesh = SurfaceMesh::from_scan(&raw(1));
        let (vertex, normal) = mesh.transforms(&Matrix4::identity());
        let p = vertex * Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert_eq!(p, Vector4::new(2.0, 1.0, 0.0, 1.0));
        // Normal transform carries no translation.
        let n = normal * Vector4::new(0.0, 1.0, 0.0, 0.0);
        assert_eq!(n, Vector4::new(0.0, 1.0, 0.0, 0.0));
    }
}
