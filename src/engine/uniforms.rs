//! GPU parameter blocks.
//!
//! Layouts must match the structs in `src/shaders/` exactly; sizes are
//! const-asserted. Per-draw blocks (`LayoutUniform`, `MigrationUniform`) are
//! written at [`PARAM_STRIDE`] intervals into one buffer and selected with a
//! dynamic bind-group offset per draw.

use bytemuck::{Pod, Zeroable};
use cgmath::Matrix4;
use static_assertions::const_assert_eq;

/// Stride between per-draw parameter blocks in the shared uniform buffer.
/// Matches wgpu's default `min_uniform_buffer_offset_alignment`.
pub const PARAM_STRIDE: u64 = 256;

/// Per-entity cell location for the render and projection passes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct LayoutUniform {
    /// First global triangle index of the entity.
    pub offset: u32,
    /// Grid side the offset was computed against.
    pub side: u32,
    pub _pad: [u32; 2],
}

impl LayoutUniform {
    pub fn new(offset: u32, side: u32) -> Self {
        Self {
            offset,
            side,
            _pad: [0; 2],
        }
    }
}

/// Per-entity old/new cell locations for the atlas migration pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MigrationUniform {
    pub old_offset: u32,
    pub new_offset: u32,
    pub old_side: u32,
    pub new_side: u32,
}

/// Per-mesh vertex and normal transforms into the reference frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TransformUniform {
    pub vertex: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
}

impl TransformUniform {
    pub fn new(vertex: Matrix4<f32>, normal: Matrix4<f32>) -> Self {
        Self {
            vertex: vertex.into(),
            normal: normal.into(),
        }
    }
}

/// Camera view-projection for the depth pre-pass and projection pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_projection: [[f32; 4]; 4],
}

/// Stereo eye pair for the atlas render pass; the instance index selects.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct EyeUniform {
    pub view_projection: [[[f32; 4]; 4]; 2],
}

impl EyeUniform {
    pub fn new(eyes: [Matrix4<f32>; 2]) -> Self {
        Self {
            view_projection: [eyes[0].into(), eyes[1].into()],
        }
    }
}

const_assert_eq!(std::mem::size_of::<LayoutUniform>(), 16);
const_assert_eq!(std::mem::size_of::<MigrationUniform>(), 16);
const_assert_eq!(std::mem::size_of::<TransformUniform>(), 128);
const_assert_eq!(std::mem::size_of::<CameraUniform>(), 64);
const_assert_eq!(std::mem::size_of::<EyeUniform>(), 128);

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    #[test]
    fn layout_uniform_packs_fields_in_order() {
        let uniform = LayoutUniform::new(7, 3);
        let bytes = bytemuck::bytes_of(&uniform);
        assert_eq!(&bytes[..4], &7u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &3u32.to_le_bytes());
    }

    #[test]
    fn transform_uniform_is_column_major() {
        let translation = Matrix4::from_translation([1.0, 2.0, 3.0].into());
        let uniform = TransformUniform::new(translation, Matrix4::identity());
        // Translation lives in the fourth column.
        assert_eq!(uniform.vertex[3][0], 1.0);
        assert_eq!(uniform.vertex[3][1], 2.0);
        assert_eq!(uniform.vertex[3][2], 3.0);
    }
}
