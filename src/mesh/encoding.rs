//! Scan-source mesh decoding.
//!
//! The environment scanner delivers compact native encodings: 16-bit signed
//! normalized positions with a padding lane, 8-bit signed normalized normals
//! with a padding lane, and 16-bit unsigned triangle indices. Everything
//! downstream works on the decoded f32 form.

use cgmath::{Matrix4, Vector3};

/// Stable identifier of one scanned surface region.
///
/// Stable across geometry updates for the same region; not reused once the
/// region disappears from a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId(pub u64);

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One region's mesh data exactly as the scan source hands it over.
#[derive(Debug, Clone)]
pub struct RawSurface {
    /// R16G16B16A16Snorm vertex positions, 8 bytes per vertex.
    pub positions: Vec<u8>,
    /// R8G8B8A8Snorm vertex normals, 4 bytes per vertex.
    pub normals: Vec<u8>,
    /// R16Uint triangle indices, little endian.
    pub indices: Vec<u8>,
    /// Per-axis scale applied to decoded positions.
    pub position_scale: Vector3<f32>,
    /// Mesh-local space to reference frame.
    pub mesh_to_reference: Matrix4<f32>,
}

/// Decoded triangle mesh for one region.
#[derive(Debug, Clone, Default)]
pub struct SurfaceGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u16>,
}

impl SurfaceGeometry {
    /// Number of whole triangles. A mesh with fewer than 3 indices is empty.
    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Empty meshes are kept in the set but never drawn.
    pub fn is_empty(&self) -> bool {
        self.indices.len() < 3
    }
}

/// Decode a raw surface into f32 geometry.
///
/// Trailing partial elements in any buffer are ignored, and trailing indices
/// that do not complete a triangle are dropped.
pub fn decode_surface(raw: &RawSurface) -> SurfaceGeometry {
    let positions = raw
        .positions
        .chunks_exact(8)
        .map(|v| {
            [
                snorm16(v[0], v[1]),
                snorm16(v[2], v[3]),
                snorm16(v[4], v[5]),
            ]
        })
        .collect();
    let normals = raw
        .normals
        .chunks_exact(4)
        .map(|v| [snorm8(v[0]), snorm8(v[1]), snorm8(v[2])])
        .collect();
    let mut indices: Vec<u16> = raw
        .indices
        .chunks_exact(2)
        .map(|v| u16::from_le_bytes([v[0], v[1]]))
        .collect();
    indices.truncate(indices.len() / 3 * 3);

    SurfaceGeometry {
        positions,
        normals,
        indices,
    }
}

/// Decode one signed-normalized 16-bit lane. `-32768` and `-32767` both map
/// to -1.0, matching the clamp the scan source's consumers apply.
fn snorm16(lo: u8, hi: u8) -> f32 {
    (i16::from_le_bytes([lo, hi]) as f32 / i16::MAX as f32).max(-1.0)
}

fn snorm8(v: u8) -> f32 {
    (v as i8 as f32 / i8::MAX as f32).max(-1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::SquareMatrix;

    fn raw_with(positions: Vec<u8>, normals: Vec<u8>, indices: Vec<u8>) -> RawSurface {
        RawSurface {
            positions,
            normals,
            indices,
            position_scale: Vector3::new(1.0, 1.0, 1.0),
            mesh_to_reference: Matrix4::identity(),
        }
    }

    fn snorm16_bytes(v: i16) -> [u8; 2] {
        v.to_le_bytes()
    }

    #[test]
    fn decodes_positions_with_padding_lane() {
        let mut bytes = Vec::new();
        for lane in [i16::MAX, 0, i16::MIN, 1234] {
            bytes.extend_from_slice(&snorm16_bytes(lane));
        }
        let geometry = decode_surface(&raw_with(bytes, Vec::new(), Vec::new()));
        assert_eq!(geometry.positions.len(), 1);
        let [x, y, z] = geometry.positions[0];
        assert_eq!(x, 1.0);
        assert_eq!(y, 0.0);
        assert_eq!(z, -1.0); // clamped, not -32768/32767
    }

    #[test]
    fn decodes_normals_with_padding_lane() {
        let bytes = vec![127u8, 0, 0x80, 42];
        let geometry = decode_surface(&raw_with(Vec::new(), bytes, Vec::new()));
        assert_eq!(geometry.normals.len(), 1);
        let [x, y, z] = geometry.normals[0];
        assert_eq!(x, 1.0);
        assert_eq!(y, 0.0);
        assert_eq!(z, -1.0);
    }

    #[test]
    fn decodes_little_endian_indices() {
        let bytes = vec![0u8, 0, 1, 0, 0x34, 0x12];
        let geometry = decode_surface(&raw_with(Vec::new(), Vec::new(), bytes));
        assert_eq!(geometry.indices, vec![0, 1, 0x1234]);
        assert_eq!(geometry.triangle_count(), 1);
    }

    #[test]
    fn short_index_buffer_is_empty() {
        let geometry = decode_surface(&raw_with(Vec::new(), Vec::new(), vec![0, 0, 1, 0]));
        assert!(geometry.is_empty());
        assert_eq!(geometry.triangle_count(), 0);
        assert!(geometry.indices.is_empty());
    }

    #[test]
    fn partial_trailing_triangle_is_dropped() {
        let bytes: Vec<u8> = (0u16..4).flat_map(|i| i.to_le_bytes()).collect();
        let geometry = decode_surface(&raw_with(Vec::new(), Vec::new(), bytes));
        assert_eq!(geometry.indices, vec![0, 1, 2]);
        assert_eq!(geometry.triangle_count(), 1);
    }
}
