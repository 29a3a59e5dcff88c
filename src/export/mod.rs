//! Textured model export.
//!
//! Serializes the current mesh set to a Wavefront OBJ with deduplicated
//! attributes, a companion MTL referencing the atlas image, and the atlas
//! color surface itself as a PNG. UVs reuse the live atlas layout with the
//! V axis flipped, so the exported model samples the baked texture exactly
//! where the renderer did.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use cgmath::{Vector2, Vector3, Vector4};
use image::RgbaImage;

use crate::atlas::layout::{cell_uv, grid_side};
use crate::error::{RetexError, RetexResult};
use crate::mesh::MeshSet;

struct FaceVertex {
    position: usize,
    uv: usize,
    normal: usize,
}

struct Face {
    vertices: [FaceVertex; 3],
}

/// Run a full export: timestamped session directory with `Mesh.obj`,
/// `Material.mtl` and `Texture.png`. Returns the session directory.
pub fn export_model(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    meshes: &MeshSet,
    atlas_color: &wgpu::Texture,
    resolution: u32,
    root: &Path,
) -> RetexResult<PathBuf> {
    let dir = session_dir(root)?;

    let obj = build_obj(meshes, "Material.mtl", "default");
    let obj_path = dir.join("Mesh.obj");
    fs::write(&obj_path, obj).map_err(|e| RetexError::export_io(obj_path.clone(), e))?;

    let mtl_path = dir.join("Material.mtl");
    fs::write(&mtl_path, material_file("Texture.png"))
        .map_err(|e| RetexError::export_io(mtl_path.clone(), e))?;

    let image = read_atlas_color(device, queue, atlas_color, resolution)?;
    image.save(dir.join("Texture.png"))?;

    log::info!("[export::export_model] wrote model to {:?}", dir);
    Ok(dir)
}

/// Timestamped subdirectory for one export session.
pub fn session_dir(root: &Path) -> RetexResult<PathBuf> {
    let stamp = chrono::Local::now().format("%Y-%m-%d %H-%M-%S").to_string();
    let dir = root.join(stamp);
    fs::create_dir_all(&dir).map_err(|e| RetexError::export_io(dir.clone(), e))?;
    Ok(dir)
}

/// Serialize every region to one OBJ string. Attributes are deduplicated
/// across regions; faces index position/uv/normal separately, 1-based.
pub fn build_obj(meshes: &MeshSet, material_file: &str, material_name: &str) -> String {
    let mut positions: Vec<Vector3<f32>> = Vec::new();
    let mut normals: Vec<Vector3<f32>> = Vec::new();
    let mut uvs: Vec<Vector2<f32>> = Vec::new();
    let mut faces: Vec<Face> = Vec::new();

    let mut position_lookup: HashMap<[i64; 3], usize> = HashMap::new();
    let mut normal_lookup: HashMap<[i64; 3], usize> = HashMap::new();
    let mut uv_lookup: HashMap<[i64; 2], usize> = HashMap::new();

    let side = grid_side(meshes.snapshot().total_triangles);
    let mut offset = 0u32;
    meshes.for_each_geometry(|_, geometry, vertex_transform, normal_transform| {
        for primitive in 0..geometry.triangle_count() {
            let corners = [0u32, 1, 2].map(|corner| {
                geometry.indices[(primitive * 3 + corner) as usize] as usize
            });
            if corners.iter().any(|&i| i >= geometry.positions.len()) {
                continue;
            }
            let mut vertices = Vec::with_capacity(3);
            for (corner, &index) in corners.iter().enumerate() {
                let p = geometry.positions[index];
                let p = (vertex_transform * Vector4::new(p[0], p[1], p[2], 1.0)).truncate();
                let n = geometry
                    .normals
                    .get(index)
                    .copied()
                    .unwrap_or([0.0, 0.0, 0.0]);
                let n = (normal_transform * Vector4::new(n[0], n[1], n[2], 0.0)).truncate();
                let mut uv = cell_uv(offset + primitive, corner as u32, side);
                uv.y = 1.0 - uv.y;

                vertices.push(FaceVertex {
                    position: lookup_or_add3(&mut position_lookup, &mut positions, p),
                    normal: lookup_or_add3(&mut normal_lookup, &mut normals, n),
                    uv: lookup_or_add2(&mut uv_lookup, &mut uvs, uv),
                });
            }
            if let Ok(vertices) = <[FaceVertex; 3]>::try_from(vertices) {
                faces.push(Face { vertices });
            }
        }
        offset += geometry.triangle_count();
    });

    let mut obj = String::new();
    for p in &positions {
        let _ = writeln!(obj, "v {} {} {}", p.x, p.y, p.z);
    }
    for n in &normals {
        let _ = writeln!(obj, "vn {} {} {}", n.x, n.y, n.z);
    }
    for uv in &uvs {
        let _ = writeln!(obj, "vt {} {}", uv.x, uv.y);
    }
    let _ = writeln!(obj, "mtllib {}", material_file);
    let _ = writeln!(obj, "usemtl {}", material_name);
    for face in &faces {
        let _ = writeln!(
            obj,
            "f {}/{}/{} {}/{}/{} {}/{}/{}",
            face.vertices[0].position + 1,
            face.vertices[0].uv + 1,
            face.vertices[0].normal + 1,
            face.vertices[1].position + 1,
            face.vertices[1].uv + 1,
            face.vertices[1].normal + 1,
            face.vertices[2].position + 1,
            face.vertices[2].uv + 1,
            face.vertices[2].normal + 1,
        );
    }
    obj
}

/// Fixed material body referencing the baked atlas texture.
pub fn material_file(texture_file: &str) -> String {
    format!(
        "newmtl default\n\
         Ka 0.0 0.0 0.0\n\
         Kd 1.0 1.0 1.0\n\
         Ks 0.0 0.0 0.0\n\
         d 1.0\n\
         illum 0\n\
         map_Kd {}\n",
        texture_file
    )
}

/// Copy the atlas color surface into host memory as an RGBA image.
pub fn read_atlas_color(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    atlas_color: &wgpu::Texture,
    resolution: u32,
) -> RetexResult<RgbaImage> {
    let bytes_per_row = resolution * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_bytes_per_row = (bytes_per_row + align - 1) / align * align;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Atlas Readback Buffer"),
        size: padded_bytes_per_row as u64 * resolution as u64,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Atlas Readback Encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: atlas_color,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &staging,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(resolution),
            },
        },
        wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    let _ = device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .map_err(|_| RetexError::Readback("mapping callback dropped".into()))?
        .map_err(|e| RetexError::Readback(format!("{:?}", e)))?;

    let data = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((bytes_per_row * resolution) as usize);
    if padded_bytes_per_row == bytes_per_row {
        pixels.extend_from_slice(&data[..(bytes_per_row * resolution) as usize]);
    } else {
        for row in 0..resolution {
            let start = (row * padded_bytes_per_row) as usize;
            pixels.extend_from_slice(&data[start..start + bytes_per_row as usize]);
        }
    }
    drop(data);
    staging.unmap();

    RgbaImage::from_raw(resolution, resolution, pixels)
        .ok_or_else(|| RetexError::Readback("row unpacking produced a short image".into()))
}

fn quantize(v: f32) -> i64 {
    (v as f64 * 100_000.0).round() as i64
}

fn lookup_or_add3(
    lookup: &mut HashMap<[i64; 3], usize>,
    list: &mut Vec<Vector3<f32>>,
    value: Vector3<f32>,
) -> usize {
    let key = [quantize(value.x), quantize(value.y), quantize(value.z)];
    *lookup.entry(key).or_insert_with(|| {
        list.push(value);
        list.len() - 1
    })
}

fn lookup_or_add2(
    lookup: &mut HashMap<[i64; 2], usize>,
    list: &mut Vec<Vector2<f32>>,
    value: Vector2<f32>,
) -> usize {
    let key = [quantize(value.x), quantize(value.y)];
    *lookup.entry(key).or_insert_with(|| {
        list.push(value);
        list.len() - 1
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{RawSurface, RegionId, RegionScan};
    use cgmath::{Matrix4, SquareMatrix};
    use std::collections::BTreeMap;

    fn snorm(v: f32) -> [u8; 2] {
        ((v * i16::MAX as f32) as i16).to_le_bytes()
    }

    /// A unit quad in the XY plane: 4 shared vertices, 2 triangles.
    fn quad_scan() -> RegionScan {
        let mut positions = Vec::new();
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)] {
            positions.extend_from_slice(&snorm(x));
            positions.extend_from_slice(&snorm(y));
            positions.extend_from_slice(&snorm(0.0));
            positions.extend_from_slice(&snorm(0.0));
        }
        let normals = [0u8, 0, 127, 0].repeat(4);
        let indices: Vec<u8> = [0u16, 1, 2, 2, 1, 3]
            .iter()
            .flat_map(|i| i.to_le_bytes())
            .collect();

        let mut surfaces = BTreeMap::new();
        surfaces.insert(
            RegionId(1),
            RawSurface {
                positions,
                normals,
                indices,
                position_scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
                mesh_to_reference: Matrix4::identity(),
            },
        );
        RegionScan { surfaces }
    }

    #[test]
    fn quad_exports_deduplicated_attributes() {
        let meshes = MeshSet::new();
        meshes.apply_scan(&quad_scan());

        let obj = build_obj(&meshes, "Material.mtl", "default");
        let count = |prefix: &str| obj.lines().filter(|l| l.starts_with(prefix)).count();

        assert_eq!(count("v "), 4, "shared quad corners must deduplicate");
        assert_eq!(count("vn "), 1, "identical normals must deduplicate");
        assert_eq!(count("vt "), 6, "atlas corners are unique per slot");
        assert_eq!(count("f "), 2);
        assert!(obj.contains("mtllib Material.mtl"));
        assert!(obj.contains("usemtl default"));
    }

    #[test]
    fn face_indices_are_one_based() {
        let meshes = MeshSet::new();
        meshes.apply_scan(&quad_scan());

        let obj = build_obj(&meshes, "Material.mtl", "default");
        let first_face = obj
            .lines()
            .find(|l| l.starts_with("f "))
            .expect("quad must produce faces");
        assert!(first_face.starts_with("f 1/1/1 "));
        assert!(!obj.contains("/0/"));
    }

    #[test]
    fn export_uvs_are_v_flipped() {
        let meshes = MeshSet::new();
        meshes.apply_scan(&quad_scan());

        // Two triangles -> side 1, first corner sits near the cell's top
        // left; flipped V lands near 1.
        let obj = build_obj(&meshes, "Material.mtl", "default");
        let first_vt = obj
            .lines()
            .find(|l| l.starts_with("vt "))
            .expect("quad must produce uvs");
        let v: f32 = first_vt
            .split_whitespace()
            .nth(2)
            .and_then(|s| s.parse().ok())
            .expect("vt line must carry two floats");
        assert!(v > 0.99);
    }

    #[test]
    fn empty_set_exports_header_only() {
        let obj = build_obj(&MeshSet::new(), "Material.mtl", "default");
        assert!(!obj.contains("\nv "));
        assert!(!obj.contains("f "));
        assert!(obj.contains("mtllib Material.mtl"));
    }

    #[test]
    fn material_file_references_texture() {
        let mtl = material_file("Texture.png");
        assert!(mtl.contains("newmtl default"));
        assert!(mtl.contains("map_Kd Texture.png"));
    }

    #[test]
    fn session_dir_is_created_under_root() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = session_dir(root.path()).expect("session dir");
        assert!(dir.is_dir());
        assert_eq!(dir.parent(), Some(root.path()));
    }
}
