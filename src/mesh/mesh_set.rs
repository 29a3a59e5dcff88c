//! The locked collection of scanned regions.
//!
//! One mutex guards the id → mesh map; every reader (draw iteration, offset
//! computation, transform updates) and the scan-apply writer hold it for the
//! duration of their iteration. Iteration order is the `BTreeMap` id order,
//! which is what makes atlas offsets stable within a packing cycle.

use std::collections::BTreeMap;

use cgmath::{Matrix4, SquareMatrix};
use parking_lot::{Mutex, MutexGuard};

use crate::mesh::encoding::{RawSurface, RegionId, SurfaceGeometry};
use crate::mesh::surface_mesh::{MeshBuffers, SurfaceMesh};

/// One full environment-scan snapshot: every region the scanner currently
/// tracks, with its raw mesh data.
#[derive(Debug, Clone, Default)]
pub struct RegionScan {
    pub surfaces: BTreeMap<RegionId, RawSurface>,
}

/// Pre-mutation layout snapshot captured when a scan arrives. The migration
/// pass needs it to find each surviving region's old atlas cells.
#[derive(Debug, Clone, Default)]
pub struct ScanSnapshot {
    pub old_offsets: BTreeMap<RegionId, u32>,
    pub old_total: u32,
}

/// Current layout of the set: per-region triangle counts in iteration order
/// plus the total. Input to the draw-parameter planning and the export path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutSnapshot {
    pub entries: Vec<(RegionId, u32)>,
    pub total_triangles: u32,
}

#[derive(Default)]
pub struct MeshSet {
    meshes: Mutex<BTreeMap<RegionId, SurfaceMesh>>,
}

impl MeshSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the pre-mutation offsets and triangle total for an incoming
    /// scan. Pure snapshot: the set itself is not touched, so the caller
    /// decides when it is safe to apply the scan.
    pub fn process_scan(&self, _scan: &RegionScan) -> ScanSnapshot {
        let meshes = self.meshes.lock();
        let (old_offsets, old_total) = offsets_of(&meshes);
        ScanSnapshot {
            old_offsets,
            old_total,
        }
    }

    /// Apply a scan to the set: new regions are created, regions absent from
    /// the scan are removed, and regions present in both get their geometry
    /// replaced wholesale. CPU-side only; uploads happen in `upload_dirty`.
    pub fn apply_scan(&self, scan: &RegionScan) {
        let mut meshes = self.meshes.lock();
        for (&id, raw) in &scan.surfaces {
            match meshes.get_mut(&id) {
                Some(mesh) => mesh.replace_geometry(raw),
                None => {
                    meshes.insert(id, SurfaceMesh::from_scan(raw));
                }
            }
        }
        let before = meshes.len();
        meshes.retain(|id, _| scan.surfaces.contains_key(id));
        log::debug!(
            "[MeshSet::apply_scan] {} regions ({} removed)",
            meshes.len(),
            before - meshes.len()
        );
    }

    /// Build GPU residency for every mesh whose geometry changed since its
    /// last upload. Render thread only.
    pub fn upload_dirty(&self, device: &wgpu::Device, mesh_layout: &wgpu::BindGroupLayout) {
        let mut meshes = self.meshes.lock();
        for (id, mesh) in meshes.iter_mut() {
            if mesh.is_dirty() {
                mesh.upload(device, mesh_layout);
                log::trace!(
                    "[MeshSet::upload_dirty] region {} ({} triangles, ready={})",
                    id,
                    mesh.triangle_count(),
                    mesh.is_ready()
                );
            }
        }
    }

    /// Refresh every ready mesh's transform uniform against a reference
    /// frame adjustment. Runs up to once per frame.
    pub fn update_transforms(&self, queue: &wgpu::Queue, adjust: &Matrix4<f32>) {
        let meshes = self.meshes.lock();
        for mesh in meshes.values() {
            mesh.update_transform(queue, adjust);
        }
    }

    /// Lock the set for the duration of a draw iteration. The returned
    /// guard keeps the collection stable while a render pass references the
    /// entities' GPU buffers; hold it until the pass is encoded.
    pub fn entities(&self) -> MeshEntities<'_> {
        MeshEntities {
            guard: self.meshes.lock(),
        }
    }

    /// Convenience for a single locked draw iteration; see
    /// [`MeshEntities::draw_with`].
    pub fn draw_with(
        &self,
        filter: impl FnMut(usize, RegionId, u32) -> bool,
        emit: impl FnMut(usize, &MeshBuffers),
    ) {
        self.entities().draw_with(filter, emit);
    }

    /// Prefix sums of per-entity triangle counts in iteration order.
    pub fn compute_offsets(&self) -> BTreeMap<RegionId, u32> {
        offsets_of(&self.meshes.lock()).0
    }

    pub fn total_triangles(&self) -> u32 {
        self.meshes.lock().values().map(SurfaceMesh::triangle_count).sum()
    }

    /// Per-entity triangle counts and the total, in iteration order.
    pub fn snapshot(&self) -> LayoutSnapshot {
        let meshes = self.meshes.lock();
        let entries: Vec<(RegionId, u32)> = meshes
            .iter()
            .map(|(&id, mesh)| (id, mesh.triangle_count()))
            .collect();
        let total_triangles = entries.iter().map(|(_, n)| n).sum();
        LayoutSnapshot {
            entries,
            total_triangles,
        }
    }

    /// Visit every region's decoded geometry with its vertex and normal
    /// transforms, in iteration order. Used by the export path.
    pub fn for_each_geometry(
        &self,
        mut f: impl FnMut(RegionId, &SurfaceGeometry, Matrix4<f32>, Matrix4<f32>),
    ) {
        let meshes = self.meshes.lock();
        for (&id, mesh) in meshes.iter() {
            let (vertex, normal) = mesh.transforms(&Matrix4::identity());
            f(id, mesh.geometry(), vertex, normal);
        }
    }

    pub fn len(&self) -> usize {
        self.meshes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.lock().is_empty()
    }
}

/// Locked view of the mesh set for one draw iteration.
pub struct MeshEntities<'a> {
    guard: MutexGuard<'a, BTreeMap<RegionId, SurfaceMesh>>,
}

impl MeshEntities<'_> {
    /// Iterate entities in stable order. `filter` runs for every entity in
    /// order and decides whether the entity is drawn; `emit` then receives
    /// the GPU buffers of entities that are both kept and ready. The index
    /// counts every iterated entity, kept or not, so it lines up with the
    /// per-draw parameter sequences planned from a matching snapshot.
    pub fn draw_with<'s>(
        &'s self,
        mut filter: impl FnMut(usize, RegionId, u32) -> bool,
        mut emit: impl FnMut(usize, &'s MeshBuffers),
    ) {
        for (index, (&id, mesh)) in self.guard.iter().enumerate() {
            if filter(index, id, mesh.triangle_count()) {
                if let Some(buffers) = mesh.buffers() {
                    emit(index, buffers);
                }
            }
        }
    }
}

fn offsets_of(meshes: &BTreeMap<RegionId, SurfaceMesh>) -> (BTreeMap<RegionId, u32>, u32) {
    let mut offsets = BTreeMap::new();
    let mut offset = 0;
    for (&id, mesh) in meshes.iter() {
        offsets.insert(id, offset);
        offset += mesh.triangle_count();
    }
    (offsets, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{SquareMatrix, Vector3};

    fn raw(triangles: u32) -> RawSurface {
        let indices: Vec<u8> = (0..triangles * 3)
            .flat_map(|i| (i as u16).to_le_bytes())
            .collect();
        RawSurface {
            positions: vec![0; (triangles.max(1) as usize * 3) * 8],
            normals: vec![0; (triangles.max(1) as usize * 3) * 4],
            indices,
            position_scale: Vector3::new(1.0, 1.0, 1.0),
            mesh_to_reference: Matrix4::identity(),
        }
    }

    fn scan(entries: &[(u64, u32)]) -> RegionScan {
        RegionScan {
            surfaces: entries
                .iter()
                .map(|&(id, triangles)| (RegionId(id), raw(triangles)))
                .collect(),
        }
    }

    #[test]
    fn offsets_are_prefix_sums_in_id_order() {
        let set = MeshSet::new();
        set.apply_scan(&scan(&[(1, 10), (2, 0), (3, 5)]));

        let offsets = set.compute_offsets();
        assert_eq!(offsets[&RegionId(1)], 0);
        assert_eq!(offsets[&RegionId(2)], 10);
        assert_eq!(offsets[&RegionId(3)], 10);
        assert_eq!(set.total_triangles(), 15);
    }

    #[test]
    fn process_scan_captures_state_before_apply() {
        let set = MeshSet::new();
        set.apply_scan(&scan(&[(1, 4)]));

        let next = scan(&[(1, 10), (2, 6)]);
        let snapshot = set.process_scan(&next);
        assert_eq!(snapshot.old_total, 4);
        assert_eq!(snapshot.old_offsets.len(), 1);
        assert_eq!(snapshot.old_offsets[&RegionId(1)], 0);

        set.apply_scan(&next);
        assert_eq!(set.total_triangles(), 16);
        // The earlier snapshot is unchanged by the mutation.
        assert_eq!(snapshot.old_total, 4);
    }

    #[test]
    fn apply_scan_removes_absent_regions() {
        let set = MeshSet::new();
        set.apply_scan(&scan(&[(1, 10), (2, 3), (3, 5)]));
        set.apply_scan(&scan(&[(1, 10), (3, 5)]));

        assert_eq!(set.len(), 2);
        let offsets = set.compute_offsets();
        assert!(offsets.get(&RegionId(2)).is_none());
        assert_eq!(offsets[&RegionId(1)], 0);
        assert_eq!(offsets[&RegionId(3)], 10);
    }

    #[test]
    fn reported_regions_are_replaced_unconditionally() {
        let set = MeshSet::new();
        set.apply_scan(&scan(&[(1, 4)]));
        set.apply_scan(&scan(&[(1, 9)]));
        assert_eq!(set.total_triangles(), 9);
    }

    #[test]
    fn degenerate_region_counts_zero_triangles() {
        let set = MeshSet::new();
        set.apply_scan(&scan(&[(1, 0), (2, 5)]));
        assert_eq!(set.len(), 2);
        assert_eq!(set.total_triangles(), 5);
    }

    #[test]
    fn draw_filter_sees_every_entity_in_order() {
        let set = MeshSet::new();
        set.apply_scan(&scan(&[(3, 5), (1, 10), (2, 0)]));

        let mut visited = Vec::new();
        let mut emitted = 0;
        set.draw_with(
            |_, id, triangles| {
                visited.push((id, triangles));
                true
            },
            |_, _| emitted += 1,
        );
        assert_eq!(
            visited,
            vec![
                (RegionId(1), 10),
                (RegionId(2), 0),
                (RegionId(3), 5),
            ]
        );
        // Nothing has GPU residency yet, so nothing is emitted.
        assert_eq!(emitted, 0);
    }

    #[test]
    fn snapshot_matches_offsets() {
        let set = MeshSet::new();
        set.apply_scan(&scan(&[(1, 10), (2, 0), (3, 5)]));
        let snapshot = set.snapshot();
        assert_eq!(
            snapshot.entries,
            vec![
                (RegionId(1), 10),
                (RegionId(2), 0),
                (RegionId(3), 5),
            ]
        );
        assert_eq!(snapshot.total_triangles, 15);
    }
}
