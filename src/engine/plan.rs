//! Per-draw parameter planning - pure functions
//!
//! Computes the exact uniform-block sequences the GPU passes consume, from
//! layout snapshots alone. Offsets here and the draw iteration in
//! [`MeshSet`](crate::mesh::MeshSet) walk the same stable order, so index i
//! of a plan always describes the i-th iterated entity.

use crate::atlas::layout::grid_side;
use crate::engine::uniforms::{LayoutUniform, MigrationUniform};
use crate::mesh::encoding::RegionId;
use crate::mesh::mesh_set::{LayoutSnapshot, ScanSnapshot};

/// Parameters for one entity in the render or projection pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutDraw {
    pub region: RegionId,
    pub uniform: LayoutUniform,
}

/// Parameters for one entity in the migration pass. `uniform` is `None` for
/// entities without an old offset (added this cycle): they are excluded from
/// the atlas copy and their cells start blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationDraw {
    pub region: RegionId,
    pub uniform: Option<MigrationUniform>,
}

/// Per-entity (offset, grid side) for rendering or projecting the current
/// atlas generation.
pub fn layout_params(snapshot: &LayoutSnapshot) -> Vec<LayoutDraw> {
    let side = grid_side(snapshot.total_triangles);
    let mut offset = 0;
    snapshot
        .entries
        .iter()
        .map(|&(region, triangles)| {
            let draw = LayoutDraw {
                region,
                uniform: LayoutUniform::new(offset, side),
            };
            offset += triangles;
            draw
        })
        .collect()
}

/// Per-entity old→new cell mapping for an atlas migration.
///
/// New offsets accumulate over every entity of the post-scan layout; old
/// offsets come from the pre-scan snapshot. An entity missing from the
/// snapshot gets no uniform and must be skipped by the copy.
pub fn migration_params(old: &ScanSnapshot, new: &LayoutSnapshot) -> Vec<MigrationDraw> {
    let old_side = grid_side(old.old_total);
    let new_side = grid_side(new.total_triangles);
    let mut new_offset = 0;
    new.entries
        .iter()
        .map(|&(region, triangles)| {
            let uniform = old.old_offsets.get(&region).map(|&old_offset| MigrationUniform {
                old_offset,
                new_offset,
                old_side,
                new_side,
            });
            new_offset += triangles;
            MigrationDraw { region, uniform }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn snapshot(entries: &[(u64, u32)]) -> LayoutSnapshot {
        LayoutSnapshot {
            entries: entries
                .iter()
                .map(|&(id, triangles)| (RegionId(id), triangles))
                .collect(),
            total_triangles: entries.iter().map(|&(_, n)| n).sum(),
        }
    }

    fn old_snapshot(offsets: &[(u64, u32)], total: u32) -> ScanSnapshot {
        ScanSnapshot {
            old_offsets: offsets
                .iter()
                .map(|&(id, offset)| (RegionId(id), offset))
                .collect::<BTreeMap<_, _>>(),
            old_total: total,
        }
    }

    #[test]
    fn layout_params_accumulate_offsets() {
        let params = layout_params(&snapshot(&[(1, 10), (2, 0), (3, 5)]));
        assert_eq!(params[0].uniform, LayoutUniform::new(0, 3));
        assert_eq!(params[1].uniform, LayoutUniform::new(10, 3));
        assert_eq!(params[2].uniform, LayoutUniform::new(10, 3));
    }

    #[test]
    fn layout_params_are_deterministic() {
        // Re-rendering an unchanged set must produce an identical sequence.
        let snap = snapshot(&[(7, 12), (9, 4)]);
        assert_eq!(layout_params(&snap), layout_params(&snap));
    }

    #[test]
    fn empty_set_plans_nothing() {
        let params = layout_params(&snapshot(&[]));
        assert!(params.is_empty());
    }

    #[test]
    fn migration_maps_survivors_and_skips_newcomers() {
        // A and C survive a scan that removed B; both keep their geometry.
        let old = old_snapshot(&[(1, 0), (2, 10), (3, 13)], 18);
        let new = snapshot(&[(1, 10), (3, 5)]);
        let params = migration_params(&old, &new);

        assert_eq!(params.len(), 2);
        let a = params[0].uniform.unwrap();
        assert_eq!((a.old_offset, a.new_offset), (0, 0));
        let c = params[1].uniform.unwrap();
        assert_eq!((c.old_offset, c.new_offset), (13, 10));
        assert!(params.iter().all(|p| p.region != RegionId(2)));
    }

    #[test]
    fn migration_new_offsets_advance_past_skipped_entities() {
        let old = old_snapshot(&[(2, 0)], 6);
        let new = snapshot(&[(1, 4), (2, 6)]);
        let params = migration_params(&old, &new);

        // Region 1 is new: skipped, but it still occupies new cells 0..4.
        assert!(params[0].uniform.is_none());
        let survivor = params[1].uniform.unwrap();
        assert_eq!(survivor.new_offset, 4);
        assert_eq!(survivor.old_offset, 0);
    }

    #[test]
    fn repack_scenario_from_first_scan_to_growth() {
        // First scan: one region, 4 triangles, side 2.
        let first = snapshot(&[(1, 4)]);
        let params = layout_params(&first);
        assert_eq!(params[0].uniform, LayoutUniform::new(0, 2));

        // Second scan grows region 1 to 10 triangles and adds region 2
        // with 6: old layout {1: 0}/4, new total 16, side 3.
        let old = old_snapshot(&[(1, 0)], 4);
        let new = snapshot(&[(1, 10), (2, 6)]);
        let migration = migration_params(&old, &new);

        let r1 = migration[0].uniform.unwrap();
        assert_eq!(
            (r1.old_offset, r1.new_offset, r1.old_side, r1.new_side),
            (0, 0, 2, 3)
        );
        assert!(migration[1].uniform.is_none());

        // Post-migration render uses the new layout.
        let render = layout_params(&new);
        assert_eq!(render[0].uniform, LayoutUniform::new(0, 3));
        assert_eq!(render[1].uniform, LayoutUniform::new(10, 3));
    }
}
