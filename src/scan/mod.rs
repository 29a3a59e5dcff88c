//! Environment-scan intake.
//!
//! The scan source pushes full region snapshots from its own thread. The
//! inbox captures the pre-mutation atlas layout *at notification time* -
//! the migration pass must map old offsets that correspond to the set as it
//! was when the scan arrived - and parks scan + snapshot in a single slot
//! the render thread consumes once per tick. While a repack is pending,
//! further scans are dropped; the source re-reports complete snapshots, so
//! nothing is lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::mesh::mesh_set::{MeshSet, RegionScan, ScanSnapshot};

/// A scan waiting to be applied, with the layout snapshot captured when it
/// arrived.
pub struct PendingRepack {
    pub snapshot: ScanSnapshot,
    pub scan: RegionScan,
}

pub struct ScanInbox {
    meshes: Arc<MeshSet>,
    pending: Mutex<Option<PendingRepack>>,
    geometry_paused: AtomicBool,
}

impl ScanInbox {
    pub fn new(meshes: Arc<MeshSet>) -> Self {
        Self {
            meshes,
            pending: Mutex::new(None),
            geometry_paused: AtomicBool::new(false),
        }
    }

    /// Deliver a scan from the scan thread. Snapshots the current layout and
    /// parks the pair for the next tick; first scan wins until consumed.
    pub fn submit(&self, scan: RegionScan) {
        if self.geometry_paused.load(Ordering::Acquire) {
            log::trace!("[ScanInbox::submit] geometry paused, scan ignored");
            return;
        }
        let mut pending = self.pending.lock();
        if pending.is_some() {
            log::debug!("[ScanInbox::submit] repack already pending, scan dropped");
            return;
        }
        let snapshot = self.meshes.process_scan(&scan);
        log::debug!(
            "[ScanInbox::submit] scan with {} regions queued (old total {} triangles)",
            scan.surfaces.len(),
            snapshot.old_total
        );
        *pending = Some(PendingRepack { snapshot, scan });
    }

    /// Consume the pending repack, if any. Render thread, once per tick.
    pub(crate) fn take(&self) -> Option<PendingRepack> {
        self.pending.lock().take()
    }

    pub(crate) fn set_geometry_paused(&self, paused: bool) {
        self.geometry_paused.store(paused, Ordering::Release);
    }

    pub fn geometry_paused(&self) -> bool {
        self.geometry_paused.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::encoding::{RawSurface, RegionId};
    use cgmath::{Matrix4, SquareMatrix, Vector3};

    fn scan(entries: &[(u64, u32)]) -> RegionScan {
        RegionScan {
            surfaces: entries
                .iter()
                .map(|&(id, triangles)| {
                    let indices: Vec<u8> = (0..triangles * 3)
                        .flat_map(|i| (i as u16).to_le_bytes())
                        .collect();
                    (
                        RegionId(id),
                        RawSurface {
                            positions: vec![0; 24],
                            normals: vec![0; 12],
                            indices,
                            position_scale: Vector3::new(1.0, 1.0, 1.0),
                            mesh_to_reference: Matrix4::identity(),
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn submit_snapshots_the_pre_scan_layout() {
        let meshes = Arc::new(MeshSet::new());
        meshes.apply_scan(&scan(&[(1, 4)]));

        let inbox = ScanInbox::new(meshes);
        inbox.submit(scan(&[(1, 10), (2, 6)]));

        let pending = inbox.take().expect("scan should be pending");
        assert_eq!(pending.snapshot.old_total, 4);
        assert_eq!(pending.snapshot.old_offsets[&RegionId(1)], 0);
        assert_eq!(pending.scan.surfaces.len(), 2);
        assert!(inbox.take().is_none());
    }

    #[test]
    fn first_scan_wins_until_consumed() {
        let inbox = ScanInbox::new(Arc::new(MeshSet::new()));
        inbox.submit(scan(&[(1, 4)]));
        inbox.submit(scan(&[(1, 4), (2, 2), (3, 1)]));

        let pending = inbox.take().expect("scan should be pending");
        assert_eq!(pending.scan.surfaces.len(), 1);
    }

    #[test]
    fn paused_geometry_ignores_scans() {
        let inbox = ScanInbox::new(Arc::new(MeshSet::new()));
        inbox.set_geometry_paused(true);
        inbox.submit(scan(&[(1, 4)]));
        assert!(inbox.take().is_none());

        inbox.set_geometry_paused(false);
        inbox.submit(scan(&[(1, 4)]));
        assert!(inbox.take().is_some());
    }
}
