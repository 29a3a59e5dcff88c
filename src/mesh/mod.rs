//! Scanned surface geometry: raw scan decoding, per-region meshes, and the
//! locked region collection that drives atlas layout.

pub mod encoding;
pub mod mesh_set;
pub mod surface_mesh;

pub use encoding::{decode_surface, RawSurface, RegionId, SurfaceGeometry};
pub use mesh_set::{LayoutSnapshot, MeshEntities, MeshSet, RegionScan, ScanSnapshot};
pub use surface_mesh::{MeshBuffers, SurfaceMesh};
