//! Retexture engine: per-tick orchestration, GPU pipelines, per-draw
//! parameter blocks, and the pure planning that decides them.

pub mod pipelines;
pub mod plan;
pub mod retexture;
pub mod uniforms;

pub use plan::{layout_params, migration_params};
pub use retexture::{FrameInput, RetextureEngine};
