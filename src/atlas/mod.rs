//! Texture atlas: square-grid triangle packing and the double-buffered
//! atlas surfaces the packing renders into.

pub mod layout;
pub mod pair;
pub mod texture_set;

pub use layout::{cell_uv, grid_side};
pub use pair::TextureAtlasPair;
pub use texture_set::AtlasTextureSet;
