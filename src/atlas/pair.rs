//! Double-buffered atlas.
//!
//! Both buffers are allocated once and swapped by index on every repack,
//! never reallocated. The index is read and written only on the render
//! thread, so it needs no synchronization.

use crate::atlas::texture_set::AtlasTextureSet;

pub struct TextureAtlasPair {
    sets: [AtlasTextureSet; 2],
    current: usize,
    resolution: u32,
}

impl TextureAtlasPair {
    pub fn new(device: &wgpu::Device, resolution: u32) -> Self {
        log::info!(
            "[TextureAtlasPair::new] allocating 2x {}x{} atlas surface pairs",
            resolution,
            resolution
        );
        Self {
            sets: [
                AtlasTextureSet::new(device, resolution),
                AtlasTextureSet::new(device, resolution),
            ],
            current: 0,
            resolution,
        }
    }

    /// The readable atlas the renderer samples this generation.
    pub fn current(&self) -> &AtlasTextureSet {
        &self.sets[self.current]
    }

    /// The write target of an in-progress repack.
    pub fn next(&self) -> &AtlasTextureSet {
        &self.sets[(self.current + 1) % 2]
    }

    /// Retire the current atlas and make the freshly repacked one current.
    pub fn swap(&mut self) {
        self.current = (self.current + 1) % 2;
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Direct access by buffer index, for bind groups prebuilt per buffer.
    pub fn set(&self, index: usize) -> &AtlasTextureSet {
        &self.sets[index]
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }
}
