//! One atlas generation's GPU surfaces.

/// Color and quality/age surfaces for one atlas buffer, with render and
/// sampling views for each.
pub struct AtlasTextureSet {
    pub color: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub quality: wgpu::Texture,
    pub quality_view: wgpu::TextureView,
}

/// Texel format of the color surface.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Texel format of the quality/age surface.
pub const QUALITY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;

impl AtlasTextureSet {
    pub fn new(device: &wgpu::Device, resolution: u32) -> Self {
        let descriptor = |label, format| wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        };

        let color = device.create_texture(&descriptor("Atlas Color", COLOR_FORMAT));
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let quality = device.create_texture(&descriptor("Atlas Quality", QUALITY_FORMAT));
        let quality_view = quality.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            color,
            color_view,
            quality,
            quality_view,
        }
    }
}
