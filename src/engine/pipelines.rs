//! Pipeline and bind-group-layout construction for the four retexturing
//! passes. Built once at engine creation; WGSL lives in `src/shaders/` and
//! is composed with a generated constant prelude so the engine
//! configuration reaches the shaders.

use crate::atlas::texture_set::{COLOR_FORMAT, QUALITY_FORMAT};
use crate::RetextureConfig;

/// Depth format of the camera-sized pre-pass target.
pub const CAMERA_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

pub struct RetexturePipelines {
    /// Group 0 everywhere: per-mesh vertex-pull buffers + transform.
    pub mesh_layout: wgpu::BindGroupLayout,
    /// Group 1 of the atlas-space passes: per-draw parameter block with a
    /// dynamic offset.
    pub param_layout: wgpu::BindGroupLayout,
    /// Group 1 of the depth pre-pass / group 2 slot 0 of projection.
    pub camera_layout: wgpu::BindGroupLayout,
    pub render_globals_layout: wgpu::BindGroupLayout,
    pub projection_globals_layout: wgpu::BindGroupLayout,
    pub migrate_globals_layout: wgpu::BindGroupLayout,

    pub render: wgpu::RenderPipeline,
    pub depth_prepass: wgpu::RenderPipeline,
    pub projection: wgpu::RenderPipeline,
    pub migrate: wgpu::RenderPipeline,

    pub atlas_sampler: wgpu::Sampler,
}

impl RetexturePipelines {
    pub fn new(
        device: &wgpu::Device,
        output_format: wgpu::TextureFormat,
        config: &RetextureConfig,
    ) -> Self {
        let mesh_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mesh Bind Group Layout"),
            entries: &[
                storage_entry(0),
                storage_entry(1),
                storage_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let param_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Draw Param Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Camera Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let render_globals_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Render Globals Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    texture_entry(1),
                    sampler_entry(2),
                ],
            });

        let projection_globals_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Projection Globals Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    texture_entry(1),
                    sampler_entry(2),
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Depth,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                ],
            });

        let migrate_globals_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Migrate Globals Bind Group Layout"),
                entries: &[texture_entry(0), texture_entry(1), sampler_entry(2)],
            });

        let prelude = shader_prelude(config);
        let module = |label: &str, source: &str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(
                    format!(
                        "{}\n{}\n{}",
                        prelude,
                        include_str!("../shaders/atlas_common.wgsl"),
                        source
                    )
                    .into(),
                ),
            })
        };

        let render_module = module("Mesh Render Shader", include_str!("../shaders/mesh_render.wgsl"));
        let prepass_module = module(
            "Depth Prepass Shader",
            include_str!("../shaders/depth_prepass.wgsl"),
        );
        let projection_module = module(
            "Camera Projection Shader",
            include_str!("../shaders/camera_project.wgsl"),
        );
        let migrate_module = module(
            "Atlas Migrate Shader",
            include_str!("../shaders/atlas_migrate.wgsl"),
        );

        let primitive = wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        };

        let render_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Mesh Render Pipeline Layout"),
                bind_group_layouts: &[&mesh_layout, &param_layout, &render_globals_layout],
                push_constant_ranges: &[],
            });
        let render = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mesh Render Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &render_module,
                entry_point: "vs_main",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &render_module,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: output_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive,
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let prepass_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Depth Prepass Pipeline Layout"),
                bind_group_layouts: &[&mesh_layout, &camera_layout],
                push_constant_ranges: &[],
            });
        let depth_prepass = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Depth Prepass Pipeline"),
            layout: Some(&prepass_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &prepass_module,
                entry_point: "vs_main",
                buffers: &[],
            },
            fragment: None,
            primitive,
            depth_stencil: Some(wgpu::DepthStencilState {
                format: CAMERA_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let projection_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Camera Projection Pipeline Layout"),
                bind_group_layouts: &[&mesh_layout, &param_layout, &projection_globals_layout],
                push_constant_ranges: &[],
            });
        let projection = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Camera Projection Pipeline"),
            layout: Some(&projection_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &projection_module,
                entry_point: "vs_main",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &projection_module,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive,
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let migrate_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Atlas Migrate Pipeline Layout"),
                bind_group_layouts: &[&mesh_layout, &param_layout, &migrate_globals_layout],
                push_constant_ranges: &[],
            });
        let migrate = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Atlas Migrate Pipeline"),
            layout: Some(&migrate_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &migrate_module,
                entry_point: "vs_main",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &migrate_module,
                entry_point: "fs_main",
                targets: &[
                    Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                    Some(wgpu::ColorTargetState {
                        format: QUALITY_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                ],
            }),
            primitive,
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let atlas_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Atlas Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        log::info!("[RetexturePipelines::new] pipelines compiled");

        Self {
            mesh_layout,
            param_layout,
            camera_layout,
            render_globals_layout,
            projection_globals_layout,
            migrate_globals_layout,
            render,
            depth_prepass,
            projection,
            migrate,
            atlas_sampler,
        }
    }
}

/// Configuration constants prepended to every shader.
fn shader_prelude(config: &RetextureConfig) -> String {
    format!(
        "const ATLAS_RESOLUTION: f32 = {:.1};\nconst ATLAS_BORDER: f32 = {:.1};\nconst DEPTH_TOLERANCE: f32 = {:?};",
        config.atlas_resolution as f32, config.atlas_border_texels, config.depth_tolerance
    )
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_emits_valid_wgsl_constants() {
        let prelude = shader_prelude(&RetextureConfig::default());
        assert!(prelude.contains("const ATLAS_RESOLUTION: f32 = 4096.0;"));
        assert!(prelude.contains("const ATLAS_BORDER: f32 = 1.0;"));
        assert!(prelude.contains("DEPTH_TOLERANCE"));
    }
}
