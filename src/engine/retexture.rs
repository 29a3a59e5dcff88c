//! The retexturing orchestrator.
//!
//! Drives the fixed per-tick sequence on the render thread: render the
//! current atlas onto the meshes, project the camera frame into the atlas
//! if one arrived, then apply any pending scan and migrate the atlas to the
//! new layout. Asynchronous events (scans, camera frames) only ever set
//! state that is consumed here, once per tick.

use std::path::PathBuf;
use std::sync::Arc;

use cgmath::{Matrix4, SquareMatrix};

use crate::atlas::layout::grid_side;
use crate::atlas::TextureAtlasPair;
use crate::camera::SharedCameraFeed;
use crate::engine::pipelines::{RetexturePipelines, CAMERA_DEPTH_FORMAT};
use crate::engine::plan::{layout_params, migration_params, LayoutDraw};
use crate::engine::uniforms::{CameraUniform, EyeUniform, PARAM_STRIDE};
use crate::error::RetexResult;
use crate::export;
use crate::mesh::MeshSet;
use crate::scan::{PendingRepack, ScanInbox};
use crate::RetextureConfig;

/// Per-tick input from the display side.
pub struct FrameInput {
    /// View-projection per stereo eye; non-stereo callers pass the same
    /// matrix twice.
    pub eye_view_projections: [Matrix4<f32>; 2],
    /// Correction applied on top of every mesh's reference-frame transform
    /// this tick (anchor drift compensation).
    pub reference_adjustment: Matrix4<f32>,
}

impl Default for FrameInput {
    fn default() -> Self {
        Self {
            eye_view_projections: [Matrix4::identity(); 2],
            reference_adjustment: Matrix4::identity(),
        }
    }
}

/// One growable uniform buffer holding per-draw parameter blocks at
/// [`PARAM_STRIDE`] intervals, selected per draw with a dynamic offset.
struct ParamBuffer {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
}

impl ParamBuffer {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: usize) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Param Buffer"),
            size: capacity as u64 * PARAM_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Param Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(PARAM_STRIDE),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            capacity,
        }
    }

    fn ensure_capacity(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        wanted: usize,
    ) {
        if wanted > self.capacity {
            *self = Self::new(device, layout, wanted.next_power_of_two());
        }
    }

    fn write(&self, queue: &wgpu::Queue, index: usize, block: &[u8]) {
        queue.write_buffer(&self.buffer, index as u64 * PARAM_STRIDE, block);
    }

    fn offset_of(index: usize) -> u32 {
        (index as u64 * PARAM_STRIDE) as u32
    }
}

pub struct RetextureEngine {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: RetextureConfig,

    meshes: Arc<MeshSet>,
    inbox: Arc<ScanInbox>,
    camera: Arc<SharedCameraFeed>,

    atlas: TextureAtlasPair,
    pipelines: RetexturePipelines,

    camera_depth_view: wgpu::TextureView,
    camera_uniform: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    eye_uniform: wgpu::Buffer,
    /// Render/migrate globals prebuilt per atlas buffer index.
    render_globals: [wgpu::BindGroup; 2],
    migrate_globals: [wgpu::BindGroup; 2],

    layout_params_buf: ParamBuffer,
    migration_params_buf: ParamBuffer,

    projection_requested: bool,
    camera_paused: bool,
    export_request: Option<PathBuf>,
    active: bool,
}

impl RetextureEngine {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        output_format: wgpu::TextureFormat,
        config: RetextureConfig,
        camera: Arc<SharedCameraFeed>,
    ) -> RetexResult<Self> {
        config.validate()?;

        let pipelines = RetexturePipelines::new(&device, output_format, &config);
        let atlas = TextureAtlasPair::new(&device, config.atlas_resolution);

        let (camera_width, camera_height) = camera.frame_size();
        let camera_depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Camera Depth Prepass"),
            size: wgpu::Extent3d {
                width: camera_width,
                height: camera_height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CAMERA_DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let camera_depth_view = camera_depth.create_view(&wgpu::TextureViewDescriptor::default());

        let camera_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Uniform"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &pipelines.camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_uniform.as_entire_binding(),
            }],
        });

        let eye_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Eye Uniform"),
            size: std::mem::size_of::<EyeUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let render_globals = [0usize, 1].map(|index| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Render Globals Bind Group"),
                layout: &pipelines.render_globals_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: eye_uniform.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&atlas.set(index).color_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&pipelines.atlas_sampler),
                    },
                ],
            })
        });
        let migrate_globals = [0usize, 1].map(|index| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Migrate Globals Bind Group"),
                layout: &pipelines.migrate_globals_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&atlas.set(index).color_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(
                            &atlas.set(index).quality_view,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&pipelines.atlas_sampler),
                    },
                ],
            })
        });

        let layout_params_buf = ParamBuffer::new(&device, &pipelines.param_layout, 64);
        let migration_params_buf = ParamBuffer::new(&device, &pipelines.param_layout, 64);

        let meshes = Arc::new(MeshSet::new());
        let inbox = Arc::new(ScanInbox::new(Arc::clone(&meshes)));

        log::info!(
            "[RetextureEngine::new] initialized ({}x{} atlas, {}x{} camera)",
            config.atlas_resolution,
            config.atlas_resolution,
            camera_width,
            camera_height
        );

        Ok(Self {
            device,
            queue,
            config,
            meshes,
            inbox,
            camera,
            atlas,
            pipelines,
            camera_depth_view,
            camera_uniform,
            camera_bind_group,
            eye_uniform,
            render_globals,
            migrate_globals,
            layout_params_buf,
            migration_params_buf,
            projection_requested: false,
            camera_paused: false,
            export_request: None,
            active: false,
        })
    }

    /// Make the per-tick operations live. Everything is a no-op before this.
    pub fn activate(&mut self) {
        self.active = true;
        log::info!("[RetextureEngine::activate] engine active");
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn config(&self) -> &RetextureConfig {
        &self.config
    }

    /// Shared mesh set; scan and export paths read it under its own lock.
    pub fn meshes(&self) -> Arc<MeshSet> {
        Arc::clone(&self.meshes)
    }

    /// Handle for the scan thread to deliver environment updates.
    pub fn scan_inbox(&self) -> Arc<ScanInbox> {
        Arc::clone(&self.inbox)
    }

    /// Pause/resume camera projection. While paused, projection requests
    /// stay pending.
    pub fn toggle_camera(&mut self) -> bool {
        self.camera_paused = !self.camera_paused;
        log::info!(
            "[RetextureEngine::toggle_camera] camera {}",
            if self.camera_paused { "paused" } else { "live" }
        );
        self.camera_paused
    }

    /// Pause/resume geometry updates, including scan intake.
    pub fn toggle_geometry(&mut self) -> bool {
        let paused = !self.inbox.geometry_paused();
        self.inbox.set_geometry_paused(paused);
        log::info!(
            "[RetextureEngine::toggle_geometry] geometry {}",
            if paused { "paused" } else { "live" }
        );
        paused
    }

    /// Ask for a model export at the end of the current tick, when geometry
    /// and atlas are in a consistent state.
    pub fn request_export(&mut self, root: impl Into<PathBuf>) {
        self.export_request = Some(root.into());
    }

    /// One render tick. Fixed order: render, then camera projection if
    /// requested, then scan application and atlas migration if pending,
    /// then export if requested.
    pub fn tick(&mut self, output: &wgpu::TextureView, frame: &FrameInput) -> RetexResult<()> {
        if !self.active {
            return Ok(());
        }

        if self.camera.take_frame_updated() {
            self.projection_requested = true;
        }

        self.meshes
            .update_transforms(&self.queue, &frame.reference_adjustment);

        self.render_meshes(output, frame);

        if self.projection_requested && !self.camera_paused {
            self.project_camera_texture();
            self.projection_requested = false;
        }

        if !self.inbox.geometry_paused() {
            if let Some(pending) = self.inbox.take() {
                self.update_packing(pending);
            }
        }

        if let Some(root) = self.export_request.take() {
            let path = export::export_model(
                &self.device,
                &self.queue,
                &self.meshes,
                &self.atlas.current().color,
                self.atlas.resolution(),
                &root,
            )?;
            log::info!("[RetextureEngine::tick] model exported to {:?}", path);
        }

        Ok(())
    }

    /// Step 1: draw every ready mesh sampling the current atlas, two
    /// instances per draw for the stereo eye pair.
    fn render_meshes(&mut self, output: &wgpu::TextureView, frame: &FrameInput) {
        let snapshot = self.meshes.snapshot();
        if snapshot.total_triangles == 0 {
            return;
        }
        let params = layout_params(&snapshot);
        self.write_layout_params(&params);
        self.queue.write_buffer(
            &self.eye_uniform,
            0,
            bytemuck::bytes_of(&EyeUniform::new(frame.eye_view_projections)),
        );

        let entities = self.meshes.entities();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Mesh Render Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mesh Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: output,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines.render);
            pass.set_bind_group(2, &self.render_globals[self.atlas.current_index()], &[]);

            let param_buf = &self.layout_params_buf;
            entities.draw_with(
                |_, _, _| true,
                |index, buffers| {
                    pass.set_bind_group(0, &buffers.bind_group, &[]);
                    pass.set_bind_group(1, &param_buf.bind_group, &[ParamBuffer::offset_of(index)]);
                    pass.draw(0..buffers.index_count, 0..2);
                },
            );
        }
        drop(entities);
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Step 2: depth pre-pass from the camera pose, then project the camera
    /// frame into every entity's current atlas cells. Skipped silently when
    /// no frame can be acquired within the lock timeout.
    fn project_camera_texture(&mut self) {
        let snapshot = self.meshes.snapshot();
        if snapshot.total_triangles == 0 {
            return;
        }

        let camera = Arc::clone(&self.camera);
        let Some(frame_lock) = camera.acquire_frame() else {
            log::debug!("[RetextureEngine::project_camera_texture] no camera frame this tick");
            return;
        };
        let Some(camera_view) = frame_lock.texture_view() else {
            return;
        };

        self.queue.write_buffer(
            &self.camera_uniform,
            0,
            bytemuck::bytes_of(&CameraUniform {
                view_projection: self.camera.view_projection().into(),
            }),
        );
        let params = layout_params(&snapshot);
        self.write_layout_params(&params);

        let projection_globals = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Projection Globals Bind Group"),
            layout: &self.pipelines.projection_globals_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.camera_uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(camera_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.pipelines.atlas_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&self.camera_depth_view),
                },
            ],
        });

        let entities = self.meshes.entities();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Camera Projection Encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Depth Prepass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.camera_depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines.depth_prepass);
            pass.set_bind_group(1, &self.camera_bind_group, &[]);
            entities.draw_with(
                |_, _, _| true,
                |_, buffers| {
                    pass.set_bind_group(0, &buffers.bind_group, &[]);
                    pass.draw(0..buffers.index_count, 0..1);
                },
            );
        }
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Camera Projection Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.atlas.current().color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines.projection);
            pass.set_bind_group(2, &projection_globals, &[]);

            let param_buf = &self.layout_params_buf;
            entities.draw_with(
                |_, _, _| true,
                |index, buffers| {
                    pass.set_bind_group(0, &buffers.bind_group, &[]);
                    pass.set_bind_group(1, &param_buf.bind_group, &[ParamBuffer::offset_of(index)]);
                    pass.draw(0..buffers.index_count, 0..1);
                },
            );
        }
        drop(entities);
        self.queue.submit(std::iter::once(encoder.finish()));
        drop(frame_lock);
    }

    /// Step 3: apply the pending scan, repack the atlas into the other
    /// buffer carrying painted texels forward, and swap.
    fn update_packing(&mut self, pending: PendingRepack) {
        self.meshes.apply_scan(&pending.scan);
        self.meshes
            .upload_dirty(&self.device, &self.pipelines.mesh_layout);

        let new_snapshot = self.meshes.snapshot();
        let params = migration_params(&pending.snapshot, &new_snapshot);
        log::info!(
            "[RetextureEngine::update_packing] migrating atlas: {} -> {} triangles (side {} -> {})",
            pending.snapshot.old_total,
            new_snapshot.total_triangles,
            grid_side(pending.snapshot.old_total),
            grid_side(new_snapshot.total_triangles),
        );

        self.migration_params_buf.ensure_capacity(
            &self.device,
            &self.pipelines.param_layout,
            params.len().max(1),
        );
        for (index, draw) in params.iter().enumerate() {
            if let Some(uniform) = &draw.uniform {
                self.migration_params_buf
                    .write(&self.queue, index, bytemuck::bytes_of(uniform));
            }
        }

        let entities = self.meshes.entities();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Atlas Migrate Encoder"),
            });
        {
            let next = self.atlas.next();
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Atlas Migrate Pass"),
                color_attachments: &[
                    Some(wgpu::RenderPassColorAttachment {
                        view: &next.color_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    }),
                    Some(wgpu::RenderPassColorAttachment {
                        view: &next.quality_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    }),
                ],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipelines.migrate);
            pass.set_bind_group(2, &self.migrate_globals[self.atlas.current_index()], &[]);

            let param_buf = &self.migration_params_buf;
            entities.draw_with(
                |index, _, _| params[index].uniform.is_some(),
                |index, buffers| {
                    pass.set_bind_group(0, &buffers.bind_group, &[]);
                    pass.set_bind_group(1, &param_buf.bind_group, &[ParamBuffer::offset_of(index)]);
                    pass.draw(0..buffers.index_count, 0..1);
                },
            );
        }
        drop(entities);
        self.queue.submit(std::iter::once(encoder.finish()));
        self.atlas.swap();
    }

    /// Write the per-entity layout blocks for a render or projection pass.
    fn write_layout_params(&mut self, params: &[LayoutDraw]) {
        self.layout_params_buf.ensure_capacity(
            &self.device,
            &self.pipelines.param_layout,
            params.len().max(1),
        );
        for (index, draw) in params.iter().enumerate() {
            self.layout_params_buf
                .write(&self.queue, index, bytemuck::bytes_of(&draw.uniform));
        }
    }
}
