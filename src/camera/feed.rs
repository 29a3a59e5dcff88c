//! Cross-thread camera frame handoff.
//!
//! The capture side publishes frames (GPU texture + pose) from its own
//! thread; the render thread acquires the latest frame with a bounded wait.
//! Timing out on either side means that frame, or that tick's projection,
//! is skipped - never an error. Frames whose pose fails the stability check
//! are discarded at publish time unless unstable frames are allowed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cgmath::{Matrix4, SquareMatrix};
use parking_lot::{Mutex, MutexGuard};

use crate::camera::stability::view_is_stable;
use crate::constants::camera::{FAR_PLANE, NEAR_PLANE};

/// One published camera frame: the shared texture and a sampling view of it.
pub struct CameraFrame {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

struct PoseState {
    view_matrix: Matrix4<f32>,
    projection: Matrix4<f32>,
    last_view: Matrix4<f32>,
    stable: bool,
    ready: bool,
}

/// Shared camera feed between a capture thread and the render thread.
pub struct SharedCameraFeed {
    frame: Mutex<Option<CameraFrame>>,
    pose: Mutex<PoseState>,
    frame_updated: AtomicBool,
    width: u32,
    height: u32,
    minimum_cosine: f32,
    allow_unstable_frames: bool,
    lock_timeout: Duration,
}

impl SharedCameraFeed {
    pub fn new(
        width: u32,
        height: u32,
        minimum_cosine: f32,
        allow_unstable_frames: bool,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            frame: Mutex::new(None),
            pose: Mutex::new(PoseState {
                view_matrix: Matrix4::identity(),
                projection: Matrix4::identity(),
                last_view: Matrix4::from_scale(0.0),
                stable: false,
                ready: false,
            }),
            frame_updated: AtomicBool::new(false),
            width,
            height,
            minimum_cosine,
            allow_unstable_frames,
            lock_timeout,
        }
    }

    /// Feed sized and tuned from the engine configuration.
    pub fn from_config(config: &crate::RetextureConfig) -> Self {
        Self::new(
            config.camera_width,
            config.camera_height,
            config.stability_min_cosine,
            config.allow_unstable_frames,
            config.camera_lock_timeout(),
        )
    }

    /// Publish a new frame from the capture thread.
    ///
    /// The projection's depth planes are normalized to the engine's [0, 1]
    /// convention. Unstable frames update pose tracking but publish nothing;
    /// a timed-out texture lock drops the frame.
    pub fn publish_frame(
        &self,
        texture: wgpu::Texture,
        view_matrix: Matrix4<f32>,
        projection: Matrix4<f32>,
    ) {
        let stable;
        {
            let mut pose = self.pose.lock();
            stable = view_is_stable(&pose.last_view, &view_matrix, self.minimum_cosine);
            pose.stable = stable;
            pose.last_view = view_matrix;
            if self.allow_unstable_frames || stable {
                pose.view_matrix = view_matrix;
                pose.projection = normalize_projection_depth(projection);
                pose.ready = true;
            }
        }
        if !(self.allow_unstable_frames || stable) {
            log::trace!("[SharedCameraFeed::publish_frame] unstable frame discarded");
            return;
        }

        let Some(mut frame) = self.frame.try_lock_for(self.lock_timeout) else {
            log::debug!("[SharedCameraFeed::publish_frame] texture lock timed out, frame dropped");
            return;
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        *frame = Some(CameraFrame { texture, view });
        drop(frame);
        self.frame_updated.store(true, Ordering::Release);
    }

    /// Acquire the latest frame with a bounded wait. `None` when the lock
    /// times out or no frame has been published yet.
    pub fn acquire_frame(&self) -> Option<CameraFrameLock<'_>> {
        let guard = self.frame.try_lock_for(self.lock_timeout)?;
        if guard.is_none() {
            return None;
        }
        Some(CameraFrameLock { guard })
    }

    /// Reference frame to camera clip space, with normalized depth planes.
    pub fn view_projection(&self) -> Matrix4<f32> {
        let pose = self.pose.lock();
        pose.projection * pose.view_matrix
    }

    /// True once a stable frame and pose have been published.
    pub fn is_ready(&self) -> bool {
        self.pose.lock().ready
    }

    /// Whether the most recently delivered pose passed the stability check.
    pub fn is_stable(&self) -> bool {
        self.pose.lock().stable
    }

    /// Consume the frame-updated signal; true at most once per publish.
    pub fn take_frame_updated(&self) -> bool {
        self.frame_updated.swap(false, Ordering::AcqRel)
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Holds the frame lock for the duration of a projection pass; dropping it
/// releases the texture back to the capture thread.
pub struct CameraFrameLock<'a> {
    guard: MutexGuard<'a, Option<CameraFrame>>,
}

impl CameraFrameLock<'_> {
    pub fn texture_view(&self) -> Option<&wgpu::TextureView> {
        self.guard.as_ref().map(|frame| &frame.view)
    }
}

/// Force a projection matrix's depth planes to the engine's [0, 1]
/// convention with the configured near/far distances, leaving the focal
/// terms untouched. Mirrors the clip-plane fixup the capture pipeline's
/// projection needs before it can be depth-compared.
pub fn normalize_projection_depth(mut projection: Matrix4<f32>) -> Matrix4<f32> {
    projection.z.z = FAR_PLANE / (NEAR_PLANE - FAR_PLANE);
    projection.w.z = NEAR_PLANE * FAR_PLANE / (NEAR_PLANE - FAR_PLANE);
    projection
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Vector4};

    #[test]
    fn normalized_depth_spans_zero_to_one() {
        let projection =
            normalize_projection_depth(cgmath::perspective(Deg(60.0), 16.0 / 9.0, 0.01, 100.0));

        let near = projection * Vector4::new(0.0, 0.0, -NEAR_PLANE, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);

        let far = projection * Vector4::new(0.0, 0.0, -FAR_PLANE, 1.0);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }
}
