//! Incremental environment retexturing engine.
//!
//! Maintains a changing collection of scanned surface meshes, packs their
//! triangles into a shared square texture atlas, projects live camera
//! imagery onto the atlas with depth-tested visibility, and re-renders the
//! textured surfaces. Atlas layouts are recomputed whenever the mesh set
//! changes; previously painted texels are migrated from the old layout to
//! the new one across a double-buffered atlas pair.
//!
//! The embedder owns the GPU device, the display surface, and the sensor
//! plumbing; the engine consumes `Arc<wgpu::Device>` / `Arc<wgpu::Queue>`,
//! a [`SharedCameraFeed`] the capture side publishes frames into, and scan
//! snapshots delivered through [`ScanInbox`].

pub mod atlas;
pub mod camera;
pub mod constants;
pub mod engine;
pub mod error;
pub mod export;
pub mod mesh;
pub mod scan;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use camera::SharedCameraFeed;
pub use engine::{FrameInput, RetextureEngine};
pub use error::{RetexError, RetexResult};
pub use mesh::{MeshSet, RawSurface, RegionId, RegionScan};
pub use scan::ScanInbox;

// Re-export wgpu so embedders drive the engine against the same version.
pub use wgpu;

/// Engine configuration. Structural properties (atlas sizing) and the
/// calibration knobs the retexturing heuristics depend on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetextureConfig {
    /// Square atlas resolution in texels.
    pub atlas_resolution: u32,

    /// Border inset per packed triangle, in texels.
    pub atlas_border_texels: f32,

    /// Camera frame width in pixels.
    pub camera_width: u32,

    /// Camera frame height in pixels.
    pub camera_height: u32,

    /// NDC depth tolerance for the projection pass occlusion test.
    pub depth_tolerance: f32,

    /// Minimum view-direction cosine between consecutive camera frames for
    /// a frame to be trusted.
    pub stability_min_cosine: f32,

    /// Accept frames that fail the stability check.
    pub allow_unstable_frames: bool,

    /// Bounded wait for the cross-thread camera texture, in milliseconds.
    pub camera_lock_timeout_ms: u64,
}

impl Default for RetextureConfig {
    fn default() -> Self {
        Self {
            atlas_resolution: constants::atlas::RESOLUTION,
            atlas_border_texels: constants::atlas::BORDER_TEXELS,
            camera_width: constants::camera::FRAME_WIDTH,
            camera_height: constants::camera::FRAME_HEIGHT,
            depth_tolerance: constants::projection::DEPTH_TOLERANCE,
            stability_min_cosine: constants::camera::MINIMUM_STABLE_COSINE,
            allow_unstable_frames: false,
            camera_lock_timeout_ms: constants::camera::LOCK_TIMEOUT_MS,
        }
    }
}

impl RetextureConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> RetexResult<()> {
        if self.atlas_resolution == 0 || self.atlas_resolution > 16384 {
            return Err(RetexError::InvalidConfig {
                field: "atlas_resolution",
                reason: format!("{} not in 1..=16384", self.atlas_resolution),
            });
        }
        if !(0.0..=64.0).contains(&self.atlas_border_texels) {
            return Err(RetexError::InvalidConfig {
                field: "atlas_border_texels",
                reason: format!("{} not in 0..=64", self.atlas_border_texels),
            });
        }
        if self.camera_width == 0 || self.camera_height == 0 {
            return Err(RetexError::InvalidConfig {
                field: "camera_width/camera_height",
                reason: "camera frame dimensions cannot be 0".into(),
            });
        }
        if !(self.depth_tolerance > 0.0 && self.depth_tolerance < 1.0) {
            return Err(RetexError::InvalidConfig {
                field: "depth_tolerance",
                reason: format!("{} not in (0, 1)", self.depth_tolerance),
            });
        }
        if !(self.stability_min_cosine > 0.0 && self.stability_min_cosine <= 1.0) {
            return Err(RetexError::InvalidConfig {
                field: "stability_min_cosine",
                reason: format!("{} not in (0, 1]", self.stability_min_cosine),
            });
        }
        if self.camera_lock_timeout_ms == 0 || self.camera_lock_timeout_ms > 10_000 {
            return Err(RetexError::InvalidConfig {
                field: "camera_lock_timeout_ms",
                reason: format!("{} not in 1..=10000", self.camera_lock_timeout_ms),
            });
        }
        Ok(())
    }

    /// Parse and validate a TOML configuration.
    pub fn from_toml_str(text: &str) -> RetexResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn camera_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.camera_lock_timeout_ms)
    }
}

/// Opt-in logging setup for binaries and tests; respects `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(RetextureConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let config = RetextureConfig {
            atlas_resolution: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_cosine_is_rejected() {
        let config = RetextureConfig {
            stability_min_cosine: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = RetextureConfig::from_toml_str(
            "atlas_resolution = 2048\nstability_min_cosine = 0.999\n",
        )
        .expect("valid config");
        assert_eq!(config.atlas_resolution, 2048);
        assert_eq!(config.stability_min_cosine, 0.999);
        // Unset fields keep their defaults.
        assert_eq!(config.camera_width, constants::camera::FRAME_WIDTH);
    }

    #[test]
    fn invalid_toml_values_are_rejected() {
        assert!(RetextureConfig::from_toml_str("atlas_resolution = 0\n").is_err());
        assert!(RetextureConfig::from_toml_str("atlas_resolution = \"big\"\n").is_err());
    }
}
