//! Engine-wide calibration constants.
//!
//! Values here are defaults; anything that is a tuning knob rather than a
//! structural property is also exposed through `RetextureConfig`.

/// Atlas layout constants
pub mod atlas {
    /// Working resolution of each atlas surface, in texels (square).
    pub const RESOLUTION: u32 = 4096;

    /// Border inset around each packed triangle, in texels at the working
    /// resolution. Keeps bilinear taps inside a triangle's own cell half.
    pub const BORDER_TEXELS: f32 = 1.0;

    /// Triangles packed per grid cell (one on each diagonal half).
    pub const TRIANGLES_PER_CELL: u32 = 2;
}

/// Physical camera constants
pub mod camera {
    /// Default camera frame width in pixels.
    pub const FRAME_WIDTH: u32 = 1408;

    /// Default camera frame height in pixels.
    pub const FRAME_HEIGHT: u32 = 792;

    /// Near clip plane for the camera projection depth fixup, in meters.
    pub const NEAR_PLANE: f32 = 0.05;

    /// Far clip plane for the camera projection depth fixup, in meters.
    pub const FAR_PLANE: f32 = 10.0;

    /// Minimum cosine between consecutive frames' view directions for a
    /// frame to count as stable.
    pub const MINIMUM_STABLE_COSINE: f32 = 0.9999;

    /// Bounded wait for the cross-thread frame texture, in milliseconds.
    /// Timing out means "no frame this tick", never an error.
    pub const LOCK_TIMEOUT_MS: u64 = 100;
}

/// Projection-pass constants
pub mod projection {
    /// Maximum NDC depth difference between a projected fragment and the
    /// depth pre-pass before the fragment counts as occluded.
    pub const DEPTH_TOLERANCE: f32 = 0.005;
}
