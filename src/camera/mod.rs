//! Live color camera intake.
//!
//! The camera itself is an external collaborator; this module is the
//! render-thread-facing seam: a cross-thread frame handoff with a bounded
//! acquire, the pose bookkeeping, and the stability heuristic that discards
//! frames delivered with a stale pose.

pub mod feed;
pub mod stability;

pub use feed::{CameraFrame, CameraFrameLock, SharedCameraFeed};
pub use stability::view_is_stable;
