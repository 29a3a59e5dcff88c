//! Crate error type.
//!
//! Transient conditions (no camera frame, lock timeout, mesh not ready) are
//! not errors; they are handled locally by skipping the dependent work for a
//! tick. Only configuration problems and export I/O surface here.

use std::path::PathBuf;

/// Result alias for retexture-engine operations.
pub type RetexResult<T> = Result<T, RetexError>;

#[derive(Debug, thiserror::Error)]
pub enum RetexError {
    #[error("invalid config: {field} ({reason})")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("atlas readback failed: {0}")]
    Readback(String),

    #[error("export failed for {path}: {source}")]
    ExportIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image encode error: {0}")]
    ImageEncode(#[from] image::ImageError),
}

impl RetexError {
    pub(crate) fn export_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RetexError::ExportIo {
            path: path.into(),
            source,
        }
    }
}
