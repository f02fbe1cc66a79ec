use thiserror::Error;

/// Failures from the raster side of the engine. Everything else in the
/// editor degrades silently instead of erroring.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot allocate a {width}x{height} pixmap")]
    PixmapAllocation { width: u32, height: u32 },

    #[error("pixel buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("cannot encode PNG: {0}")]
    Encode(#[from] image::ImageError),

    #[error("a flatten is already running")]
    FlattenBusy,

    #[error("cannot start flatten worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("flatten worker stopped before returning a result")]
    WorkerGone,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot resolve a configuration directory")]
    NoConfigDir,

    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type RenderResult<T> = Result<T, RenderError>;
