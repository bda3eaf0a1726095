// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the pose overlay pipeline.

use std::fmt;

use crate::mode::RunningMode;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PoseError>;

/// Main error type for the pose overlay pipeline.
#[derive(Debug)]
pub enum PoseError {
    /// Error loading the pose model.
    ModelLoad(String),
    /// Error while the model was running.
    Inference(String),
    /// Error decoding or encoding images.
    Image(String),
    /// Invalid configuration provided.
    Config(String),
    /// Wrapped `std::io::Error`.
    Io(std::io::Error),
    /// Error fetching the model asset.
    Download(String),
    /// Video/stream capture error.
    Video(String),
    /// Window/visualizer error.
    Visualizer(String),
    /// A detection call that does not match the adapter's running mode.
    ModeMismatch {
        /// Mode the adapter was configured with.
        configured: RunningMode,
        /// Mode the caller asked for.
        requested: RunningMode,
    },
    /// A video timestamp that is not strictly greater than the previous one.
    NonMonotonicTimestamp {
        /// Last timestamp accepted by the adapter.
        previous: u64,
        /// Rejected timestamp.
        current: u64,
    },
    /// Feature not enabled at compile time.
    FeatureNotEnabled(String),
}

impl fmt::Display for PoseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelLoad(msg) => write!(f, "Model load error: {msg}"),
            Self::Inference(msg) => write!(f, "Inference error: {msg}"),
            Self::Image(msg) => write!(f, "Image error: {msg}"),
            Self::Config(msg) => write!(f, "Config error: {msg}"),
            Self::Io(err) => write!(f, "IO error: {err}"),
            Self::Download(msg) => write!(f, "Download error: {msg}"),
            Self::Video(msg) => write!(f, "Video error: {msg}"),
            Self::Visualizer(msg) => write!(f, "Visualizer error: {msg}"),
            Self::ModeMismatch {
                configured,
                requested,
            } => write!(
                f,
                "Mode mismatch: detector runs in {configured} mode, called with {requested}"
            ),
            Self::NonMonotonicTimestamp { previous, current } => write!(
                f,
                "Non-monotonic timestamp: {current}ms is not after {previous}ms"
            ),
            Self::FeatureNotEnabled(msg) => write!(f, "Feature not enabled: {msg}"),
        }
    }
}

impl std::error::Error for PoseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PoseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<image::ImageError> for PoseError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}
