// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Running modes for the pose detector.
//!
//! A detector instance is configured for exactly one mode. Image mode handles
//! unrelated still frames; video mode expects consecutive frames of one stream
//! with strictly increasing timestamps.

use std::fmt;
use std::str::FromStr;

/// Detector running mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunningMode {
    /// Independent still images, no timestamps.
    #[default]
    Image,
    /// Consecutive frames of a stream, each with a strictly increasing timestamp.
    Video,
}

impl RunningMode {
    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
        }
    }

    /// Returns whether calls in this mode carry a timestamp.
    #[must_use]
    pub const fn needs_timestamp(&self) -> bool {
        matches!(self, Self::Video)
    }
}

impl fmt::Display for RunningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunningMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" | "still" => Ok(Self::Image),
            "video" | "stream" | "camera" => Ok(Self::Video),
            _ => Err(ModeParseError(s.to_string())),
        }
    }
}

/// Error returned when parsing an invalid running mode string.
#[derive(Debug, Clone)]
pub struct ModeParseError(String);

impl fmt::Display for ModeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid running mode '{}', expected one of: image, video",
            self.0
        )
    }
}

impl std::error::Error for ModeParseError {}
