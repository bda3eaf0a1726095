// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detector and loop configuration.
//!
//! [`DetectorConfig`] controls how the pose model runs (mode, how many bodies,
//! thresholds). [`LoopConfig`] controls the loop driver's cadence and the
//! still-image canvas size. Both use a builder pattern.

use std::time::Duration;

use crate::mode::RunningMode;

/// Fixed canvas height for still images, in pixels.
pub const DISPLAY_HEIGHT: u32 = 480;

/// Default refresh interval of the video loop (~60 Hz).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_micros(16_667);

/// Longest refresh interval [`LoopConfig::with_fps`] will produce.
pub const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Configuration for the pose detector.
///
/// # Example
///
/// ```rust
/// use pose_overlay::{DetectorConfig, RunningMode};
///
/// let config = DetectorConfig::new()
///     .with_running_mode(RunningMode::Video)
///     .with_num_poses(1)
///     .with_confidence(0.5);
/// ```
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Image or video mode.
    pub running_mode: RunningMode,
    /// Maximum number of bodies returned per call.
    pub num_poses: usize,
    /// Minimum body detection score (0.0 to 1.0).
    pub min_pose_confidence: f32,
    /// Landmarks below this visibility are reported with visibility clamped to 0.
    pub min_landmark_confidence: f32,
    /// `IoU` threshold used to merge overlapping body candidates.
    pub iou_threshold: f32,
    /// Explicit model input size (height, width). `None` uses the model's own.
    pub imgsz: Option<(usize, usize)>,
    /// Number of intra-op threads. `0` lets ONNX Runtime decide.
    pub num_threads: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            running_mode: RunningMode::Image,
            num_poses: 1,
            min_pose_confidence: 0.5,
            min_landmark_confidence: 0.0,
            iou_threshold: 0.45,
            imgsz: None,
            num_threads: 0,
        }
    }
}

impl DetectorConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the running mode.
    #[must_use]
    pub const fn with_running_mode(mut self, mode: RunningMode) -> Self {
        self.running_mode = mode;
        self
    }

    /// Set the maximum number of bodies returned per call.
    ///
    /// Values below 1 are raised to 1.
    #[must_use]
    pub fn with_num_poses(mut self, num_poses: usize) -> Self {
        self.num_poses = num_poses.max(1);
        self
    }

    /// Set the minimum body detection score.
    #[must_use]
    pub const fn with_confidence(mut self, threshold: f32) -> Self {
        self.min_pose_confidence = threshold;
        self
    }

    /// Set the minimum landmark visibility.
    #[must_use]
    pub const fn with_landmark_confidence(mut self, threshold: f32) -> Self {
        self.min_landmark_confidence = threshold;
        self
    }

    /// Set the `IoU` threshold used when merging body candidates.
    #[must_use]
    pub const fn with_iou(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Set the model input size.
    #[must_use]
    pub const fn with_imgsz(mut self, height: usize, width: usize) -> Self {
        self.imgsz = Some((height, width));
        self
    }

    /// Set the number of intra-op threads.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }
}

/// Configuration for the loop driver and canvas sizing.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Time between refresh ticks of the video loop.
    pub refresh_interval: Duration,
    /// Stop the video loop after this many cycles. `None` runs until cancelled
    /// or the stream ends.
    pub max_cycles: Option<usize>,
    /// Canvas height used for still images.
    pub display_height: u32,
    /// Draw the video frame under the overlay instead of a blank canvas.
    pub composite: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            max_cycles: None,
            display_height: DISPLAY_HEIGHT,
            composite: false,
        }
    }
}

impl LoopConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the refresh interval.
    #[must_use]
    pub const fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the refresh rate in frames per second.
    ///
    /// A rate of zero (or any non-positive or non-finite rate) disables pacing.
    /// Very low rates are capped at [`MAX_REFRESH_INTERVAL`].
    #[must_use]
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.refresh_interval = if fps.is_finite() && fps > 0.0 {
            Duration::try_from_secs_f64(1.0 / fps)
                .map_or(MAX_REFRESH_INTERVAL, |interval| interval.min(MAX_REFRESH_INTERVAL))
        } else {
            Duration::ZERO
        };
        self
    }

    /// Limit the number of video cycles.
    #[must_use]
    pub const fn with_max_cycles(mut self, max_cycles: usize) -> Self {
        self.max_cycles = Some(max_cycles);
        self
    }

    /// Set the still-image canvas height.
    #[must_use]
    pub const fn with_display_height(mut self, height: u32) -> Self {
        self.display_height = height;
        self
    }

    /// Draw video frames beneath the overlay.
    #[must_use]
    pub const fn with_composite(mut self, composite: bool) -> Self {
        self.composite = composite;
        self
    }
}
