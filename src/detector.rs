// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detector adapter: the facade the pipeline talks to instead of the model.
//!
//! The adapter owns one [`PoseModel`] backend, enforces its running mode, and
//! guarantees that video-mode timestamps reach the backend strictly increasing.
//! A backend may be loaded on a background thread; until it is ready every
//! detection call is skipped (`Ok(None)`) rather than failing.

use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Instant;

use image::DynamicImage;

use crate::config::DetectorConfig;
use crate::error::{PoseError, Result};
use crate::landmarks::DetectionResult;
use crate::mode::RunningMode;
use crate::{error, verbose};

/// A pose model backend.
///
/// Implementations return landmarks in pixels of the frame they were given.
pub trait PoseModel: Send {
    /// Detect poses in a single still frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to run.
    fn detect(&mut self, frame: &DynamicImage, config: &DetectorConfig) -> Result<DetectionResult>;

    /// Detect poses in a video frame issued at `timestamp_ms`.
    ///
    /// The adapter only calls this with strictly increasing timestamps.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to run.
    fn detect_for_video(
        &mut self,
        frame: &DynamicImage,
        timestamp_ms: u64,
        config: &DetectorConfig,
    ) -> Result<DetectionResult> {
        self.detect(frame, config)
            .map(|result| result.with_timestamp(timestamp_ms))
    }

    /// Landmark index pairs that form the skeleton.
    fn connections(&self) -> &'static [[usize; 2]];

    /// Human-readable backend name for logs.
    fn name(&self) -> String {
        "pose model".to_string()
    }
}

/// Load state of the backend.
enum ModelSlot {
    Pending(Receiver<Result<Box<dyn PoseModel>>>),
    Ready(Box<dyn PoseModel>),
    Failed(String),
}

/// Facade over a [`PoseModel`] with readiness and timestamp guards.
pub struct DetectorAdapter {
    slot: ModelSlot,
    config: DetectorConfig,
    clock: VideoClock,
    last_timestamp: Option<u64>,
}

impl DetectorAdapter {
    /// Wrap an already loaded backend.
    #[must_use]
    pub fn new(model: Box<dyn PoseModel>, config: DetectorConfig) -> Self {
        Self {
            slot: ModelSlot::Ready(model),
            config,
            clock: VideoClock::new(),
            last_timestamp: None,
        }
    }

    /// Load the backend on a background thread.
    ///
    /// The adapter is usable immediately; calls made before the loader finishes
    /// are skipped.
    pub fn load_in_background<F>(config: DetectorConfig, loader: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn PoseModel>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            // The adapter may have been dropped before loading finished.
            let _ = tx.send(loader());
        });

        Self {
            slot: ModelSlot::Pending(rx),
            config,
            clock: VideoClock::new(),
            last_timestamp: None,
        }
    }

    /// Move a finished background load into place. Returns whether the
    /// backend is ready.
    fn poll(&mut self) -> bool {
        let ModelSlot::Pending(rx) = &self.slot else {
            return matches!(self.slot, ModelSlot::Ready(_));
        };
        match rx.try_recv() {
            Ok(loaded) => self.settle(loaded),
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.settle(Err(PoseError::ModelLoad("loader thread exited".to_string())))
            }
        }
    }

    fn settle(&mut self, loaded: Result<Box<dyn PoseModel>>) -> bool {
        match loaded {
            Ok(model) => {
                verbose!("{} ready ({} mode)", model.name(), self.config.running_mode);
                self.slot = ModelSlot::Ready(model);
                true
            }
            Err(e) => {
                error!("Failed to load pose model: {e}");
                let msg = match e {
                    PoseError::ModelLoad(msg) => msg,
                    other => other.to_string(),
                };
                self.slot = ModelSlot::Failed(msg);
                false
            }
        }
    }

    /// Check whether the backend has finished loading.
    pub fn is_ready(&mut self) -> bool {
        self.poll()
    }

    /// Block until the backend is loaded.
    ///
    /// # Errors
    ///
    /// Returns the loader's error if loading failed.
    pub fn wait_ready(&mut self) -> Result<()> {
        if let ModelSlot::Pending(rx) = &self.slot {
            let loaded = rx
                .recv()
                .unwrap_or_else(|_| Err(PoseError::ModelLoad("loader thread exited".to_string())));
            self.settle(loaded);
        }
        match &self.slot {
            ModelSlot::Ready(_) => Ok(()),
            ModelSlot::Failed(msg) => Err(PoseError::ModelLoad(msg.clone())),
            ModelSlot::Pending(_) => Err(PoseError::ModelLoad("model still loading".to_string())),
        }
    }

    /// The loader's error message, if background loading failed.
    #[must_use]
    pub fn load_error(&self) -> Option<&str> {
        match &self.slot {
            ModelSlot::Failed(msg) => Some(msg),
            _ => None,
        }
    }

    /// Running mode the adapter was configured with.
    #[must_use]
    pub const fn running_mode(&self) -> RunningMode {
        self.config.running_mode
    }

    /// Detector configuration.
    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Last timestamp forwarded to the backend.
    #[must_use]
    pub const fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    /// Next timestamp for [`detect_for_video`](Self::detect_for_video).
    ///
    /// Read from the adapter's own [`VideoClock`] and always greater than the
    /// last timestamp forwarded to the backend.
    pub fn next_timestamp(&mut self) -> u64 {
        let now = self.clock.now_ms();
        match self.last_timestamp {
            Some(last) if now <= last => last + 1,
            _ => now,
        }
    }

    /// Skeleton topology of the backend. Empty while the backend is not ready.
    #[must_use]
    pub fn connections(&self) -> &'static [[usize; 2]] {
        match &self.slot {
            ModelSlot::Ready(model) => model.connections(),
            _ => &[],
        }
    }

    fn check_mode(&self, requested: RunningMode) -> Result<()> {
        if self.config.running_mode == requested {
            Ok(())
        } else {
            Err(PoseError::ModeMismatch {
                configured: self.config.running_mode,
                requested,
            })
        }
    }

    /// Detect poses in a still frame (image mode).
    ///
    /// Returns `Ok(None)` if the backend is not ready yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter runs in video mode or the backend fails.
    pub fn detect(&mut self, frame: &DynamicImage) -> Result<Option<DetectionResult>> {
        self.check_mode(RunningMode::Image)?;
        if !self.poll() {
            return Ok(None);
        }
        let ModelSlot::Ready(model) = &mut self.slot else {
            return Ok(None);
        };
        model.detect(frame, &self.config).map(Some)
    }

    /// Detect poses in a video frame (video mode).
    ///
    /// Returns `Ok(None)` if the backend is not ready yet; the timestamp is
    /// not consumed in that case.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter runs in image mode, the timestamp is not
    /// strictly greater than the previous one, or the backend fails.
    pub fn detect_for_video(
        &mut self,
        frame: &DynamicImage,
        timestamp_ms: u64,
    ) -> Result<Option<DetectionResult>> {
        self.check_mode(RunningMode::Video)?;
        if let Some(previous) = self.last_timestamp
            && timestamp_ms <= previous
        {
            return Err(PoseError::NonMonotonicTimestamp {
                previous,
                current: timestamp_ms,
            });
        }
        if !self.poll() {
            return Ok(None);
        }
        let ModelSlot::Ready(model) = &mut self.slot else {
            return Ok(None);
        };
        self.last_timestamp = Some(timestamp_ms);
        model
            .detect_for_video(frame, timestamp_ms, &self.config)
            .map(Some)
    }
}

impl std::fmt::Debug for DetectorAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.slot {
            ModelSlot::Pending(_) => "pending",
            ModelSlot::Ready(_) => "ready",
            ModelSlot::Failed(_) => "failed",
        };
        f.debug_struct("DetectorAdapter")
            .field("state", &state)
            .field("running_mode", &self.config.running_mode)
            .field("last_timestamp", &self.last_timestamp)
            .finish()
    }
}

/// Monotonic millisecond clock for video-mode timestamps.
///
/// Reports time elapsed since creation. If the underlying clock has not
/// advanced by a full millisecond since the last reading, the previous value is
/// bumped by one so readings are strictly increasing.
#[derive(Debug, Clone)]
pub struct VideoClock {
    origin: Instant,
    last: Option<u64>,
}

impl Default for VideoClock {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoClock {
    /// Start a clock at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last: None,
        }
    }

    /// Next timestamp in milliseconds.
    pub fn now_ms(&mut self) -> u64 {
        let elapsed = u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        let ts = match self.last {
            Some(last) if elapsed <= last => last.saturating_add(1),
            _ => elapsed,
        };
        self.last = Some(ts);
        ts
    }
}
