// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Application entry points.
//!
//! [`App::start_video`] runs the video loop on its own thread and hands back an
//! [`AppHandle`]; dropping the handle cancels the loop and waits for it.
//! [`App::image_pipeline`] builds the still-image pipeline.

use std::thread::{self, JoinHandle};

use crate::config::LoopConfig;
use crate::detector::DetectorAdapter;
use crate::driver::{CancelToken, FrameSink, ImagePipeline, LoopSummary, VideoLoop};
use crate::error::{PoseError, Result};
use crate::render::Renderer;
use crate::source::FrameSource;

/// Entry points for the two pipelines.
#[derive(Debug, Clone, Copy, Default)]
pub struct App;

impl App {
    /// Start the video loop on a background thread.
    ///
    /// The loop runs until the stream ends, the sink stops it, or the returned
    /// handle is stopped or dropped.
    pub fn start_video<S, K>(
        mut source: S,
        mut adapter: DetectorAdapter,
        mut renderer: Renderer,
        mut sink: K,
        config: LoopConfig,
    ) -> AppHandle
    where
        S: FrameSource + Send + 'static,
        K: FrameSink + Send + 'static,
    {
        let token = CancelToken::new();
        let loop_token = token.clone();
        let worker = thread::spawn(move || {
            VideoLoop::new(config).run(&mut source, &mut adapter, &mut renderer, &mut sink, &loop_token)
        });

        AppHandle {
            token,
            worker: Some(worker),
        }
    }

    /// Build the still-image pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter is not in image mode.
    pub fn image_pipeline(
        adapter: DetectorAdapter,
        renderer: Renderer,
        config: &LoopConfig,
    ) -> Result<ImagePipeline> {
        ImagePipeline::new(adapter, renderer, config)
    }
}

/// Handle to a running video loop.
#[derive(Debug)]
pub struct AppHandle {
    token: CancelToken,
    worker: Option<JoinHandle<Result<LoopSummary>>>,
}

impl AppHandle {
    /// Token that cancels this loop; clone it into signal handlers.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Request the loop to stop at the top of its next cycle.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether the loop thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the loop to return.
    ///
    /// # Errors
    ///
    /// Returns the loop's error, or an error if its thread panicked.
    pub fn join(mut self) -> Result<LoopSummary> {
        self.wait()
    }

    fn wait(&mut self) -> Result<LoopSummary> {
        match self.worker.take() {
            Some(worker) => worker
                .join()
                .map_err(|_| PoseError::Video("Video loop thread panicked".to_string()))?,
            None => Ok(LoopSummary::default()),
        }
    }
}

impl Drop for AppHandle {
    fn drop(&mut self) {
        self.token.cancel();
        let _ = self.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::detector::PoseModel;
    use crate::landmarks::{DetectionResult, Speed};
    use crate::mode::RunningMode;
    use crate::render::Canvas;
    use crate::source::Frame;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct EmptyModel;

    impl PoseModel for EmptyModel {
        fn detect(&mut self, frame: &Frame, _config: &DetectorConfig) -> Result<DetectionResult> {
            Ok(DetectionResult::new(Vec::new(), (frame.width(), frame.height()), Speed::default()))
        }

        fn connections(&self) -> &'static [[usize; 2]] {
            &[]
        }
    }

    /// Endless camera stand-in.
    struct Endless;

    impl FrameSource for Endless {
        fn next_frame(&mut self) -> Option<Result<Frame>> {
            Some(Ok(DynamicImage::new_rgb8(16, 16)))
        }
    }

    fn video_adapter() -> DetectorAdapter {
        DetectorAdapter::new(
            Box::new(EmptyModel),
            DetectorConfig::new().with_running_mode(RunningMode::Video),
        )
    }

    #[test]
    fn test_stop_ends_endless_loop() {
        let frames = Arc::new(AtomicUsize::new(0));
        let counter = frames.clone();
        let handle = App::start_video(
            Endless,
            video_adapter(),
            Renderer::default(),
            move |_: &Canvas, _: &DetectionResult| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            },
            LoopConfig::new().with_fps(200.0),
        );

        std::thread::sleep(Duration::from_millis(50));
        handle.stop();
        let summary = handle.join().unwrap();
        assert!(summary.cycles > 0);
        assert_eq!(summary.cycles, frames.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_cancels_loop() {
        let frames = Arc::new(AtomicUsize::new(0));
        let counter = frames.clone();
        let handle = App::start_video(
            Endless,
            video_adapter(),
            Renderer::default(),
            move |_: &Canvas, _: &DetectionResult| {
                counter.fetch_add(1, Ordering::SeqCst);
                true
            },
            LoopConfig::new().with_fps(200.0),
        );
        let token = handle.token();
        drop(handle);

        assert!(token.is_cancelled());
        let after_drop = frames.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(frames.load(Ordering::SeqCst), after_drop);
    }

    #[test]
    fn test_loop_error_is_returned() {
        let adapter = DetectorAdapter::new(Box::new(EmptyModel), DetectorConfig::new());
        let handle = App::start_video(
            Endless,
            adapter,
            Renderer::default(),
            |_: &Canvas, _: &DetectionResult| true,
            LoopConfig::new(),
        );
        assert!(matches!(handle.join(), Err(PoseError::ModeMismatch { .. })));
    }

    #[test]
    fn test_image_pipeline_entry() {
        let adapter = DetectorAdapter::new(Box::new(EmptyModel), DetectorConfig::new());
        let pipeline = App::image_pipeline(adapter, Renderer::default(), &LoopConfig::new()).unwrap();
        assert_eq!(pipeline.current_generation(), 0);
        assert!(pipeline.latest().is_none());
    }
}
