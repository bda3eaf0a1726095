// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Loop driver: sequences capture, detection and rendering.
//!
//! - [`VideoLoop`] runs one cycle per refresh tick against a [`FrameSource`]
//!   until the stream ends, the sink asks to stop, or the [`CancelToken`] is
//!   cancelled. A failed cycle is logged and the loop moves on.
//! - [`ImagePipeline`] runs exactly one cycle per selected still image on a
//!   worker thread. A [`GenerationCounter`] makes sure only the most recent
//!   selection is ever committed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::config::LoopConfig;
use crate::detector::DetectorAdapter;
use crate::error::{PoseError, Result};
use crate::landmarks::DetectionResult;
use crate::mode::RunningMode;
use crate::render::{Canvas, RenderStats, Renderer, canvas_size_for_still};
use crate::source::{Frame, FrameSource, ReadySignal, decode_still};
use crate::{verbose, warn};

/// Lifecycle of a loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    /// Not started, or finished.
    #[default]
    Idle,
    /// Source delivered its first frame.
    Ready,
    /// Cycles are being issued.
    Running,
}

/// Cooperative cancellation flag shared between a loop and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect at the top of the next cycle.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Monotonic selection counter for the image pipeline.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter(Arc<AtomicU64>);

impl GenerationCounter {
    /// Create a counter at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation and return it.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The latest generation handed out.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Whether `generation` is still the latest.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

/// Receives every rendered canvas of the video loop.
pub trait FrameSink {
    /// Present a canvas. Return `false` to stop the loop.
    fn present(&mut self, canvas: &Canvas, result: &DetectionResult) -> bool;
}

impl<F> FrameSink for F
where
    F: FnMut(&Canvas, &DetectionResult) -> bool,
{
    fn present(&mut self, canvas: &Canvas, result: &DetectionResult) -> bool {
        self(canvas, result)
    }
}

#[cfg(feature = "visualize")]
impl FrameSink for crate::visualizer::Viewer {
    fn present(&mut self, canvas: &Canvas, _result: &DetectionResult) -> bool {
        match self.update(canvas.image()) {
            Ok(open) => open,
            Err(e) => {
                warn!("{e}");
                false
            }
        }
    }
}

/// Counters reported when a loop returns to idle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    /// Cycles issued, successful or not.
    pub cycles: usize,
    /// Cycles abandoned because capture or detection failed.
    pub failures: usize,
    /// Cycles where the detector was not ready yet.
    pub skipped: usize,
    /// Bodies drawn across all cycles.
    pub detections: usize,
}

/// The live video loop.
pub struct VideoLoop {
    config: LoopConfig,
    state: LoopState,
    on_ready: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for VideoLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoLoop")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl VideoLoop {
    /// Create an idle loop.
    #[must_use]
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            state: LoopState::Idle,
            on_ready: None,
        }
    }

    /// Call `listener` once, when the source delivers its first frame.
    #[must_use]
    pub fn on_ready<F: FnOnce() + Send + 'static>(mut self, listener: F) -> Self {
        self.on_ready = Some(Box::new(listener));
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LoopState {
        self.state
    }

    /// Run cycles until the stream ends, the sink stops, `max_cycles` is
    /// reached or `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter is not in video mode. Per-cycle
    /// failures are counted in the summary instead.
    pub fn run<S, K>(
        &mut self,
        source: &mut S,
        adapter: &mut DetectorAdapter,
        renderer: &mut Renderer,
        sink: &mut K,
        token: &CancelToken,
    ) -> Result<LoopSummary>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        if adapter.running_mode() != RunningMode::Video {
            return Err(PoseError::ModeMismatch {
                configured: adapter.running_mode(),
                requested: RunningMode::Video,
            });
        }

        let mut summary = LoopSummary::default();
        let mut ready = match self.on_ready.take() {
            Some(listener) => ReadySignal::new().with_listener(listener),
            None => ReadySignal::new(),
        };
        let mut canvas = Canvas::new(0, 0);
        let mut topology_set = false;
        let mut next_tick = Instant::now();

        loop {
            if token.is_cancelled() {
                verbose!("Video loop cancelled");
                break;
            }
            if self.config.max_cycles.is_some_and(|max| summary.cycles >= max) {
                break;
            }

            let frame = match source.next_frame() {
                None => {
                    verbose!("End of stream");
                    break;
                }
                Some(Err(e)) => {
                    warn!("Skipping frame: {e}");
                    summary.cycles += 1;
                    summary.failures += 1;
                    self.pace(&mut next_tick);
                    continue;
                }
                Some(Ok(frame)) => frame,
            };

            if ready.fire() {
                self.state = LoopState::Ready;
                verbose!("Source ready ({}x{})", frame.width(), frame.height());
                self.state = LoopState::Running;
            }
            summary.cycles += 1;
            canvas.resize(frame.width(), frame.height());

            let timestamp = adapter.next_timestamp();
            let result = match adapter.detect_for_video(&frame, timestamp) {
                Ok(Some(result)) => result,
                Ok(None) => {
                    if let Some(msg) = adapter.load_error() {
                        self.state = LoopState::Idle;
                        return Err(PoseError::ModelLoad(msg.to_string()));
                    }
                    summary.skipped += 1;
                    DetectionResult::empty((frame.width(), frame.height()))
                }
                Err(e) => {
                    warn!("Detection failed at {timestamp}ms: {e}");
                    summary.failures += 1;
                    self.pace(&mut next_tick);
                    continue;
                }
            };

            if !topology_set && !adapter.connections().is_empty() {
                renderer.set_connections(adapter.connections());
                topology_set = true;
            }

            let background = self.config.composite.then_some(&frame);
            let stats = renderer.render(&mut canvas, background, &result);
            summary.detections += result.len();
            verbose!(
                "cycle {} @{timestamp}ms: {} ({} connectors, {} points)",
                summary.cycles,
                result.summary(),
                stats.connectors,
                stats.points
            );

            if !sink.present(&canvas, &result) {
                verbose!("Sink closed");
                break;
            }
            self.pace(&mut next_tick);
        }

        self.state = LoopState::Idle;
        Ok(summary)
    }

    /// Sleep until the next refresh tick.
    fn pace(&self, next_tick: &mut Instant) {
        let interval = self.config.refresh_interval;
        if interval.is_zero() {
            return;
        }
        let Some(tick) = next_tick.checked_add(interval) else {
            return;
        };
        *next_tick = tick;
        let now = Instant::now();
        if *next_tick > now {
            thread::sleep(*next_tick - now);
        } else {
            *next_tick = now;
        }
    }
}

/// A committed still-image cycle.
#[derive(Debug, Clone)]
pub struct Overlay {
    /// Selection this overlay belongs to.
    pub generation: u64,
    /// Image that was selected.
    pub path: PathBuf,
    /// Rendered canvas.
    pub canvas: Canvas,
    /// Detection result in source image pixels.
    pub result: DetectionResult,
    /// Draw counts.
    pub stats: RenderStats,
}

/// Decodes a selected still into a frame.
pub type StillDecoder = Arc<dyn Fn(&Path) -> Result<Frame> + Send + Sync>;

/// Still-image selections, one cycle each.
pub struct ImagePipeline {
    adapter: Arc<Mutex<DetectorAdapter>>,
    renderer: Renderer,
    decoder: StillDecoder,
    display_height: u32,
    generations: GenerationCounter,
    latest: Arc<Mutex<Option<Overlay>>>,
    failures: Arc<AtomicUsize>,
    stale: Arc<AtomicUsize>,
    workers: Vec<JoinHandle<()>>,
}

impl ImagePipeline {
    /// Create a pipeline around an image-mode adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter is not in image mode.
    pub fn new(adapter: DetectorAdapter, renderer: Renderer, config: &LoopConfig) -> Result<Self> {
        if adapter.running_mode() != RunningMode::Image {
            return Err(PoseError::ModeMismatch {
                configured: adapter.running_mode(),
                requested: RunningMode::Image,
            });
        }
        Ok(Self {
            adapter: Arc::new(Mutex::new(adapter)),
            renderer,
            decoder: Arc::new(decode_still),
            display_height: config.display_height,
            generations: GenerationCounter::new(),
            latest: Arc::new(Mutex::new(None)),
            failures: Arc::new(AtomicUsize::new(0)),
            stale: Arc::new(AtomicUsize::new(0)),
            workers: Vec::new(),
        })
    }

    /// Replace the still decoder. Defaults to [`decode_still`].
    #[must_use]
    pub fn with_decoder<F>(mut self, decoder: F) -> Self
    where
        F: Fn(&Path) -> Result<Frame> + Send + Sync + 'static,
    {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Select an image. Starts one cycle on a worker thread and returns its
    /// generation. Any earlier cycle still in flight becomes stale.
    pub fn select(&mut self, path: impl Into<PathBuf>) -> u64 {
        let path = path.into();
        let generation = self.generations.next();

        let adapter = Arc::clone(&self.adapter);
        let latest = Arc::clone(&self.latest);
        let failures = Arc::clone(&self.failures);
        let stale = Arc::clone(&self.stale);
        let decoder = Arc::clone(&self.decoder);
        let generations = self.generations.clone();
        let renderer = self.renderer.clone();
        let display_height = self.display_height;

        self.workers.retain(|w| !w.is_finished());
        self.workers.push(thread::spawn(move || {
            let overlay = match run_image_cycle(&adapter, &renderer, decoder.as_ref(), &path, display_height) {
                Ok(Some((canvas, result, stats))) => Overlay {
                    generation,
                    path,
                    canvas,
                    result,
                    stats,
                },
                Ok(None) => {
                    verbose!("Detector not ready, skipping {}", path.display());
                    return;
                }
                Err(e) => {
                    warn!("Failed to process {}: {e}", path.display());
                    failures.fetch_add(1, Ordering::SeqCst);
                    return;
                }
            };

            let mut slot = latest.lock().unwrap_or_else(PoisonError::into_inner);
            if generations.is_current(generation) {
                verbose!("{}: {}", overlay.path.display(), overlay.result.summary());
                *slot = Some(overlay);
            } else {
                verbose!("Dropping stale result for {}", overlay.path.display());
                stale.fetch_add(1, Ordering::SeqCst);
            }
        }));

        generation
    }

    /// Block until every started cycle has finished.
    pub fn wait(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Image worker panicked");
            }
        }
    }

    /// The most recently committed overlay.
    #[must_use]
    pub fn latest(&self) -> Option<Overlay> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest generation handed out by [`select`](Self::select).
    #[must_use]
    pub fn current_generation(&self) -> u64 {
        self.generations.current()
    }

    /// Number of selections that failed to decode or detect.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Number of finished cycles dropped because a newer selection existed.
    #[must_use]
    pub fn stale_dropped(&self) -> usize {
        self.stale.load(Ordering::SeqCst)
    }

    /// Block until the detector has loaded.
    ///
    /// # Errors
    ///
    /// Returns the loader's error if loading failed.
    pub fn wait_ready(&self) -> Result<()> {
        self.adapter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .wait_ready()
    }
}

impl Drop for ImagePipeline {
    fn drop(&mut self) {
        self.wait();
    }
}

impl std::fmt::Debug for ImagePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePipeline")
            .field("generation", &self.generations.current())
            .field("in_flight", &self.workers.len())
            .finish_non_exhaustive()
    }
}

/// Decode, detect and render one still image.
fn run_image_cycle(
    adapter: &Mutex<DetectorAdapter>,
    renderer: &Renderer,
    decoder: &(dyn Fn(&Path) -> Result<Frame> + Send + Sync),
    path: &Path,
    display_height: u32,
) -> Result<Option<(Canvas, DetectionResult, RenderStats)>> {
    let frame = decoder(path)?;

    let (result, connections) = {
        let mut adapter = adapter.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(result) = adapter.detect(&frame)? else {
            return Ok(None);
        };
        (result, adapter.connections())
    };

    let (width, height) = canvas_size_for_still(frame.width(), frame.height(), display_height);
    let mut canvas = Canvas::new(width, height);
    let renderer = renderer.clone().with_connections(connections);
    let stats = renderer.render(&mut canvas, Some(&frame), &result);
    Ok(Some((canvas, result, stats)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use crate::detector::PoseModel;
    use crate::landmarks::{Landmark, LandmarkSet, Speed};
    use crate::render::RenderStyle;
    use crate::source::Frame;
    use image::{DynamicImage, RgbImage};
    use std::collections::VecDeque;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Backend returning one full body.
    struct FakeModel {
        timestamps: Arc<Mutex<Vec<u64>>>,
        fail_every: Option<usize>,
        calls: usize,
    }

    impl FakeModel {
        fn new() -> Self {
            Self {
                timestamps: Arc::new(Mutex::new(Vec::new())),
                fail_every: None,
                calls: 0,
            }
        }
    }

    impl PoseModel for FakeModel {
        fn detect(&mut self, frame: &Frame, _config: &DetectorConfig) -> Result<DetectionResult> {
            self.calls += 1;
            if self.fail_every.is_some_and(|n| self.calls % n == 0) {
                return Err(PoseError::Inference("fake failure".to_string()));
            }
            let landmarks = (0..17)
                .map(|i| Landmark::new(i as f32, i as f32, 1.0))
                .collect();
            Ok(DetectionResult::new(
                vec![LandmarkSet::new(landmarks, 0.9)],
                (frame.width(), frame.height()),
                Speed::default(),
            ))
        }

        fn detect_for_video(
            &mut self,
            frame: &Frame,
            timestamp_ms: u64,
            config: &DetectorConfig,
        ) -> Result<DetectionResult> {
            self.timestamps.lock().unwrap().push(timestamp_ms);
            self.detect(frame, config)
        }

        fn connections(&self) -> &'static [[usize; 2]] {
            &crate::visualizer::SKELETON
        }
    }

    struct FakeSource(VecDeque<Option<Result<Frame>>>);

    impl FakeSource {
        fn frames(n: usize) -> Self {
            Self((0..n).map(|_| Some(Ok(DynamicImage::new_rgb8(32, 24)))).collect())
        }
    }

    impl FrameSource for FakeSource {
        fn next_frame(&mut self) -> Option<Result<Frame>> {
            self.0.pop_front().flatten()
        }
    }

    fn video_adapter(model: FakeModel) -> DetectorAdapter {
        DetectorAdapter::new(
            Box::new(model),
            DetectorConfig::new().with_running_mode(RunningMode::Video),
        )
    }

    fn fast_loop() -> VideoLoop {
        VideoLoop::new(LoopConfig::new().with_refresh_interval(Duration::ZERO))
    }

    #[test]
    fn test_generation_counter() {
        let counter = GenerationCounter::new();
        assert_eq!(counter.current(), 0);
        let a = counter.next();
        let b = counter.clone().next();
        assert_eq!((a, b), (1, 2));
        assert!(!counter.is_current(a));
        assert!(counter.is_current(b));
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_video_loop_runs_to_end_of_stream() {
        let model = FakeModel::new();
        let seen = model.timestamps.clone();
        let mut adapter = video_adapter(model);
        let mut renderer = Renderer::new(RenderStyle::video_mode());
        let mut presented = 0;
        let mut sink = |canvas: &Canvas, result: &DetectionResult| {
            assert_eq!(canvas.size(), (32, 24));
            assert_eq!(result.len(), 1);
            presented += 1;
            true
        };

        let mut video = fast_loop();
        let summary = video
            .run(&mut FakeSource::frames(20), &mut adapter, &mut renderer, &mut sink, &CancelToken::new())
            .unwrap();

        assert_eq!(summary.cycles, 20);
        assert_eq!(summary.failures, 0);
        assert_eq!(summary.detections, 20);
        assert_eq!(presented, 20);
        assert_eq!(video.state(), LoopState::Idle);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 20);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_ready_fires_once_on_first_frame() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let mut video = fast_loop().on_ready(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut source = FakeSource::frames(3);
        source.0.push_front(Some(Err(PoseError::Video("warming up".to_string()))));
        let summary = video
            .run(
                &mut source,
                &mut video_adapter(FakeModel::new()),
                &mut Renderer::default(),
                &mut |_: &Canvas, _: &DetectionResult| true,
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(summary.cycles, 4);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_stream_never_ready() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let mut video = fast_loop().on_ready(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let summary = video
            .run(
                &mut FakeSource::frames(0),
                &mut video_adapter(FakeModel::new()),
                &mut Renderer::default(),
                &mut |_: &Canvas, _: &DetectionResult| true,
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(summary.cycles, 0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_stops_at_next_cycle() {
        let mut adapter = video_adapter(FakeModel::new());
        let mut renderer = Renderer::default();
        let token = CancelToken::new();
        let stopper = token.clone();
        let mut count = 0;
        let mut sink = |_: &Canvas, _: &DetectionResult| {
            count += 1;
            if count == 3 {
                stopper.cancel();
            }
            true
        };

        let summary = fast_loop()
            .run(&mut FakeSource::frames(100), &mut adapter, &mut renderer, &mut sink, &token)
            .unwrap();
        assert_eq!(summary.cycles, 3);
    }

    #[test]
    fn test_cancelled_before_start_runs_nothing() {
        let mut adapter = video_adapter(FakeModel::new());
        let token = CancelToken::new();
        token.cancel();
        let summary = fast_loop()
            .run(
                &mut FakeSource::frames(5),
                &mut adapter,
                &mut Renderer::default(),
                &mut |_: &Canvas, _: &DetectionResult| true,
                &token,
            )
            .unwrap();
        assert_eq!(summary, LoopSummary::default());
    }

    #[test]
    fn test_failures_do_not_stop_loop() {
        let mut model = FakeModel::new();
        model.fail_every = Some(3);
        let mut adapter = video_adapter(model);

        let mut source = FakeSource::frames(4);
        source.0.push_front(Some(Err(PoseError::Video("corrupt packet".to_string()))));

        let summary = fast_loop()
            .run(
                &mut source,
                &mut adapter,
                &mut Renderer::default(),
                &mut |_: &Canvas, _: &DetectionResult| true,
                &CancelToken::new(),
            )
            .unwrap();
        // One decode failure plus the third detection failing.
        assert_eq!(summary.cycles, 5);
        assert_eq!(summary.failures, 2);
        assert_eq!(summary.detections, 3);
    }

    #[test]
    fn test_sink_can_stop_loop_and_max_cycles() {
        let mut adapter = video_adapter(FakeModel::new());
        let summary = fast_loop()
            .run(
                &mut FakeSource::frames(10),
                &mut adapter,
                &mut Renderer::default(),
                &mut |_: &Canvas, _: &DetectionResult| false,
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(summary.cycles, 1);

        let mut limited = VideoLoop::new(
            LoopConfig::new()
                .with_refresh_interval(Duration::ZERO)
                .with_max_cycles(4),
        );
        let summary = limited
            .run(
                &mut FakeSource::frames(10),
                &mut adapter,
                &mut Renderer::default(),
                &mut |_: &Canvas, _: &DetectionResult| true,
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(summary.cycles, 4);
    }

    #[test]
    fn test_failed_background_load_stops_loop() {
        let mut adapter = DetectorAdapter::load_in_background(
            DetectorConfig::new().with_running_mode(RunningMode::Video),
            || Err(PoseError::ModelLoad("corrupt model".to_string())),
        );
        let _ = adapter.wait_ready();
        let mut video = fast_loop();
        let result = video.run(
            &mut FakeSource::frames(10),
            &mut adapter,
            &mut Renderer::default(),
            &mut |_: &Canvas, _: &DetectionResult| true,
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(PoseError::ModelLoad(_))));
        assert_eq!(video.state(), LoopState::Idle);
    }

    #[test]
    fn test_video_loop_requires_video_mode() {
        let mut adapter = DetectorAdapter::new(Box::new(FakeModel::new()), DetectorConfig::new());
        let result = fast_loop().run(
            &mut FakeSource::frames(1),
            &mut adapter,
            &mut Renderer::default(),
            &mut |_: &Canvas, _: &DetectionResult| true,
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(PoseError::ModeMismatch { .. })));
    }

    #[test]
    fn test_video_loop_pacing() {
        let mut adapter = video_adapter(FakeModel::new());
        let mut paced = VideoLoop::new(LoopConfig::new().with_refresh_interval(Duration::from_millis(10)));
        let start = Instant::now();
        paced
            .run(
                &mut FakeSource::frames(5),
                &mut adapter,
                &mut Renderer::default(),
                &mut |_: &Canvas, _: &DetectionResult| true,
                &CancelToken::new(),
            )
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_unrepresentable_interval_does_not_panic() {
        let mut adapter = video_adapter(FakeModel::new());
        let summary = VideoLoop::new(LoopConfig::new().with_refresh_interval(Duration::MAX))
            .run(
                &mut FakeSource::frames(2),
                &mut adapter,
                &mut Renderer::default(),
                &mut |_: &Canvas, _: &DetectionResult| true,
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(summary.cycles, 2);
    }

    fn write_image(name: &str, width: u32, height: u32) -> PathBuf {
        let path = std::env::temp_dir().join(format!("pose-overlay-driver-{}-{name}.png", std::process::id()));
        RgbImage::new(width, height).save(&path).unwrap();
        path
    }

    #[test]
    fn test_image_pipeline_commits_selection() {
        let adapter = DetectorAdapter::new(Box::new(FakeModel::new()), DetectorConfig::new());
        let mut pipeline = ImagePipeline::new(adapter, Renderer::default(), &LoopConfig::new()).unwrap();

        let path = write_image("wide", 1920, 1080);
        let generation = pipeline.select(&path);
        pipeline.wait();
        std::fs::remove_file(&path).unwrap();

        let overlay = pipeline.latest().unwrap();
        assert_eq!(overlay.generation, generation);
        assert_eq!(overlay.canvas.size(), (853, 480));
        assert_eq!(overlay.stats.connectors, 19);
        assert_eq!(overlay.stats.points, 17);
        assert_eq!(pipeline.failures(), 0);
    }

    #[test]
    fn test_stale_selection_is_dropped() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);

        // "slow" stalls in decode, outside the detector lock, until released.
        let adapter = DetectorAdapter::new(Box::new(FakeModel::new()), DetectorConfig::new());
        let mut pipeline = ImagePipeline::new(adapter, Renderer::default(), &LoopConfig::new())
            .unwrap()
            .with_decoder(move |path: &Path| {
                if path == Path::new("slow") {
                    entered_tx.lock().unwrap().send(()).unwrap();
                    release_rx.lock().unwrap().recv().unwrap();
                    return Ok(DynamicImage::new_rgb8(96, 48));
                }
                Ok(DynamicImage::new_rgb8(64, 48))
            });

        let first = pipeline.select("slow");
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = pipeline.select("fast");

        let deadline = Instant::now() + Duration::from_secs(5);
        while pipeline.latest().is_none() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pipeline.latest().unwrap().generation, second);

        // The older cycle now finishes last and must not replace the newer one.
        release_tx.send(()).unwrap();
        pipeline.wait();

        let overlay = pipeline.latest().unwrap();
        assert!(second > first);
        assert_eq!(overlay.generation, second);
        assert_eq!(overlay.path, PathBuf::from("fast"));
        assert_eq!(overlay.canvas.size(), (853, 480));
        assert_eq!(pipeline.stale_dropped(), 1);
        assert_eq!(pipeline.failures(), 0);
    }

    #[test]
    fn test_latest_selection_commits_without_drops() {
        let adapter = DetectorAdapter::new(Box::new(FakeModel::new()), DetectorConfig::new());
        let mut pipeline = ImagePipeline::new(adapter, Renderer::default(), &LoopConfig::new()).unwrap();
        let path = write_image("single", 4, 4);
        pipeline.select(&path);
        pipeline.wait();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(pipeline.stale_dropped(), 0);
        assert!(pipeline.latest().is_some());
    }

    #[test]
    fn test_image_failure_is_counted_not_committed() {
        let adapter = DetectorAdapter::new(Box::new(FakeModel::new()), DetectorConfig::new());
        let mut pipeline = ImagePipeline::new(adapter, Renderer::default(), &LoopConfig::new()).unwrap();
        pipeline.select("missing-image.png");
        pipeline.wait();
        assert!(pipeline.latest().is_none());
        assert_eq!(pipeline.failures(), 1);
    }

    #[test]
    fn test_image_pipeline_requires_image_mode() {
        let adapter = video_adapter(FakeModel::new());
        assert!(ImagePipeline::new(adapter, Renderer::default(), &LoopConfig::new()).is_err());
    }
}
