// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! The `image` and `video` commands.

use std::path::Path;

use crate::app::App;
use crate::cli::args::{ImageArgs, ModelArgs, VideoArgs};
use crate::config::{DetectorConfig, LoopConfig};
use crate::detector::{DetectorAdapter, PoseModel};
use crate::download::resolve_model;
use crate::driver::{CancelToken, LoopSummary, VideoLoop};
use crate::error::{PoseError, Result};
use crate::landmarks::DetectionResult;
use crate::logging::set_verbose;
use crate::mode::RunningMode;
use crate::model::OnnxPoseModel;
use crate::render::{Canvas, RenderStyle, Renderer};
use crate::source::{Source, VideoSource};
use crate::{VERSION, info, section, success, verbose, warn};

/// Detector configuration from the shared model options.
#[must_use]
pub fn detector_config(args: &ModelArgs, mode: RunningMode) -> DetectorConfig {
    let config = DetectorConfig::new()
        .with_running_mode(mode)
        .with_num_poses(args.num_poses)
        .with_confidence(args.conf);
    match args.imgsz {
        Some(size) => config.with_imgsz(size, size),
        None => config,
    }
}

/// Render style for `mode` with any color overrides applied.
#[must_use]
pub fn render_style(args: &ModelArgs, mode: RunningMode) -> RenderStyle {
    let mut style = RenderStyle::for_mode(mode);
    if let Some(color) = args.connector_color {
        style.connector.color = color;
    }
    if let Some(color) = args.point_color {
        style.point.color = color;
    }
    style
}

/// Resolve the model file and start loading it in the background.
fn start_detector(args: &ModelArgs, mode: RunningMode) -> Result<DetectorAdapter> {
    let model_path = resolve_model(&args.model)?;
    let config = detector_config(args, mode);
    let loader_config = config.clone();
    Ok(DetectorAdapter::load_in_background(config, move || {
        load_backend(&model_path, &loader_config)
    }))
}

fn load_backend(path: &Path, config: &DetectorConfig) -> Result<Box<dyn PoseModel>> {
    let mut model = OnnxPoseModel::load(path, config)?;
    model.warmup()?;
    Ok(Box::new(model))
}

fn banner(mode: RunningMode) {
    info!("pose-overlay {VERSION} 🚀 ONNX Runtime, {mode} mode");
}

fn log_result(label: &str, canvas: &Canvas, result: &DetectionResult) {
    verbose!(
        "{label}: {}x{} {}, {:.1}ms",
        canvas.width(),
        canvas.height(),
        result.summary(),
        result.speed.inference.unwrap_or(0.0)
    );
}

/// Run the still-image command.
///
/// # Errors
///
/// Returns an error if the model can't be loaded, no image could be
/// processed, or the output can't be written.
pub fn run_image(args: &ImageArgs) -> Result<()> {
    set_verbose(args.model.verbose);
    banner(RunningMode::Image);

    let adapter = start_detector(&args.model, RunningMode::Image)?;
    let renderer = Renderer::new(render_style(&args.model, RunningMode::Image));
    let loop_config = LoopConfig::new().with_display_height(args.display_height);

    let mut pipeline = App::image_pipeline(adapter, renderer, &loop_config)?;
    pipeline.wait_ready()?;

    for path in &args.source {
        pipeline.select(path.clone());
    }
    pipeline.wait();

    let overlay = pipeline
        .latest()
        .ok_or_else(|| PoseError::Image("No image could be processed".to_string()))?;
    section!("Overlay");
    log_result(
        &format!("image {}", overlay.path.display()),
        &overlay.canvas,
        &overlay.result,
    );
    let speed = overlay.result.speed;
    verbose!(
        "Speed: {:.1}ms preprocess, {:.1}ms inference, {:.1}ms postprocess",
        speed.preprocess.unwrap_or(0.0),
        speed.inference.unwrap_or(0.0),
        speed.postprocess.unwrap_or(0.0)
    );

    if let Some(output) = &args.output {
        overlay.canvas.save(output)?;
        success!("Overlay saved to {}", output.display());
    }

    #[cfg(feature = "visualize")]
    if args.show {
        let (width, height) = overlay.canvas.size();
        let mut viewer = crate::visualizer::Viewer::new("pose-overlay", width as usize, height as usize)?;
        viewer.update(overlay.canvas.image())?;
        viewer.wait_for_close();
    }

    #[cfg(not(feature = "visualize"))]
    if args.show {
        warn!("--show requires the 'visualize' feature");
    }

    Ok(())
}

/// Run the video command until the stream ends or `token` is cancelled.
///
/// # Errors
///
/// Returns an error if the source can't be opened or the model fails to load.
pub fn run_video(args: &VideoArgs, token: &CancelToken) -> Result<LoopSummary> {
    set_verbose(args.model.verbose);
    banner(RunningMode::Video);

    let source = Source::from(args.source.as_str());
    if source.is_image() && crate::source::is_image_file(Path::new(&args.source)) {
        return Err(PoseError::Config(format!(
            "{} is a still image; use the image command",
            args.source
        )));
    }
    let mut video = VideoSource::open(source)?;
    if let Some(fps) = video.frame_rate() {
        verbose!("Opened {} at {fps:.1} fps", video.source());
    }

    let mut adapter = start_detector(&args.model, RunningMode::Video)?;
    let mut renderer = Renderer::new(render_style(&args.model, RunningMode::Video));
    let mut loop_config = LoopConfig::new()
        .with_fps(args.fps)
        .with_composite(args.composite);
    if let Some(max) = args.max_frames {
        loop_config = loop_config.with_max_cycles(max);
    }
    let mut video_loop = VideoLoop::new(loop_config);

    #[cfg(feature = "visualize")]
    let summary = if args.show {
        let mut viewer = crate::visualizer::Viewer::new("pose-overlay", 640, 480)?;
        video_loop.run(&mut video, &mut adapter, &mut renderer, &mut viewer, token)?
    } else {
        video_loop.run(&mut video, &mut adapter, &mut renderer, &mut |_: &Canvas, _: &DetectionResult| true, token)?
    };

    #[cfg(not(feature = "visualize"))]
    let summary = {
        if args.show {
            warn!("--show requires the 'visualize' feature");
        }
        video_loop.run(&mut video, &mut adapter, &mut renderer, &mut |_: &Canvas, _: &DetectionResult| true, token)?
    };

    section!("Summary");
    if summary.failures > 0 {
        warn!("{} of {} cycles failed", summary.failures, summary.cycles);
    }
    success!(
        "{} frames, {} bodies drawn ({} frames before the model was ready)",
        summary.cycles,
        summary.detections,
        summary.skipped
    );
    Ok(summary)
}
