// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Pose Overlay
//!
//! Draws a human-pose skeleton over still images and live video. Frames are
//! read from a camera, video file or stream, passed through an ONNX pose model
//! via [ONNX Runtime](https://onnxruntime.ai), and the detected landmarks are
//! rendered as connectors and points on a canvas sized to the source.
//!
//! ## Features
//!
//! - **Two running modes** - [`RunningMode::Image`] for selected stills and
//!   [`RunningMode::Video`] for a paced loop with strictly increasing timestamps
//! - **Background model loading** - frames arriving before the model is ready are skipped, not queued
//! - **Stale results dropped** - only the latest still-image selection is ever committed
//! - **Cancellable** - the video loop stops at the next cycle once its [`CancelToken`] fires
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use pose_overlay::{
//!     DetectorAdapter, DetectorConfig, LoopConfig, OnnxPoseModel, RenderStyle, Renderer,
//!     RunningMode, App,
//! };
//!
//! fn main() -> pose_overlay::Result<()> {
//!     let config = DetectorConfig::new().with_running_mode(RunningMode::Image);
//!     let model = OnnxPoseModel::load("yolo11n-pose.onnx", &config)?;
//!     let adapter = DetectorAdapter::new(Box::new(model), config);
//!
//!     let renderer = Renderer::new(RenderStyle::image_mode());
//!     let mut pipeline = App::image_pipeline(adapter, renderer, &LoopConfig::new())?;
//!     pipeline.select("person.jpg");
//!     pipeline.wait();
//!
//!     if let Some(overlay) = pipeline.latest() {
//!         println!("{}", overlay.result.summary());
//!         overlay.canvas.save("overlay.png".as_ref())?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Overlay a still image and save the canvas
//! pose-overlay image --source person.jpg --output overlay.png
//!
//! # Live camera with a window (requires the `video` feature)
//! pose-overlay video --source 0 --show
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`detector`] | [`PoseModel`] backend trait and the mode-checking [`DetectorAdapter`] |
//! | [`model`] | ONNX Runtime backend ([`OnnxPoseModel`]) |
//! | [`render`] | [`Canvas`] and the skeleton [`Renderer`] |
//! | [`driver`] | [`VideoLoop`] and [`ImagePipeline`] |
//! | [`source`] | Still decoding and [`VideoSource`] frames |
//! | [`landmarks`] | Output types ([`DetectionResult`], [`LandmarkSet`], [`Landmark`]) |
//! | [`download`] | Model download and cache |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `visualize` | Real-time window display (default) |
//! | `video` | Camera, video file and stream decoding |
//! | `cuda` | NVIDIA CUDA acceleration |
//! | `tensorrt` | NVIDIA `TensorRT` optimization |
//! | `coreml` | Apple `CoreML` (macOS/iOS) |

// Modules
pub mod app;
pub mod cli;
pub mod config;
pub mod detector;
pub mod download;
pub mod driver;
pub mod error;
pub mod landmarks;
pub mod logging;
pub mod mode;
pub mod model;
pub mod postprocessing;
pub mod preprocessing;
pub mod render;
pub mod source;
pub mod utils;
pub mod visualizer;

// Re-export main types for convenience
pub use app::{App, AppHandle};
pub use config::{DISPLAY_HEIGHT, DetectorConfig, LoopConfig};
pub use detector::{DetectorAdapter, PoseModel, VideoClock};
pub use download::{ModelAsset, ensure_model, resolve_model};
pub use driver::{
    CancelToken, FrameSink, GenerationCounter, ImagePipeline, LoopState, LoopSummary, Overlay,
    StillDecoder, VideoLoop,
};
pub use error::{PoseError, Result};
pub use landmarks::{DetectionResult, Landmark, LandmarkSet, Speed};
pub use logging::{is_verbose, set_verbose};
pub use mode::RunningMode;
pub use model::OnnxPoseModel;
pub use render::{Canvas, RenderStats, RenderStyle, Renderer, Stroke, canvas_size_for_still};
pub use source::{
    Frame, FrameSource, ReadySignal, Source, VideoSource, camera_device, decode_still,
};
pub use visualizer::{Color, KEYPOINT_NAMES, NUM_KEYPOINTS, SKELETON};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
