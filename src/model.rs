// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX pose model backend.
//!
//! [`OnnxPoseModel`] wraps an ONNX Runtime session running a YOLO pose export
//! and implements [`PoseModel`] for the detector adapter.

use std::path::Path;
use std::time::Instant;

use image::DynamicImage;
#[cfg(feature = "coreml")]
use ort::execution_providers::CoreMLExecutionProvider;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;

use crate::config::DetectorConfig;
use crate::detector::PoseModel;
use crate::error::{PoseError, Result};
use crate::landmarks::{DetectionResult, Speed};
use crate::postprocessing::decode_poses;
use crate::preprocessing::preprocess_frame;
use crate::verbose;
use crate::visualizer::skeleton::{NUM_KEYPOINTS, SKELETON};

/// Model input size used when the export carries no `imgsz` metadata.
const DEFAULT_IMGSZ: (usize, usize) = (640, 640);

/// Pose model running on ONNX Runtime.
///
/// # Example
///
/// ```no_run
/// use pose_overlay::{DetectorConfig, OnnxPoseModel};
///
/// let model = OnnxPoseModel::load("yolo11n-pose.onnx", &DetectorConfig::new())?;
/// println!("input size {:?}", model.imgsz());
/// # Ok::<(), pose_overlay::PoseError>(())
/// ```
pub struct OnnxPoseModel {
    session: Session,
    input_name: String,
    output_name: String,
    imgsz: (usize, usize),
    num_keypoints: usize,
    model_path: String,
    warmed_up: bool,
}

impl OnnxPoseModel {
    /// Load a pose model from an ONNX file.
    ///
    /// Input size and keypoint count are read from the export's metadata when
    /// present; `config.imgsz` overrides the input size.
    ///
    /// # Errors
    ///
    /// Returns an error if the file doesn't exist or can't be loaded.
    pub fn load<P: AsRef<Path>>(path: P, config: &DetectorConfig) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PoseError::ModelLoad(format!(
                "Model file not found: {}",
                path.display()
            )));
        }

        #[allow(unused_mut)]
        let mut builder = Session::builder()
            .map_err(|e| PoseError::ModelLoad(format!("Failed to create session builder: {e}")))?;

        #[cfg(feature = "coreml")]
        {
            builder = builder
                .with_execution_providers([CoreMLExecutionProvider::default()
                    .with_subgraphs(true)
                    .build()])
                .map_err(|e| PoseError::ModelLoad(format!("Failed to register CoreML EP: {e}")))?;
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PoseError::ModelLoad(format!("Failed to set optimization level: {e}")))?
            .with_intra_threads(config.num_threads)
            .map_err(|e| PoseError::ModelLoad(format!("Failed to set intra-thread count: {e}")))?
            .commit_from_file(path)
            .map_err(|e| PoseError::ModelLoad(format!("Failed to load model: {e}")))?;

        let input_name = session
            .inputs
            .first()
            .map_or_else(|| "images".to_string(), |i| i.name.clone());
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| PoseError::ModelLoad("Model has no outputs".to_string()))?;

        let (meta_imgsz, meta_kpts) = read_metadata(&session);
        let imgsz = config.imgsz.or(meta_imgsz).unwrap_or(DEFAULT_IMGSZ);
        let num_keypoints = meta_kpts.unwrap_or(NUM_KEYPOINTS);

        verbose!(
            "Loaded {} (input {}x{}, {} keypoints)",
            path.display(),
            imgsz.1,
            imgsz.0,
            num_keypoints
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            imgsz,
            num_keypoints,
            model_path: path.display().to_string(),
            warmed_up: false,
        })
    }

    /// Run one inference on a zero tensor so the first real frame is not slow.
    ///
    /// # Errors
    ///
    /// Returns an error if the warmup inference fails.
    pub fn warmup(&mut self) -> Result<()> {
        if self.warmed_up {
            return Ok(());
        }
        let dummy = ndarray::Array4::<f32>::zeros((1, 3, self.imgsz.0, self.imgsz.1));
        let _ = self.run_inference(&dummy)?;
        self.warmed_up = true;
        Ok(())
    }

    /// Model input size (height, width).
    #[must_use]
    pub const fn imgsz(&self) -> (usize, usize) {
        self.imgsz
    }

    /// Path the model was loaded from.
    #[must_use]
    pub fn model_path(&self) -> &str {
        &self.model_path
    }

    fn run_inference(&mut self, input: &ndarray::Array4<f32>) -> Result<(Vec<f32>, Vec<usize>)> {
        let input_contiguous = input.as_standard_layout();
        let input_tensor = TensorRef::from_array_view(&input_contiguous)
            .map_err(|e| PoseError::Inference(format!("Failed to create input tensor: {e}")))?;

        let inputs = ort::inputs![&self.input_name => input_tensor];
        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| PoseError::Inference(format!("Inference failed: {e}")))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| PoseError::Inference(format!("Output '{}' not found", self.output_name)))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| PoseError::Inference(format!("Failed to extract output: {e}")))?;

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        Ok((data.to_vec(), shape))
    }
}

impl PoseModel for OnnxPoseModel {
    fn detect(&mut self, frame: &DynamicImage, config: &DetectorConfig) -> Result<DetectionResult> {
        self.warmup()?;

        let start = Instant::now();
        let preprocessed = preprocess_frame(frame, self.imgsz)?;
        let preprocess_ms = start.elapsed().as_secs_f64() * 1000.0;

        let start = Instant::now();
        let (output, shape) = self.run_inference(&preprocessed.tensor)?;
        let inference_ms = start.elapsed().as_secs_f64() * 1000.0;

        let start = Instant::now();
        let poses = decode_poses(&output, &shape, self.num_keypoints, &preprocessed, config);
        let postprocess_ms = start.elapsed().as_secs_f64() * 1000.0;

        Ok(DetectionResult::new(
            poses,
            (frame.width(), frame.height()),
            Speed::new(preprocess_ms, inference_ms, postprocess_ms),
        ))
    }

    fn connections(&self) -> &'static [[usize; 2]] {
        &SKELETON
    }

    fn name(&self) -> String {
        self.model_path.clone()
    }
}

impl std::fmt::Debug for OnnxPoseModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxPoseModel")
            .field("model_path", &self.model_path)
            .field("imgsz", &self.imgsz)
            .field("num_keypoints", &self.num_keypoints)
            .finish_non_exhaustive()
    }
}

/// Read `imgsz` and `kpt_shape` from the export's custom metadata.
fn read_metadata(session: &Session) -> (Option<(usize, usize)>, Option<usize>) {
    let Ok(metadata) = session.metadata() else {
        return (None, None);
    };
    let imgsz = metadata
        .custom("imgsz")
        .ok()
        .flatten()
        .and_then(|v| parse_pair(&v));
    let kpts = metadata
        .custom("kpt_shape")
        .ok()
        .flatten()
        .and_then(|v| parse_pair(&v))
        .map(|(k, _)| k);
    (imgsz, kpts)
}

/// Parse a metadata list such as `[640, 640]` or `[17, 3]`.
fn parse_pair(value: &str) -> Option<(usize, usize)> {
    let mut parts = value
        .trim()
        .trim_start_matches(['[', '('])
        .trim_end_matches([']', ')'])
        .split(',')
        .map(|p| p.trim().parse::<usize>());
    let first = parts.next()?.ok()?;
    let second = match parts.next() {
        Some(p) => p.ok()?,
        None => first,
    };
    Some((first, second))
}
