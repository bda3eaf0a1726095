// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Decoding of raw pose model output into landmark sets.
//!
//! YOLO pose models output `[1, 4 + C + K*3, N]` (or the transposed layout)
//! where each of the N predictions holds a center-size box, C class scores and
//! K keypoints of (x, y, confidence) in model input space.

use ndarray::Array2;

use crate::config::DetectorConfig;
use crate::landmarks::{Landmark, LandmarkSet};
use crate::preprocessing::PreprocessResult;
use crate::utils::nms;
use crate::warn;

/// Values per keypoint: x, y, confidence.
const KPT_DIM: usize = 3;

/// Decode a pose model output into at most `config.num_poses` landmark sets.
///
/// Sets are ordered by body score, highest first. Landmarks are in frame pixels.
#[must_use]
pub fn decode_poses(
    output: &[f32],
    output_shape: &[usize],
    num_keypoints: usize,
    preprocess: &PreprocessResult,
    config: &DetectorConfig,
) -> Vec<LandmarkSet> {
    let kpt_features = num_keypoints * KPT_DIM;
    let min_features = 5 + kpt_features;

    let (num_preds, is_transposed) = match output_shape {
        [_, a, b] | [a, b] => {
            if *a >= min_features && a < b {
                (*b, false) // [features, preds]
            } else {
                (*a, true) // [preds, features]
            }
        }
        _ => (0, false),
    };

    if output.is_empty() || num_preds == 0 {
        return Vec::new();
    }

    let features = output.len() / num_preds;
    if features < min_features {
        warn!("Pose model has insufficient features ({features}), expected at least {min_features}");
        return Vec::new();
    }

    let rows = if is_transposed {
        Array2::from_shape_vec((num_preds, features), output.to_vec()).ok()
    } else {
        Array2::from_shape_vec((features, num_preds), output.to_vec())
            .ok()
            .map(|arr| arr.t().to_owned())
    };
    let Some(rows) = rows else {
        return Vec::new();
    };

    let num_classes = (features - 4 - kpt_features).max(1);
    let kpt_start = 4 + num_classes;

    let mut boxes: Vec<([f32; 4], f32)> = Vec::new();
    let mut candidates: Vec<Vec<Landmark>> = Vec::new();

    for row in rows.rows() {
        let score = (4..kpt_start)
            .map(|c| row[c])
            .filter(|s| !s.is_nan())
            .fold(0.0_f32, f32::max);
        if score < config.min_pose_confidence {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let (x1, y1) = preprocess.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = preprocess.to_frame(cx + w / 2.0, cy + h / 2.0);

        let landmarks = (0..num_keypoints)
            .map(|k| {
                let offset = kpt_start + k * KPT_DIM;
                let (x, y) = preprocess.to_frame(row[offset], row[offset + 1]);
                let conf = row[offset + 2];
                let visibility = if conf < config.min_landmark_confidence {
                    0.0
                } else {
                    conf.clamp(0.0, 1.0)
                };
                Landmark::new(x, y, visibility)
            })
            .collect();

        boxes.push(([x1, y1, x2, y2], score));
        candidates.push(landmarks);
    }

    nms(&boxes, config.iou_threshold)
        .into_iter()
        .take(config.num_poses)
        .map(|i| LandmarkSet::new(std::mem::take(&mut candidates[i]), boxes[i].1))
        .collect()
}
