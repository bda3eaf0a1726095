// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Colors, body topology and the preview window.

pub mod color;
pub mod skeleton;

#[cfg(feature = "visualize")]
pub mod viewer;

pub use color::Color;
pub use skeleton::{KEYPOINT_NAMES, NUM_KEYPOINTS, SKELETON};

#[cfg(feature = "visualize")]
pub use viewer::Viewer;
