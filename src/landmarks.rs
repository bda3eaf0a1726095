// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detection output types.
//!
//! A [`DetectionResult`] holds one [`LandmarkSet`] per detected body. Results are
//! produced fresh by every detection call and carry no identity across calls.

/// Timing information for a detection call (in milliseconds).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Speed {
    /// Time spent on preprocessing.
    pub preprocess: Option<f64>,
    /// Time spent on model inference.
    pub inference: Option<f64>,
    /// Time spent on postprocessing.
    pub postprocess: Option<f64>,
}

impl Speed {
    /// Create a new Speed instance with all timings.
    #[must_use]
    pub const fn new(preprocess: f64, inference: f64, postprocess: f64) -> Self {
        Self {
            preprocess: Some(preprocess),
            inference: Some(inference),
            postprocess: Some(postprocess),
        }
    }

    /// Get total time.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.preprocess.unwrap_or(0.0)
            + self.inference.unwrap_or(0.0)
            + self.postprocess.unwrap_or(0.0)
    }
}

/// A single anatomical keypoint.
///
/// Coordinates are in pixels of the frame the detection ran on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    /// Horizontal position in pixels.
    pub x: f32,
    /// Vertical position in pixels.
    pub y: f32,
    /// Relative depth, when the model provides one.
    pub z: Option<f32>,
    /// Confidence that the landmark is present and visible (0.0 to 1.0).
    pub visibility: f32,
}

impl Landmark {
    /// Create a 2D landmark.
    #[must_use]
    pub const fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self {
            x,
            y,
            z: None,
            visibility,
        }
    }

    /// Attach a depth value.
    #[must_use]
    pub const fn with_z(mut self, z: f32) -> Self {
        self.z = Some(z);
        self
    }

    /// Return the landmark with its x/y multiplied by the given factors.
    #[must_use]
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            x: self.x * sx,
            y: self.y * sy,
            ..*self
        }
    }
}

/// All landmarks of one detected body, in the model's landmark order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    landmarks: Vec<Landmark>,
    score: f32,
}

impl LandmarkSet {
    /// Create a landmark set with the body's detection score.
    #[must_use]
    pub const fn new(landmarks: Vec<Landmark>, score: f32) -> Self {
        Self { landmarks, score }
    }

    /// Number of landmarks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    /// Check if the set has no landmarks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }

    /// Landmark at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index)
    }

    /// All landmarks.
    #[must_use]
    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Iterate over the landmarks.
    pub fn iter(&self) -> std::slice::Iter<'_, Landmark> {
        self.landmarks.iter()
    }

    /// Detection score of the body.
    #[must_use]
    pub const fn score(&self) -> f32 {
        self.score
    }

    /// Return a copy with every landmark scaled.
    #[must_use]
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            landmarks: self.landmarks.iter().map(|l| l.scaled(sx, sy)).collect(),
            score: self.score,
        }
    }
}

impl<'a> IntoIterator for &'a LandmarkSet {
    type Item = &'a Landmark;
    type IntoIter = std::slice::Iter<'a, Landmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.landmarks.iter()
    }
}

/// Output of one detection call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionResult {
    /// One landmark set per detected body.
    pub poses: Vec<LandmarkSet>,
    /// Timestamp the call was issued with (video mode only).
    pub timestamp_ms: Option<u64>,
    /// Size of the frame the detection ran on (width, height).
    pub frame_size: (u32, u32),
    /// Timing information.
    pub speed: Speed,
}

impl DetectionResult {
    /// Create an empty result for a frame of the given size.
    #[must_use]
    pub const fn empty(frame_size: (u32, u32)) -> Self {
        Self {
            poses: Vec::new(),
            timestamp_ms: None,
            frame_size,
            speed: Speed {
                preprocess: None,
                inference: None,
                postprocess: None,
            },
        }
    }

    /// Create a result holding the given poses.
    #[must_use]
    pub const fn new(poses: Vec<LandmarkSet>, frame_size: (u32, u32), speed: Speed) -> Self {
        Self {
            poses,
            timestamp_ms: None,
            frame_size,
            speed,
        }
    }

    /// Attach the video timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Number of detected bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// Check if no body was detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Iterate over detected bodies.
    pub fn iter(&self) -> std::slice::Iter<'_, LandmarkSet> {
        self.poses.iter()
    }

    /// Format a short summary like "1 pose, 17 landmarks".
    #[must_use]
    pub fn summary(&self) -> String {
        if self.poses.is_empty() {
            return "(no detections)".to_string();
        }
        let landmarks: usize = self.poses.iter().map(LandmarkSet::len).sum();
        let noun = if self.poses.len() == 1 { "pose" } else { "poses" };
        format!("{} {noun}, {landmarks} landmarks", self.poses.len())
    }
}
