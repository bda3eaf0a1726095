// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Capture sources: still images and video streams.
//!
//! Still images are decoded once per selection with [`decode_still`]. Video
//! sources (files, cameras, network streams) are opened once with
//! [`VideoSource::open`] and polled for frames by the loop driver through the
//! [`FrameSource`] trait.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::error::{PoseError, Result};

/// A single decoded RGB picture.
pub type Frame = DynamicImage;

/// Still-image extensions accepted by [`decode_still`].
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "webp", "tiff", "tif"];

/// Video container extensions recognized when parsing a source string.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mov", "mkv", "wmv", "flv", "webm", "m4v", "mpeg", "mpg",
];

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Path to a still image.
    Image(PathBuf),
    /// Path to a video file.
    Video(PathBuf),
    /// Camera device index.
    Camera(u32),
    /// Network stream URL (RTSP, RTMP, HTTP).
    Stream(String),
}

impl Source {
    /// Check if this source is a still image.
    #[must_use]
    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }

    /// Check if this source produces a continuous stream of frames.
    #[must_use]
    pub const fn is_video(&self) -> bool {
        !self.is_image()
    }

    /// Get the path if this source has one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Image(p) | Self::Video(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(p) | Self::Video(p) => write!(f, "{}", p.display()),
            Self::Camera(idx) => write!(f, "camera {idx}"),
            Self::Stream(url) => write!(f, "{url}"),
        }
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        if let Ok(idx) = s.parse::<u32>() {
            return Self::Camera(idx);
        }

        if ["rtsp://", "rtmp://", "http://", "https://"]
            .iter()
            .any(|scheme| s.starts_with(scheme))
        {
            return Self::Stream(s.to_string());
        }

        let path = PathBuf::from(s);
        if has_extension(&path, VIDEO_EXTENSIONS) {
            return Self::Video(path);
        }
        Self::Image(path)
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<u32> for Source {
    fn from(idx: u32) -> Self {
        Self::Camera(idx)
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Check if a path has a supported still-image extension.
#[must_use]
pub fn is_image_file(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

/// Decode a still image from disk.
///
/// JPEG files go through `jpeg-decoder` first, other formats (and JPEGs it
/// can't handle) through `image`.
///
/// # Errors
///
/// Returns an error if the file is missing, has an unsupported extension or
/// fails to decode.
pub fn decode_still(path: &Path) -> Result<Frame> {
    if !path.exists() {
        return Err(PoseError::Image(format!("File not found: {}", path.display())));
    }
    if !is_image_file(path) {
        return Err(PoseError::Image(format!(
            "Unsupported image format: {}",
            path.display()
        )));
    }

    if has_extension(path, &["jpg", "jpeg"])
        && let Some(frame) = decode_jpeg(path)
    {
        return Ok(frame);
    }

    image::open(path)
        .map_err(|e| PoseError::Image(format!("Failed to decode {}: {e}", path.display())))
}

/// Fast path for baseline RGB and grayscale JPEGs.
fn decode_jpeg(path: &Path) -> Option<Frame> {
    let file = File::open(path).ok()?;
    let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(file));
    let pixels = decoder.decode().ok()?;
    let info = decoder.info()?;
    let (width, height) = (u32::from(info.width), u32::from(info.height));

    match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => {
            image::RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
        }
        jpeg_decoder::PixelFormat::L8 => {
            image::GrayImage::from_raw(width, height, pixels).map(DynamicImage::ImageLuma8)
        }
        _ => None,
    }
}

/// A stream of frames polled by the video loop.
pub trait FrameSource {
    /// Read the next frame.
    ///
    /// `None` marks the end of the stream. `Some(Err(_))` is a failed read;
    /// the caller may try again on the next cycle.
    fn next_frame(&mut self) -> Option<Result<Frame>>;
}

/// One-shot readiness notification.
///
/// Fires on the first successfully decoded frame and never again.
#[derive(Default)]
pub struct ReadySignal {
    fired: bool,
    listener: Option<Box<dyn FnOnce() + Send>>,
}

impl ReadySignal {
    /// Create an unfired signal with no listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `listener` when the signal fires.
    #[must_use]
    pub fn with_listener<F: FnOnce() + Send + 'static>(mut self, listener: F) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Fire the signal. Returns `true` only on the first call.
    pub fn fire(&mut self) -> bool {
        if self.fired {
            return false;
        }
        self.fired = true;
        if let Some(listener) = self.listener.take() {
            listener();
        }
        true
    }

    /// Whether the signal has fired.
    #[must_use]
    pub const fn is_fired(&self) -> bool {
        self.fired
    }
}

impl fmt::Debug for ReadySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadySignal").field("fired", &self.fired).finish()
    }
}

/// Capture device node for a camera index.
///
/// Camera indices map to V4L2 nodes (`/dev/videoN`), which FFmpeg probes with
/// its `v4l2` demuxer. Other platforms have no such node; use a stream URL or
/// a video file there.
///
/// # Errors
///
/// Returns an error if the platform has no V4L2 devices or the node is missing.
pub fn camera_device(index: u32) -> Result<PathBuf> {
    if !cfg!(target_os = "linux") {
        return Err(PoseError::Video(format!(
            "Camera {index}: camera indices are only supported on Linux (V4L2); pass a stream URL or video file instead"
        )));
    }
    let device = PathBuf::from(format!("/dev/video{index}"));
    if !device.exists() {
        return Err(PoseError::Video(format!(
            "Camera {index} not found at {}",
            device.display()
        )));
    }
    Ok(device)
}

/// A decoded video file, camera or network stream.
pub struct VideoSource {
    source: Source,
    frames_read: usize,
    #[cfg(feature = "video")]
    decoder: video_rs::decode::Decoder,
}

impl VideoSource {
    /// Open a video source.
    ///
    /// Files and network streams work wherever FFmpeg can read them. Cameras
    /// are Linux only: the index is resolved with [`camera_device`] and opened
    /// as a V4L2 node.
    ///
    /// # Errors
    ///
    /// Returns an error if the source is a still image, the device or file
    /// can't be opened, or the crate was built without the `video` feature.
    #[cfg(feature = "video")]
    pub fn open(source: Source) -> Result<Self> {
        use video_rs::Location;

        let location: Location = match &source {
            Source::Image(p) => {
                return Err(PoseError::Video(format!(
                    "{} is a still image, not a video source",
                    p.display()
                )));
            }
            Source::Video(p) => Location::from(p.clone()),
            Source::Camera(idx) => Location::from(camera_device(*idx)?),
            Source::Stream(url) => url
                .parse::<video_rs::Url>()
                .map(Location::from)
                .map_err(|e| PoseError::Video(format!("Invalid stream URL {url}: {e}")))?,
        };

        video_rs::init().map_err(|e| PoseError::Video(format!("Failed to init ffmpeg: {e}")))?;
        let decoder = video_rs::decode::Decoder::new(location)
            .map_err(|e| PoseError::Video(format!("Failed to open {source}: {e}")))?;

        Ok(Self {
            source,
            frames_read: 0,
            decoder,
        })
    }

    /// Open a video source.
    ///
    /// # Errors
    ///
    /// Always fails: video decoding requires the `video` feature.
    #[cfg(not(feature = "video"))]
    pub fn open(source: Source) -> Result<Self> {
        let _ = source;
        Err(PoseError::FeatureNotEnabled(
            "Video support requires the 'video' feature".to_string(),
        ))
    }

    /// The source this stream was opened from.
    #[must_use]
    pub const fn source(&self) -> &Source {
        &self.source
    }

    /// Number of frames decoded so far.
    #[must_use]
    pub const fn frames_read(&self) -> usize {
        self.frames_read
    }

    /// Native frame rate, when the container reports one.
    #[must_use]
    pub fn frame_rate(&self) -> Option<f32> {
        #[cfg(feature = "video")]
        {
            let fps = self.decoder.frame_rate();
            (fps > 0.0).then_some(fps)
        }
        #[cfg(not(feature = "video"))]
        {
            None
        }
    }
}

impl FrameSource for VideoSource {
    #[cfg(feature = "video")]
    fn next_frame(&mut self) -> Option<Result<Frame>> {
        match self.decoder.decode() {
            Ok((_ts, frame)) => {
                self.frames_read += 1;
                Some(video_frame_to_image(&frame))
            }
            Err(video_rs::Error::ReadExhausted | video_rs::Error::DecodeExhausted) => None,
            Err(e) => Some(Err(PoseError::Video(format!("Failed to decode frame: {e}")))),
        }
    }

    #[cfg(not(feature = "video"))]
    fn next_frame(&mut self) -> Option<Result<Frame>> {
        None
    }
}

impl fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoSource")
            .field("source", &self.source)
            .field("frames_read", &self.frames_read)
            .finish_non_exhaustive()
    }
}

/// Convert an HWC `video_rs` frame into an RGB image.
#[cfg(feature = "video")]
fn video_frame_to_image(frame: &video_rs::Frame) -> Result<Frame> {
    let shape = frame.shape();
    let height = u32::try_from(shape[0])
        .map_err(|_| PoseError::Image("Frame height exceeds u32::MAX".to_string()))?;
    let width = u32::try_from(shape[1])
        .map_err(|_| PoseError::Image("Frame width exceeds u32::MAX".to_string()))?;

    let data: Vec<u8> = frame.iter().copied().collect();
    image::RgbImage::from_raw(width, height, data)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| PoseError::Image("Failed to create image from video frame".to_string()))
}
