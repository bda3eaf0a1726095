// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Skeleton overlay rendering.
//!
//! Every call to [`Renderer::render`] redraws the whole canvas in a fixed
//! order: clear to the base color, draw the background frame (if any), draw
//! all connectors of every body, then all points of every body. Nothing from a
//! previous call survives.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut};
use imageproc::point::Point;

use crate::error::{PoseError, Result};
use crate::landmarks::{DetectionResult, Landmark};
use crate::mode::RunningMode;
use crate::source::Frame;
use crate::visualizer::{Color, SKELETON};

/// Canvas size for a still image of `width`×`height` shown at `display_height`.
///
/// The width keeps the aspect ratio and is rounded down: 1920×1080 at 480
/// gives 853×480.
#[must_use]
pub fn canvas_size_for_still(width: u32, height: u32, display_height: u32) -> (u32, u32) {
    if height == 0 {
        return (0, display_height);
    }
    let scaled = u64::from(width) * u64::from(display_height) / u64::from(height);
    (u32::try_from(scaled).unwrap_or(u32::MAX), display_height)
}

/// The drawing surface.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbImage,
    base: Color,
}

impl Canvas {
    /// Create a canvas cleared to black.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_base(width, height, Color::BLACK)
    }

    /// Create a canvas cleared to `base`.
    #[must_use]
    pub fn with_base(width: u32, height: u32, base: Color) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, base.to_rgb()),
            base,
        }
    }

    /// Canvas width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Canvas height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Canvas size as (width, height).
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Base color the canvas is cleared to.
    #[must_use]
    pub const fn base(&self) -> Color {
        self.base
    }

    /// Resize the canvas. The contents are cleared.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.size() != (width, height) {
            self.image = RgbImage::from_pixel(width, height, self.base.to_rgb());
        } else {
            self.clear();
        }
    }

    /// Fill the canvas with the base color.
    pub fn clear(&mut self) {
        let base = self.base.to_rgb();
        self.image.pixels_mut().for_each(|p| *p = base);
    }

    /// Whether every pixel equals the base color.
    #[must_use]
    pub fn is_clear(&self) -> bool {
        let base = self.base.to_rgb();
        self.image.pixels().all(|p| *p == base)
    }

    /// The rendered pixels.
    #[must_use]
    pub const fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Write the canvas to an image file; the format follows the extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be encoded or written.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.image
            .save(path)
            .map_err(|e| PoseError::Image(format!("Failed to save {}: {e}", path.display())))
    }
}

/// Color and width of one kind of primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stroke {
    /// Draw color.
    pub color: Color,
    /// Line width in pixels.
    pub line_width: u32,
}

impl Stroke {
    /// Create a stroke.
    #[must_use]
    pub const fn new(color: Color, line_width: u32) -> Self {
        Self { color, line_width }
    }

    /// Radius of a landmark point drawn with this stroke.
    #[must_use]
    pub const fn point_radius(&self) -> u32 {
        self.line_width + 2
    }
}

/// Styling of connectors and points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStyle {
    /// Connector (bone) stroke.
    pub connector: Stroke,
    /// Landmark point stroke.
    pub point: Stroke,
    /// Landmarks below this visibility are not drawn, nor are their connectors.
    pub min_visibility: f32,
}

impl RenderStyle {
    /// Still-image style: green connectors of width 2, red points of width 1.
    #[must_use]
    pub const fn image_mode() -> Self {
        Self {
            connector: Stroke::new(Color::GREEN, 2),
            point: Stroke::new(Color::RED, 1),
            min_visibility: 0.0,
        }
    }

    /// Live video style: green connectors of width 5, red points of width 2.
    #[must_use]
    pub const fn video_mode() -> Self {
        Self {
            connector: Stroke::new(Color::GREEN, 5),
            point: Stroke::new(Color::RED, 2),
            min_visibility: 0.0,
        }
    }

    /// Default style for a running mode.
    #[must_use]
    pub const fn for_mode(mode: RunningMode) -> Self {
        match mode {
            RunningMode::Image => Self::image_mode(),
            RunningMode::Video => Self::video_mode(),
        }
    }

    /// Hide landmarks below `threshold`.
    #[must_use]
    pub const fn with_min_visibility(mut self, threshold: f32) -> Self {
        self.min_visibility = threshold;
        self
    }
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self::image_mode()
    }
}

/// Number of primitives issued by one render call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Connector draws.
    pub connectors: usize,
    /// Point draws.
    pub points: usize,
}

impl RenderStats {
    /// Total draws.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.connectors + self.points
    }
}

/// Draws detection results onto a [`Canvas`].
#[derive(Debug, Clone)]
pub struct Renderer {
    style: RenderStyle,
    connections: &'static [[usize; 2]],
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(RenderStyle::default())
    }
}

impl Renderer {
    /// Create a renderer using the COCO-17 skeleton.
    #[must_use]
    pub const fn new(style: RenderStyle) -> Self {
        Self {
            style,
            connections: &SKELETON,
        }
    }

    /// Use a different connector topology.
    #[must_use]
    pub const fn with_connections(mut self, connections: &'static [[usize; 2]]) -> Self {
        self.connections = connections;
        self
    }

    /// Replace the connector topology.
    pub fn set_connections(&mut self, connections: &'static [[usize; 2]]) {
        self.connections = connections;
    }

    /// Current style.
    #[must_use]
    pub const fn style(&self) -> &RenderStyle {
        &self.style
    }

    /// Current connector topology.
    #[must_use]
    pub const fn connections(&self) -> &'static [[usize; 2]] {
        self.connections
    }

    /// Redraw the canvas for one cycle.
    ///
    /// Landmarks are scaled from the result's frame size to the canvas size.
    pub fn render(
        &self,
        canvas: &mut Canvas,
        background: Option<&Frame>,
        result: &DetectionResult,
    ) -> RenderStats {
        canvas.clear();
        if let Some(frame) = background {
            draw_background(canvas, frame);
        }

        let (sx, sy) = scale_factors(result.frame_size, canvas.size());
        let mut stats = RenderStats::default();

        for set in result.iter() {
            let set = set.scaled(sx, sy);
            for &[a, b] in self.connections {
                let (Some(from), Some(to)) = (set.get(a), set.get(b)) else {
                    continue;
                };
                if !self.is_shown(from) || !self.is_shown(to) {
                    continue;
                }
                draw_connector(&mut canvas.image, from, to, self.style.connector);
                stats.connectors += 1;
            }
        }

        for set in result.iter() {
            let set = set.scaled(sx, sy);
            for landmark in set.iter().filter(|l| self.is_shown(l)) {
                draw_point(&mut canvas.image, landmark, self.style.point);
                stats.points += 1;
            }
        }

        stats
    }

    fn is_shown(&self, landmark: &Landmark) -> bool {
        landmark.visibility >= self.style.min_visibility
    }
}

#[allow(clippy::cast_precision_loss)]
fn scale_factors(frame_size: (u32, u32), canvas_size: (u32, u32)) -> (f32, f32) {
    let (fw, fh) = frame_size;
    let (cw, ch) = canvas_size;
    if fw == 0 || fh == 0 {
        return (1.0, 1.0);
    }
    (cw as f32 / fw as f32, ch as f32 / fh as f32)
}

fn draw_background(canvas: &mut Canvas, frame: &Frame) {
    let (w, h) = canvas.size();
    let rgb = frame.to_rgb8();
    canvas.image = if rgb.dimensions() == (w, h) {
        rgb
    } else {
        imageops::resize(&rgb, w, h, FilterType::Triangle)
    };
}

/// Draw a line segment; widths above 1 are drawn as a filled quad.
fn draw_connector(image: &mut RgbImage, from: &Landmark, to: &Landmark, stroke: Stroke) {
    let color = stroke.color.to_rgb();
    if stroke.line_width <= 1 {
        draw_line_segment_mut(image, (from.x, from.y), (to.x, to.y), color);
        return;
    }

    #[allow(clippy::cast_precision_loss)]
    let half = stroke.line_width as f32 / 2.0;
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let len = dx.hypot(dy);
    if len < 0.5 {
        #[allow(clippy::cast_possible_truncation)]
        draw_filled_circle_mut(image, (from.x.round() as i32, from.y.round() as i32), half.round() as i32, color);
        return;
    }

    let (nx, ny) = (-dy / len * half, dx / len * half);
    #[allow(clippy::cast_possible_truncation)]
    let corner = |x: f32, y: f32| Point::new(x.round() as i32, y.round() as i32);
    let quad = [
        corner(from.x + nx, from.y + ny),
        corner(to.x + nx, to.y + ny),
        corner(to.x - nx, to.y - ny),
        corner(from.x - nx, from.y - ny),
    ];
    if quad[0] == quad[3] {
        draw_line_segment_mut(image, (from.x, from.y), (to.x, to.y), color);
    } else {
        draw_polygon_mut(image, &quad, color);
    }
}

fn draw_point(image: &mut RgbImage, landmark: &Landmark, stroke: Stroke) {
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    draw_filled_circle_mut(
        image,
        (landmark.x.round() as i32, landmark.y.round() as i32),
        stroke.point_radius() as i32,
        stroke.color.to_rgb(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{LandmarkSet, Speed};
    use image::{DynamicImage, Rgb};

    fn full_body(frame: (u32, u32)) -> DetectionResult {
        let landmarks = (0..17)
            .map(|i| Landmark::new(10.0 + 5.0 * i as f32, 20.0 + 3.0 * i as f32, 0.9))
            .collect();
        DetectionResult::new(vec![LandmarkSet::new(landmarks, 0.9)], frame, Speed::default())
    }

    #[test]
    fn test_canvas_size_for_still() {
        assert_eq!(canvas_size_for_still(1920, 1080, 480), (853, 480));
        assert_eq!(canvas_size_for_still(640, 480, 480), (640, 480));
        assert_eq!(canvas_size_for_still(1080, 1920, 480), (270, 480));
        assert_eq!(canvas_size_for_still(100, 0, 480), (0, 480));
    }

    #[test]
    fn test_full_set_draws_m_connectors_and_k_points() {
        let renderer = Renderer::new(RenderStyle::video_mode());
        let mut canvas = Canvas::new(200, 200);
        let stats = renderer.render(&mut canvas, None, &full_body((200, 200)));
        assert_eq!(stats.connectors, SKELETON.len());
        assert_eq!(stats.points, 17);
        assert!(!canvas.is_clear());
    }

    #[test]
    fn test_custom_topology_counts() {
        static LINE: [[usize; 2]; 2] = [[0, 1], [1, 2]];
        let renderer = Renderer::default().with_connections(&LINE);
        let set = LandmarkSet::new(
            vec![
                Landmark::new(5.0, 5.0, 1.0),
                Landmark::new(20.0, 5.0, 1.0),
                Landmark::new(20.0, 20.0, 1.0),
            ],
            1.0,
        );
        let result = DetectionResult::new(vec![set.clone(), set], (32, 32), Speed::default());
        let mut canvas = Canvas::new(32, 32);
        let stats = renderer.render(&mut canvas, None, &result);
        assert_eq!(stats, RenderStats { connectors: 4, points: 6 });
    }

    #[test]
    fn test_empty_result_draws_nothing() {
        let renderer = Renderer::default();
        let mut canvas = Canvas::new(64, 48);
        let stats = renderer.render(&mut canvas, None, &DetectionResult::empty((64, 48)));
        assert_eq!(stats.total(), 0);
        assert!(canvas.is_clear());
    }

    #[test]
    fn test_empty_after_full_restores_base() {
        let renderer = Renderer::new(RenderStyle::video_mode());
        let mut canvas = Canvas::new(200, 200);
        renderer.render(&mut canvas, None, &full_body((200, 200)));
        assert!(!canvas.is_clear());

        renderer.render(&mut canvas, None, &DetectionResult::empty((200, 200)));
        assert!(canvas.is_clear());
    }

    #[test]
    fn test_background_only_when_no_bodies() {
        let frame = DynamicImage::ImageRgb8(RgbImage::from_pixel(1920, 1080, Rgb([10, 20, 30])));
        let (w, h) = canvas_size_for_still(1920, 1080, 480);
        let mut canvas = Canvas::new(w, h);

        let stats = Renderer::default().render(
            &mut canvas,
            Some(&frame),
            &DetectionResult::empty((1920, 1080)),
        );
        assert_eq!(stats.total(), 0);
        assert_eq!(canvas.size(), (853, 480));
        assert!(canvas.image().pixels().all(|p| *p == Rgb([10, 20, 30])));
    }

    #[test]
    fn test_landmarks_scaled_to_canvas() {
        static NONE: [[usize; 2]; 0] = [];
        let renderer = Renderer::default().with_connections(&NONE);
        let set = LandmarkSet::new(vec![Landmark::new(1000.0, 500.0, 1.0)], 1.0);
        let result = DetectionResult::new(vec![set], (2000, 1000), Speed::default());
        let mut canvas = Canvas::new(200, 100);
        renderer.render(&mut canvas, None, &result);
        assert_eq!(*canvas.image().get_pixel(100, 50), Color::RED.to_rgb());
        assert_eq!(*canvas.image().get_pixel(0, 0), Color::BLACK.to_rgb());
    }

    #[test]
    fn test_min_visibility_hides_landmarks() {
        let style = RenderStyle::image_mode().with_min_visibility(0.95);
        let stats = Renderer::new(style).render(&mut Canvas::new(200, 200), None, &full_body((200, 200)));
        assert_eq!(stats.total(), 0);
    }

    #[test]
    fn test_out_of_range_indices_skipped() {
        let set = LandmarkSet::new(vec![Landmark::new(5.0, 5.0, 1.0); 5], 1.0);
        let result = DetectionResult::new(vec![set], (64, 64), Speed::default());
        let stats = Renderer::default().render(&mut Canvas::new(64, 64), None, &result);
        // Only pairs within the first five landmarks: eyes, nose-eyes, eye-ears.
        assert_eq!(stats.connectors, 5);
        assert_eq!(stats.points, 5);
    }

    #[test]
    fn test_style_defaults() {
        let image = RenderStyle::for_mode(RunningMode::Image);
        assert_eq!(image.connector, Stroke::new(Color::GREEN, 2));
        assert_eq!(image.point, Stroke::new(Color::RED, 1));
        let video = RenderStyle::for_mode(RunningMode::Video);
        assert_eq!(video.connector.line_width, 5);
        assert_eq!(video.point.line_width, 2);
        assert_eq!(video.point.point_radius(), 4);
    }
}
