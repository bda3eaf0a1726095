// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Preview window for rendered canvases.

use std::time::{Duration, Instant};

use image::RgbImage;
use minifb::{Key, Window, WindowOptions};

use crate::error::{PoseError, Result};
use crate::visualizer::Color;

/// A simple canvas viewer using minifb.
pub struct Viewer {
    window: Window,
    width: usize,
    height: usize,
    buffer: Vec<u32>,
}

impl Viewer {
    /// Create a new viewer window.
    ///
    /// # Errors
    ///
    /// Returns an error if the window can't be created.
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let mut window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: true,
                ..WindowOptions::default()
            },
        )
        .map_err(|e| PoseError::Visualizer(format!("Failed to create window: {e}")))?;

        window.set_target_fps(60);

        Ok(Self {
            window,
            width,
            height,
            buffer: Vec::new(),
        })
    }

    /// Whether the window is still open and no quit key is held.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.window.is_open()
            && !self.window.is_key_down(Key::Escape)
            && !self.window.is_key_down(Key::Q)
    }

    /// Show a canvas. Returns `Ok(false)` once the user closed the window.
    ///
    /// # Errors
    ///
    /// Returns an error if the window can't be updated.
    pub fn update(&mut self, canvas: &RgbImage) -> Result<bool> {
        if !self.is_open() {
            return Ok(false);
        }

        self.width = canvas.width() as usize;
        self.height = canvas.height() as usize;
        fill_buffer(canvas, &mut self.buffer);

        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)
            .map_err(|e| PoseError::Visualizer(format!("Failed to update window: {e}")))?;
        Ok(true)
    }

    /// Keep the last canvas on screen for `duration`, or until the window
    /// closes. Returns `false` if the window was closed.
    pub fn wait(&mut self, duration: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < duration {
            if !self.is_open() {
                return false;
            }
            if self.buffer.is_empty() {
                self.window.update();
            } else {
                let _ = self
                    .window
                    .update_with_buffer(&self.buffer, self.width, self.height);
            }
        }
        true
    }

    /// Keep the window open until the user closes it.
    pub fn wait_for_close(&mut self) {
        while self.wait(Duration::from_millis(100)) {}
    }
}

/// Pack canvas pixels as `0x00RRGGBB` into `buffer`, replacing its contents.
fn fill_buffer(canvas: &RgbImage, buffer: &mut Vec<u32>) {
    buffer.clear();
    buffer.extend(canvas.pixels().map(|p| Color(p[0], p[1], p[2]).to_u32()));
}
