// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Frame preprocessing for the pose model.
//!
//! Frames are letterboxed into the model's square input: resized to fit while
//! keeping the aspect ratio, centered, and padded with gray. The transform is
//! kept so landmarks can be mapped back to frame pixels.

use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use image::{DynamicImage, GenericImageView};
use ndarray::Array4;

use crate::error::{PoseError, Result};

/// Default letterbox padding color (gray).
pub const LETTERBOX_COLOR: [u8; 3] = [114, 114, 114];

/// Reciprocal of 255 for normalization.
const INV_255: f32 = 1.0 / 255.0;

/// Result of preprocessing a frame.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// NCHW tensor normalized to [0, 1].
    pub tensor: Array4<f32>,
    /// Original frame dimensions (height, width).
    pub orig_shape: (u32, u32),
    /// Scale factors applied (`scale_y`, `scale_x`).
    pub scale: (f32, f32),
    /// Padding applied (`pad_top`, `pad_left`).
    pub padding: (f32, f32),
}

impl PreprocessResult {
    /// Map a point from model input space back to frame pixels, clamped to the
    /// frame bounds.
    #[must_use]
    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        let (scale_y, scale_x) = self.scale;
        let (pad_top, pad_left) = self.padding;
        #[allow(clippy::cast_precision_loss)]
        let (h, w) = (self.orig_shape.0 as f32, self.orig_shape.1 as f32);
        (
            ((x - pad_left) / scale_x).clamp(0.0, w),
            ((y - pad_top) / scale_y).clamp(0.0, h),
        )
    }
}

/// Compute letterbox parameters: (`new_w`, `new_h`, `pad_left`, `pad_top`, (`scale_y`, `scale_x`)).
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn letterbox_params(
    orig_width: u32,
    orig_height: u32,
    target_size: (usize, usize),
) -> (u32, u32, u32, u32, (f32, f32)) {
    let (target_h, target_w) = (target_size.0 as f32, target_size.1 as f32);
    let (orig_h, orig_w) = (orig_height as f32, orig_width as f32);

    let scale = (target_h / orig_h).min(target_w / orig_w);

    let new_w = ((orig_w * scale).round() as u32).max(1);
    let new_h = ((orig_h * scale).round() as u32).max(1);

    let pad_left = (target_size.1 as u32).saturating_sub(new_w) / 2;
    let pad_top = (target_size.0 as u32).saturating_sub(new_h) / 2;

    (
        new_w,
        new_h,
        pad_left,
        pad_top,
        (new_h as f32 / orig_h, new_w as f32 / orig_w),
    )
}

/// Letterbox a frame into a normalized NCHW tensor of `target_size` (height, width).
///
/// # Errors
///
/// Returns an error if the frame is empty or the resize fails.
pub fn preprocess_frame(frame: &DynamicImage, target_size: (usize, usize)) -> Result<PreprocessResult> {
    let (orig_width, orig_height) = frame.dimensions();
    if orig_width == 0 || orig_height == 0 {
        return Err(PoseError::Image("Cannot preprocess an empty frame".to_string()));
    }

    let (new_w, new_h, pad_left, pad_top, scale) =
        letterbox_params(orig_width, orig_height, target_size);

    let src = Image::from_vec_u8(
        orig_width,
        orig_height,
        frame.to_rgb8().into_raw(),
        PixelType::U8x3,
    )
    .map_err(|e| PoseError::Image(format!("Failed to wrap frame for resize: {e}")))?;
    let mut dst = Image::new(new_w, new_h, PixelType::U8x3);

    let options = ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
    Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .map_err(|e| PoseError::Image(format!("Failed to resize frame: {e}")))?;
    let resized = dst.into_vec();

    let (target_h, target_w) = target_size;
    let mut tensor = Array4::<f32>::zeros((1, 3, target_h, target_w));
    for c in 0..3 {
        tensor
            .slice_mut(ndarray::s![0, c, .., ..])
            .fill(f32::from(LETTERBOX_COLOR[c]) * INV_255);
    }

    let (pad_left, pad_top) = (pad_left as usize, pad_top as usize);
    let (new_w, new_h) = (new_w as usize, new_h as usize);
    for y in 0..new_h.min(target_h.saturating_sub(pad_top)) {
        for x in 0..new_w.min(target_w.saturating_sub(pad_left)) {
            let idx = (y * new_w + x) * 3;
            for c in 0..3 {
                tensor[[0, c, y + pad_top, x + pad_left]] = f32::from(resized[idx + c]) * INV_255;
            }
        }
    }

    Ok(PreprocessResult {
        tensor,
        orig_shape: (orig_height, orig_width),
        scale,
        #[allow(clippy::cast_precision_loss)]
        padding: (pad_top as f32, pad_left as f32),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_letterbox_params_wide_frame() {
        let (new_w, new_h, pad_left, pad_top, _) = letterbox_params(1280, 720, (640, 640));
        assert_eq!((new_w, new_h), (640, 360));
        assert_eq!(pad_left, 0);
        assert_eq!(pad_top, 140);
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        let frame = DynamicImage::ImageRgb8(RgbImage::from_pixel(200, 100, image::Rgb([255, 0, 0])));
        let result = preprocess_frame(&frame, (64, 64)).unwrap();
        assert_eq!(result.tensor.shape(), &[1, 3, 64, 64]);
        assert_eq!(result.orig_shape, (100, 200));

        // Top rows are padding, the middle row is image content.
        let pad = f32::from(LETTERBOX_COLOR[0]) * INV_255;
        assert!((result.tensor[[0, 0, 0, 10]] - pad).abs() < 1e-6);
        assert!((result.tensor[[0, 0, 32, 10]] - 1.0).abs() < 1e-2);
        assert!(result.tensor[[0, 1, 32, 10]].abs() < 1e-2);
    }

    #[test]
    fn test_to_frame_inverts_letterbox() {
        let frame = DynamicImage::ImageRgb8(RgbImage::new(200, 100));
        let result = preprocess_frame(&frame, (64, 64)).unwrap();
        // Model center maps to frame center.
        let (x, y) = result.to_frame(32.0, 32.0);
        assert!((x - 100.0).abs() < 1.0);
        assert!((y - 50.0).abs() < 1.0);
        // Points in the padding clamp to the frame.
        let (_, y) = result.to_frame(32.0, 0.0);
        assert!(y.abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty_frame_is_error() {
        let frame = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(preprocess_frame(&frame, (64, 64)), Err(PoseError::Image(_))));
    }
}
