//! Image preprocessing for OCR models
//!
//! Handles resizing, normalization, and tensor conversion for PaddleOCR models.
//! Both models expect `(pixel / 255.0 - 0.5) / 0.5`, i.e. values in [-1, 1].

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

/// PaddleOCR normalization mean [R, G, B]
pub const PADDLE_MEAN: [f32; 3] = [0.5, 0.5, 0.5];
/// PaddleOCR normalization std [R, G, B]
pub const PADDLE_STD: [f32; 3] = [0.5, 0.5, 0.5];

/// Detection model input with the factors mapping it back to the source image
#[derive(Debug)]
pub struct DetectionInput {
    pub tensor: Array4<f32>,
    /// source width / input width
    pub scale_x: f32,
    /// source height / input height
    pub scale_y: f32,
}

/// Round to the nearest multiple of 32, never below 32
pub fn round_to_multiple_of_32(value: u32) -> u32 {
    (((value + 16) / 32) * 32).max(32)
}

/// Convert an RGB image to a normalized NCHW tensor (batch size 1)
pub fn rgb_to_nchw(image: &RgbImage, mean: &[f32; 3], std: &[f32; 3]) -> Array4<f32> {
    let (w, h) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, h as usize, w as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - mean[c]) / std[c];
        }
    }

    tensor
}

/// Resize so the long side fits `limit_side_len`, with both sides multiples of 32
/// Returns (resized_image, scale_x, scale_y)
pub fn resize_for_detection(image: &RgbImage, limit_side_len: u32) -> (RgbImage, f32, f32) {
    let (w, h) = image.dimensions();
    let long_side = w.max(h);

    let ratio = if long_side > limit_side_len {
        limit_side_len as f32 / long_side as f32
    } else {
        1.0
    };

    let new_w = round_to_multiple_of_32((w as f32 * ratio) as u32);
    let new_h = round_to_multiple_of_32((h as f32 * ratio) as u32);

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    (resized, w as f32 / new_w as f32, h as f32 / new_h as f32)
}

/// Resize a text crop to a fixed height, width proportional and capped
pub fn resize_for_recognition(image: &RgbImage, target_height: u32, max_width: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let ratio = w as f32 / h.max(1) as f32;
    let new_w = ((target_height as f32 * ratio).ceil() as u32).clamp(1, max_width.max(1));

    imageops::resize(image, new_w, target_height, FilterType::Triangle)
}

/// Crop a region (x, y, width, height) from an image, clamped to its bounds
pub fn crop(image: &RgbImage, bounds: (u32, u32, u32, u32)) -> RgbImage {
    let (img_w, img_h) = image.dimensions();
    let (x, y, w, h) = bounds;

    let x = x.min(img_w.saturating_sub(1));
    let y = y.min(img_h.saturating_sub(1));
    let w = w.min(img_w - x).max(1);
    let h = h.min(img_h - y).max(1);

    imageops::crop_imm(image, x, y, w, h).to_image()
}

/// Full preprocessing pipeline for detection
pub fn preprocess_for_detection(image: &RgbImage, limit_side_len: u32) -> DetectionInput {
    let (resized, scale_x, scale_y) = resize_for_detection(image, limit_side_len);
    let tensor = rgb_to_nchw(&resized, &PADDLE_MEAN, &PADDLE_STD);

    DetectionInput {
        tensor,
        scale_x,
        scale_y,
    }
}

/// Full preprocessing pipeline for recognition
pub fn preprocess_for_recognition(crop: &RgbImage, target_height: u32, max_width: u32) -> Array4<f32> {
    let resized = resize_for_recognition(crop, target_height, max_width);
    rgb_to_nchw(&resized, &PADDLE_MEAN, &PADDLE_STD)
}
