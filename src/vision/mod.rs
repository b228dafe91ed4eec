//! Vision/OCR Layer
//!
//! Produces raw text detections for an image. The plate selector only sees the
//! [`OcrProvider`] trait; the shipped provider is PaddleOCR (DBNet detection +
//! CRNN recognition) run through ONNX Runtime.

pub mod models;
pub mod ocr;
pub mod postprocess;
pub mod preprocess;

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::plate::Detection;

pub use models::{ModelManager, ModelPaths, ModelStatus, ModelType, OnnxSession};
pub use ocr::{OcrEngine, OcrResult};

/// Source of raw text detections for an image
pub trait OcrProvider {
    /// Run OCR on the image at `image` and return detections in emission order
    fn detect(&self, image: &Path) -> Result<Vec<Detection>>;
}

impl<P: OcrProvider + ?Sized> OcrProvider for &P {
    fn detect(&self, image: &Path) -> Result<Vec<Detection>> {
        (**self).detect(image)
    }
}

impl<P: OcrProvider + ?Sized> OcrProvider for Box<P> {
    fn detect(&self, image: &Path) -> Result<Vec<Detection>> {
        (**self).detect(image)
    }
}

/// Settings for the PaddleOCR provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Models directory, `None` for the per-user data directory
    pub models_dir: Option<PathBuf>,
    /// Refuse to download missing models
    pub offline: bool,
    /// Whether to use GPU acceleration when available
    pub use_gpu: bool,
    /// Intra-op threads per ONNX session
    pub intra_threads: usize,
    /// Longest image side fed to the detection model
    pub det_limit_side_len: u32,
    /// Probability above which a map pixel counts as text
    pub det_threshold: f32,
    /// Minimum mean probability of a text box
    pub box_threshold: f32,
    /// Box expansion ratio applied after thresholding
    pub unclip_ratio: f32,
    /// Boxes with a shorter side (map pixels) are discarded
    pub min_box_size: u32,
    /// Input height of the recognition model
    pub rec_image_height: u32,
    /// Maximum input width of the recognition model
    pub rec_max_width: u32,
    /// Recognized texts below this confidence are dropped
    pub min_confidence: f32,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            models_dir: None,
            offline: false,
            use_gpu: false,
            intra_threads: 4,
            det_limit_side_len: 960,
            det_threshold: 0.3,
            box_threshold: 0.6,
            unclip_ratio: 1.5,
            min_box_size: 3,
            rec_image_height: 48,
            rec_max_width: 320,
            min_confidence: 0.0,
        }
    }
}

/// Convert a bounding box (x, y, width, height) to its four corners, clockwise from top-left
pub fn bounds_to_polygon(bounds: (u32, u32, u32, u32)) -> Vec<(f32, f32)> {
    let (x, y, w, h) = bounds;
    let (x0, y0) = (x as f32, y as f32);
    let (x1, y1) = ((x + w) as f32, (y + h) as f32);
    vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Detection>);

    impl OcrProvider for Fixed {
        fn detect(&self, _image: &Path) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = OcrSettings::default();
        assert!(settings.models_dir.is_none());
        assert!(!settings.offline);
        assert!(!settings.use_gpu);
        assert_eq!(settings.det_limit_side_len, 960);
        assert_eq!(settings.rec_image_height, 48);
        assert!((settings.det_threshold - 0.3).abs() < 0.001);
        assert!((settings.unclip_ratio - 1.5).abs() < 0.001);
        assert_eq!(settings.min_confidence, 0.0);
    }

    #[test]
    fn test_bounds_to_polygon() {
        let polygon = bounds_to_polygon((10, 20, 30, 5));
        assert_eq!(polygon, vec![(10.0, 20.0), (40.0, 20.0), (40.0, 25.0), (10.0, 25.0)]);
    }

    #[test]
    fn test_provider_through_box_and_reference() {
        let provider = Fixed(vec![Detection::new("ab12", 0.5)]);
        let boxed: Box<dyn OcrProvider> = Box::new(Fixed(vec![Detection::new("cd34", 0.5)]));

        fn first_text<P: OcrProvider>(provider: P) -> String {
            provider.detect(Path::new("x.jpg")).unwrap()[0].text.clone()
        }

        assert_eq!(first_text(&provider), "ab12");
        assert_eq!(first_text(boxed), "cd34");
    }
}
