//! OCR (Optical Character Recognition) module
//!
//! Uses PaddleOCR models via ONNX Runtime for text detection and recognition.

use std::path::Path;

use anyhow::{bail, Context, Result};
use image::{DynamicImage, RgbImage};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use super::models::{ModelManager, ModelPaths, OnnxSession};
use super::postprocess::{self, BoxParams, MapGeometry, TextBox};
use super::preprocess;
use super::{bounds_to_polygon, OcrProvider, OcrSettings};
use crate::plate::Detection;

/// OCR engine using PaddleOCR via ONNX Runtime
pub struct OcrEngine {
    detector: Mutex<OnnxSession>,
    recognizer: Mutex<OnnxSession>,
    dictionary: Vec<String>,
    settings: OcrSettings,
}

impl OcrEngine {
    /// Initialize OCR engine from a complete model set
    pub fn new(paths: &ModelPaths, settings: OcrSettings) -> Result<Self> {
        let open = |path: &Path| {
            if settings.use_gpu {
                OnnxSession::new_with_gpu(path, settings.intra_threads)
            } else {
                OnnxSession::new(path, settings.intra_threads)
            }
        };

        let detector = open(paths.detection.as_path())?;
        let recognizer = open(paths.recognition.as_path())?;

        let content = std::fs::read_to_string(&paths.dictionary)
            .with_context(|| format!("Failed to read recognition dictionary {:?}", paths.dictionary))?;
        let dictionary = postprocess::parse_dictionary(&content);
        if dictionary.len() <= 2 {
            bail!("Recognition dictionary {:?} is empty", paths.dictionary);
        }

        info!("OCR engine ready ({} symbols)", dictionary.len() - 2);

        Ok(Self {
            detector: Mutex::new(detector),
            recognizer: Mutex::new(recognizer),
            dictionary,
            settings,
        })
    }

    /// Locate (downloading if allowed) the models and initialize the engine
    pub fn from_settings(settings: &OcrSettings) -> Result<Self> {
        let manager = match &settings.models_dir {
            Some(dir) => ModelManager::with_dir(dir.clone())?,
            None => ModelManager::new()?,
        }
        .with_offline(settings.offline);

        let paths = manager.ensure_all_models()?;
        Self::new(&paths, settings.clone())
    }

    /// Run OCR on a decoded image
    pub fn recognize_image(&self, image: &DynamicImage) -> Result<Vec<OcrResult>> {
        let rgb = image.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Ok(Vec::new());
        }

        let boxes = self.detect_text_boxes(&rgb)?;
        debug!("Detected {} text boxes", boxes.len());

        let mut results = Vec::with_capacity(boxes.len());
        for text_box in boxes {
            let crop = preprocess::crop(&rgb, text_box.bounds);
            let (text, confidence) = self.recognize_crop(&crop)?;
            trace!("Box {:?} -> {:?} ({:.3})", text_box.bounds, text, confidence);

            if text.trim().is_empty() || confidence < self.settings.min_confidence {
                continue;
            }

            results.push(OcrResult {
                text,
                polygon: bounds_to_polygon(text_box.bounds),
                confidence,
            });
        }

        Ok(results)
    }

    fn detect_text_boxes(&self, image: &RgbImage) -> Result<Vec<TextBox>> {
        let input = preprocess::preprocess_for_detection(image, self.settings.det_limit_side_len);
        let shape = input.tensor.shape().to_vec();
        let data = input.tensor.into_raw_vec_and_offset().0;

        let (output_shape, probabilities) = self.detector.lock().run_single(&shape, data)?;

        // [1, 1, H, W]
        let (map_height, map_width) = match output_shape.as_slice() {
            [.., h, w] => (*h as u32, *w as u32),
            _ => bail!("Unexpected detection output shape {:?}", output_shape),
        };

        let geometry = MapGeometry {
            map_width,
            map_height,
            scale_x: input.scale_x,
            scale_y: input.scale_y,
            image_width: image.width(),
            image_height: image.height(),
        };
        let params = BoxParams {
            threshold: self.settings.det_threshold,
            box_threshold: self.settings.box_threshold,
            unclip_ratio: self.settings.unclip_ratio,
            min_size: self.settings.min_box_size,
        };

        Ok(postprocess::extract_boxes(&probabilities, &geometry, &params))
    }

    fn recognize_crop(&self, crop: &RgbImage) -> Result<(String, f32)> {
        let tensor = preprocess::preprocess_for_recognition(
            crop,
            self.settings.rec_image_height,
            self.settings.rec_max_width,
        );
        let shape = tensor.shape().to_vec();
        let data = tensor.into_raw_vec_and_offset().0;

        let (output_shape, logits) = self.recognizer.lock().run_single(&shape, data)?;

        // [1, T, V]
        let (timesteps, vocab_size) = match output_shape.as_slice() {
            [_, t, v] => (*t, *v),
            _ => bail!("Unexpected recognition output shape {:?}", output_shape),
        };

        Ok(postprocess::ctc_greedy_decode(&logits, timesteps, vocab_size, &self.dictionary))
    }
}

impl OcrProvider for OcrEngine {
    fn detect(&self, image: &Path) -> Result<Vec<Detection>> {
        let decoded = image::open(image).with_context(|| format!("Failed to open image {}", image.display()))?;
        debug!("Loaded {} ({}x{})", image.display(), decoded.width(), decoded.height());

        Ok(self
            .recognize_image(&decoded)?
            .into_iter()
            .map(OcrResult::into_detection)
            .collect())
    }
}

/// Single OCR detection result
#[derive(Debug, Clone)]
pub struct OcrResult {
    /// Recognized text
    pub text: String,
    /// Bounding polygon points
    pub polygon: Vec<(f32, f32)>,
    /// Recognition confidence
    pub confidence: f32,
}

impl OcrResult {
    pub fn into_detection(self) -> Detection {
        Detection::new(self.text, self.confidence).with_region(self.polygon)
    }
}
