//! Post-processing for PaddleOCR model outputs
//!
//! - Text boxes from the DBNet probability map (threshold, connected
//!   components, score filter, unclip)
//! - Greedy CTC decoding of recognition logits

use std::collections::BTreeMap;

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Rows whose top edges differ by less than this are read left to right
const SAME_LINE_TOLERANCE: u32 = 10;

/// Text box in source image coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct TextBox {
    /// Bounding box (x, y, width, height)
    pub bounds: (u32, u32, u32, u32),
    /// Mean text probability inside the component
    pub score: f32,
}

/// Thresholds for box extraction
#[derive(Debug, Clone, Copy)]
pub struct BoxParams {
    pub threshold: f32,
    pub box_threshold: f32,
    pub unclip_ratio: f32,
    pub min_size: u32,
}

/// Geometry of a probability map relative to its source image
#[derive(Debug, Clone, Copy)]
pub struct MapGeometry {
    pub map_width: u32,
    pub map_height: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub image_width: u32,
    pub image_height: u32,
}

#[derive(Debug, Clone, Copy)]
struct Component {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    score_sum: f32,
    pixels: u32,
}

impl Component {
    fn new(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            score_sum: 0.0,
            pixels: 0,
        }
    }

    fn add(&mut self, x: u32, y: u32, score: f32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.score_sum += score;
        self.pixels += 1;
    }

    fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    fn mean_score(&self) -> f32 {
        self.score_sum / self.pixels.max(1) as f32
    }
}

/// Extract text boxes from a `[map_height, map_width]` probability map
pub fn extract_boxes(probabilities: &[f32], geometry: &MapGeometry, params: &BoxParams) -> Vec<TextBox> {
    let (w, h) = (geometry.map_width, geometry.map_height);
    if probabilities.len() < (w as usize) * (h as usize) {
        return Vec::new();
    }

    let prob_at = |x: u32, y: u32| probabilities[(y * w + x) as usize];

    let mask = GrayImage::from_fn(w, h, |x, y| {
        if prob_at(x, y) > params.threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });

    let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    let mut components: BTreeMap<u32, Component> = BTreeMap::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue;
        }
        components
            .entry(label)
            .or_insert_with(|| Component::new(x, y))
            .add(x, y, prob_at(x, y));
    }

    let mut boxes: Vec<TextBox> = components
        .values()
        .filter(|c| c.width().min(c.height()) >= params.min_size)
        .filter(|c| c.mean_score() >= params.box_threshold)
        .filter_map(|c| unclip_and_scale(c, geometry, params.unclip_ratio))
        .collect();

    sort_reading_order(&mut boxes);
    boxes
}

/// Expand a component box by `area * ratio / perimeter` and map it to source coordinates
fn unclip_and_scale(component: &Component, geometry: &MapGeometry, unclip_ratio: f32) -> Option<TextBox> {
    let w = component.width() as f32;
    let h = component.height() as f32;
    let offset = (w * h * unclip_ratio) / (2.0 * (w + h));

    let x0 = (component.min_x as f32 - offset) * geometry.scale_x;
    let y0 = (component.min_y as f32 - offset) * geometry.scale_y;
    let x1 = (component.max_x as f32 + 1.0 + offset) * geometry.scale_x;
    let y1 = (component.max_y as f32 + 1.0 + offset) * geometry.scale_y;

    let x0 = x0.clamp(0.0, geometry.image_width as f32) as u32;
    let y0 = y0.clamp(0.0, geometry.image_height as f32) as u32;
    let x1 = x1.clamp(0.0, geometry.image_width as f32) as u32;
    let y1 = y1.clamp(0.0, geometry.image_height as f32) as u32;

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    Some(TextBox {
        bounds: (x0, y0, x1 - x0, y1 - y0),
        score: component.mean_score(),
    })
}

/// Top-to-bottom, then left-to-right for boxes on the same line
pub fn sort_reading_order(boxes: &mut [TextBox]) {
    boxes.sort_by_key(|b| (b.bounds.1, b.bounds.0));

    for i in 0..boxes.len().saturating_sub(1) {
        for j in (0..=i).rev() {
            let (a, b) = (&boxes[j].bounds, &boxes[j + 1].bounds);
            if b.1.abs_diff(a.1) < SAME_LINE_TOLERANCE && b.0 < a.0 {
                boxes.swap(j, j + 1);
            } else {
                break;
            }
        }
    }
}

/// Load a recognition dictionary: blank at index 0, one symbol per line, trailing space
pub fn parse_dictionary(content: &str) -> Vec<String> {
    let mut symbols = vec!["blank".to_string()];
    symbols.extend(
        content
            .lines()
            .map(|line| line.trim_end_matches('\r').to_string())
            .filter(|line| !line.is_empty()),
    );
    symbols.push(" ".to_string());
    symbols
}

/// Greedy CTC decode of `[timesteps, vocab_size]` logits
/// Returns (text, mean confidence of the kept symbols)
pub fn ctc_greedy_decode(logits: &[f32], timesteps: usize, vocab_size: usize, dictionary: &[String]) -> (String, f32) {
    let mut text = String::new();
    let mut scores = Vec::new();
    let mut previous = 0usize;

    for step in logits.chunks_exact(vocab_size.max(1)).take(timesteps) {
        let (index, score) = step
            .iter()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best });

        if index != 0 && index != previous {
            if let Some(symbol) = dictionary.get(index) {
                text.push_str(symbol);
                scores.push(score);
            }
        }
        previous = index;
    }

    let confidence = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f32>() / scores.len() as f32
    };

    (text, confidence)
}
