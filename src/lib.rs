//! Plate Reader - license plate extraction from vehicle photos
//!
//! An OCR pass (PaddleOCR through ONNX Runtime) produces raw text detections;
//! a selection heuristic picks the one that looks most like a plate; the
//! outcome is reported as a single JSON line.

pub mod config;
pub mod error;
pub mod plate;
pub mod reader;
pub mod storage;
pub mod vision;

pub use error::ReaderError;
pub use plate::{Detection, PlateFormat, PlateSelector, SelectionPolicy, SelectionResult};
pub use reader::PlateReader;
pub use vision::{OcrEngine, OcrProvider, OcrSettings};
