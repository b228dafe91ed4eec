//! Plate Selector
//!
//! Turns the raw text detections of an OCR pass into a single best-guess
//! license plate string. Selection runs in three stages:
//! - normalization (upper-case, whitespace removed, empty texts dropped)
//! - primary match on the plate shape or the exact plate length
//! - fallback to the first mixed letter/digit candidate of sufficient length
//!
//! The selector is pure: no I/O, no shared state, safe to call from any thread.

pub mod format;
pub mod output;

pub use format::{PlateFormat, SelectionPolicy, DEFAULT_PLATE_PATTERN};

use regex::Regex;
use tracing::debug;

use crate::error::ReaderError;

/// One OCR output unit
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Recognized text, arbitrary case and spacing
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
    /// Bounding polygon in image coordinates, never inspected by the selector
    pub region: Vec<(f32, f32)>,
}

impl Detection {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            region: Vec::new(),
        }
    }

    pub fn with_region(mut self, region: Vec<(f32, f32)>) -> Self {
        self.region = region;
        self
    }
}

/// Normalized detection text considered for plate selection
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub confidence: f32,
}

impl Candidate {
    /// Length in characters
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Contains at least one ASCII letter and one ASCII digit
    pub fn is_alphanumeric_mix(&self) -> bool {
        self.text.chars().any(|c| c.is_ascii_digit())
            && self.text.chars().any(|c| c.is_ascii_alphabetic())
    }
}

/// Upper-case a detection text and strip all whitespace
pub fn normalize(text: &str) -> String {
    text.to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Normalize detections in emission order, dropping empty results
pub fn normalize_all(detections: &[Detection]) -> Vec<Candidate> {
    detections
        .iter()
        .map(|d| Candidate {
            text: normalize(&d.text),
            confidence: d.confidence,
        })
        .filter(|c| !c.is_empty())
        .collect()
}

/// Outcome of one plate extraction
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionResult {
    /// Selection ran; `plate` is empty when nothing qualified
    Success {
        plate: String,
        raw_candidates: Vec<String>,
    },
    /// A fault occurred before selection could run
    Failure { error: String },
}

impl SelectionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Selected plate, `None` on failure
    pub fn plate(&self) -> Option<&str> {
        match self {
            Self::Success { plate, .. } => Some(plate),
            Self::Failure { .. } => None,
        }
    }

    /// Normalized candidates in OCR order, empty on failure
    pub fn raw_candidates(&self) -> &[String] {
        match self {
            Self::Success { raw_candidates, .. } => raw_candidates,
            Self::Failure { .. } => &[],
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failure { error } => Some(error),
            Self::Success { .. } => None,
        }
    }
}

/// Why a candidate qualified as a primary match
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchStrength {
    /// Exact plate length with mixed letters and digits
    Length,
    /// Contains the plate shape
    Shape,
}

/// Picks the most plausible plate among OCR candidates
#[derive(Debug, Clone)]
pub struct PlateSelector {
    format: PlateFormat,
    shape: Regex,
}

impl PlateSelector {
    /// Compile a selector for the given plate format
    pub fn new(format: PlateFormat) -> Result<Self, ReaderError> {
        let shape = Regex::new(&format.pattern).map_err(|source| ReaderError::InvalidPattern {
            pattern: format.pattern.clone(),
            source,
        })?;

        Ok(Self { format, shape })
    }

    /// Select the best plate from a sequence of detections
    pub fn select(&self, detections: &[Detection]) -> SelectionResult {
        let candidates = normalize_all(detections);

        let plate = self
            .primary_match(&candidates)
            .or_else(|| self.fallback_match(&candidates))
            .map(|c| c.text.clone())
            .unwrap_or_default();

        debug!(
            "Selected plate {:?} from {} candidates ({} detections)",
            plate,
            candidates.len(),
            detections.len()
        );

        SelectionResult::Success {
            plate,
            raw_candidates: candidates.into_iter().map(|c| c.text).collect(),
        }
    }

    fn primary_match<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        let qualified = candidates
            .iter()
            .enumerate()
            .filter_map(|(index, c)| self.qualify(c).map(|strength| (index, strength, c)));

        match self.format.policy {
            // later matches overwrite earlier ones
            SelectionPolicy::ScanOrder => qualified.last().map(|(_, _, c)| c),
            SelectionPolicy::BestScore => qualified
                .max_by(|(ia, sa, a), (ib, sb, b)| {
                    sa.cmp(sb)
                        .then(a.confidence.total_cmp(&b.confidence))
                        .then(ib.cmp(ia))
                })
                .map(|(_, _, c)| c),
        }
    }

    fn fallback_match<'a>(&self, candidates: &'a [Candidate]) -> Option<&'a Candidate> {
        candidates
            .iter()
            .find(|c| c.len() > self.format.fallback_min_len && c.is_alphanumeric_mix())
    }

    fn qualify(&self, candidate: &Candidate) -> Option<MatchStrength> {
        let len = candidate.len();
        if !self.format.accepts_length(len) {
            return None;
        }

        if self.shape.is_match(&candidate.text) {
            Some(MatchStrength::Shape)
        } else if len == self.format.exact_len && candidate.is_alphanumeric_mix() {
            Some(MatchStrength::Length)
        } else {
            None
        }
    }
}
