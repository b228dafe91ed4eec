//! Plate format description
//!
//! The canonical plate shape and the length rules used by the selector.
//! Defaults model the regional layout `LL NN LL NNNN` (e.g. `MH12DE1433`).

use serde::{Deserialize, Serialize};

/// Two letters, 1-2 digits, 1-2 letters, 3-4 digits with optional separators.
pub const DEFAULT_PLATE_PATTERN: &str =
    r"[A-Z]{2}[ -]?[0-9]{1,2}[ -]?[A-Z]{1,2}[ -]?[0-9]{3,4}";

/// How competing primary matches are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Last primary match in scan order wins, first fallback match wins
    #[default]
    ScanOrder,
    /// Highest scoring primary match wins (shape match, then confidence)
    BestScore,
}

/// Shape and length rules for plate candidates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateFormat {
    /// Regex searched (unanchored) inside each candidate
    pub pattern: String,
    /// Minimum candidate length for a primary match (inclusive)
    pub min_len: usize,
    /// Maximum candidate length for a primary match (inclusive)
    pub max_len: usize,
    /// Candidates of exactly this length qualify without the shape
    pub exact_len: usize,
    /// Fallback candidates must be strictly longer than this
    pub fallback_min_len: usize,
    /// Tie-break policy between primary matches
    pub policy: SelectionPolicy,
}

impl Default for PlateFormat {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PLATE_PATTERN.to_string(),
            min_len: 6,
            max_len: 12,
            exact_len: 10,
            fallback_min_len: 4,
            policy: SelectionPolicy::ScanOrder,
        }
    }
}

impl PlateFormat {
    /// Check whether a length falls inside the primary match window
    pub fn accepts_length(&self, len: usize) -> bool {
        len >= self.min_len && len <= self.max_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format() {
        let format = PlateFormat::default();
        assert_eq!(format.pattern, DEFAULT_PLATE_PATTERN);
        assert_eq!(format.min_len, 6);
        assert_eq!(format.max_len, 12);
        assert_eq!(format.exact_len, 10);
        assert_eq!(format.fallback_min_len, 4);
        assert_eq!(format.policy, SelectionPolicy::ScanOrder);
    }

    #[test]
    fn test_length_window_is_inclusive() {
        let format = PlateFormat::default();
        assert!(!format.accepts_length(5));
        assert!(format.accepts_length(6));
        assert!(format.accepts_length(12));
        assert!(!format.accepts_length(13));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let format: PlateFormat = toml::from_str("policy = \"best_score\"\nmax_len = 11").unwrap();
        assert_eq!(format.policy, SelectionPolicy::BestScore);
        assert_eq!(format.max_len, 11);
        assert_eq!(format.min_len, 6);
        assert_eq!(format.pattern, DEFAULT_PLATE_PATTERN);
    }
}
