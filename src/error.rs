//! Error taxonomy for plate extraction
//!
//! Every variant is reported to callers through the failure JSON shape; none
//! of them is allowed to abort the process uncaught.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    /// The CLI was invoked without an image path
    #[error("No image path provided")]
    NoImagePath,

    /// The OCR provider returned an error (unreadable image, missing model, ...)
    #[error("{0:#}")]
    Provider(anyhow::Error),

    /// The OCR provider panicked
    #[error("OCR provider panicked: {0}")]
    ProviderPanic(String),

    /// A detection coming out of the provider could not be used
    #[error("Malformed detection at index {index}: {reason}")]
    MalformedDetection { index: usize, reason: String },

    /// The configured plate pattern is not a valid regex
    #[error("Invalid plate pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0:#}")]
    Config(anyhow::Error),
}
