//! End-to-end plate reading: OCR provider -> plate selector
//!
//! Every failure of the provider (error, panic, malformed output) is turned
//! into a [`SelectionResult::Failure`] so callers always get a result to emit.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::ReaderError;
use crate::plate::{Detection, PlateSelector, SelectionResult};
use crate::vision::OcrProvider;

/// Reads a plate from an image with a given OCR provider
pub struct PlateReader<P> {
    provider: P,
    selector: PlateSelector,
}

impl<P: OcrProvider> PlateReader<P> {
    pub fn new(provider: P, selector: PlateSelector) -> Self {
        Self { provider, selector }
    }

    /// Run OCR on `image` and select a plate; never fails
    pub fn read(&self, image: &Path) -> SelectionResult {
        match self.try_read(image) {
            Ok(result) => result,
            Err(e) => {
                warn!("Plate reading failed for {}: {}", image.display(), e);
                SelectionResult::failure(e.to_string())
            }
        }
    }

    /// Like [`read`](Self::read), but keeps the error typed
    pub fn try_read(&self, image: &Path) -> Result<SelectionResult, ReaderError> {
        debug!("Running OCR on {}", image.display());

        let detections = intercept(|| self.provider.detect(image))?;
        validate_detections(&detections)?;
        info!("OCR produced {} detections", detections.len());

        Ok(self.selector.select(&detections))
    }
}

/// Run a provider call, converting errors and panics into [`ReaderError`]
pub fn intercept<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, ReaderError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ReaderError::Provider(e)),
        Err(payload) => Err(ReaderError::ProviderPanic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Reject detections the selector cannot reason about
fn validate_detections(detections: &[Detection]) -> Result<(), ReaderError> {
    for (index, detection) in detections.iter().enumerate() {
        let confidence = detection.confidence;
        if !confidence.is_finite() {
            return Err(ReaderError::MalformedDetection {
                index,
                reason: format!("confidence is {}", confidence),
            });
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ReaderError::MalformedDetection {
                index,
                reason: format!("confidence {} is outside 0.0 - 1.0", confidence),
            });
        }
    }
    Ok(())
}
