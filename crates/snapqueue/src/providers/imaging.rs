//! Image processing and encoding provider traits

use bytes::Bytes;
use image::DynamicImage;

use crate::error::Result;
use crate::types::TaskSettings;

/// What a processing stage did to the image
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    /// Leave the image as it is
    Keep,
    /// Continue with a new image
    Replace(DynamicImage),
    /// Abort the capture side of the pipeline (for example, the editor was cancelled)
    Abort,
}

/// Capture-side image processors
///
/// Every stage defaults to [`ProcessOutcome::Keep`].
pub trait ImageProcessor: Send + Sync {
    /// Add padding, background and shadow
    fn beautify(&self, _image: &DynamicImage, _settings: &TaskSettings) -> Result<ProcessOutcome> {
        Ok(ProcessOutcome::Keep)
    }

    /// Apply the configured effect preset
    fn apply_effects(&self, _image: &DynamicImage, _settings: &TaskSettings) -> Result<ProcessOutcome> {
        Ok(ProcessOutcome::Keep)
    }

    /// Open the annotation editor
    fn annotate(&self, _image: &DynamicImage, _settings: &TaskSettings) -> Result<ProcessOutcome> {
        Ok(ProcessOutcome::Keep)
    }
}

/// Encoded image bytes and the file extension they belong to
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Bytes,
    /// Extension without the dot
    pub extension: &'static str,
}

/// Turns an image into file bytes
pub trait ImageEncoder: Send + Sync {
    fn encode(&self, image: &DynamicImage, settings: &TaskSettings) -> Result<EncodedImage>;
}
