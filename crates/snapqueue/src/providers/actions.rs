//! External file actions and text recognition

use image::DynamicImage;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::TaskSettings;

/// User-configured programs run against the saved file
pub trait FileActions: Send + Sync {
    /// Run every enabled action on `path`
    ///
    /// Returns the new path when an action produced a replacement file.
    fn run(&self, path: &Path, settings: &TaskSettings) -> Result<Option<PathBuf>>;
}

/// Optical character recognition
pub trait OcrProvider: Send + Sync {
    /// Recognized text, `None` when nothing was found
    fn recognize(&self, image: &DynamicImage) -> Result<Option<String>>;
}
