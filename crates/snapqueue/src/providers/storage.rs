//! File storage provider trait

use bytes::Bytes;
use image::DynamicImage;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Trait for persisting task payloads on disk
///
/// Implementations:
/// - `LocalFileStore`: plain filesystem
pub trait FileStore: Send + Sync {
    /// Save `data` as `file_name` inside `folder`
    ///
    /// Creates the folder when missing. Unless `overwrite` is set, an existing file is kept
    /// and a numbered name is chosen instead. Returns the path written.
    fn save(&self, folder: &Path, file_name: &str, data: &[u8], overwrite: bool) -> Result<PathBuf>;

    /// Write `data` to exactly `path`
    fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Save a scaled-down copy of `image` next to `source`
    ///
    /// A `height` of 0 keeps the aspect ratio. Returns the thumbnail path.
    fn save_thumbnail(&self, image: &DynamicImage, source: &Path, width: u32, height: u32) -> Result<PathBuf>;

    /// Read a file back
    fn load(&self, path: &Path) -> Result<Bytes>;

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}
