//! Local provider implementations using the filesystem and the `image` crate
//!
//! These back the CLI and the tests. Desktop integration and dialogs are no-ops here.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use parking_lot::Mutex;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{ImageFileFormat, TaskSettings, UploadResult};

use super::actions::{FileActions, OcrProvider};
use super::desktop::{Desktop, Dialogs};
use super::imaging::{EncodedImage, ImageEncoder, ImageProcessor};
use super::storage::FileStore;
use super::uploader::{UploadContext, Uploader, UploaderService};

/// First free path for `file_name` in `folder`: `name.ext`, `name (1).ext`, ...
pub fn unique_path(folder: &Path, file_name: &str) -> PathBuf {
    let candidate = folder.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1u32;
    loop {
        let name = match &extension {
            Some(ext) => format!("{} ({}).{}", stem, counter, ext),
            None => format!("{} ({})", stem, counter),
        };
        let candidate = folder.join(name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Local file store using the filesystem
#[derive(Debug, Clone, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }
}

impl FileStore for LocalFileStore {
    fn save(&self, folder: &Path, file_name: &str, data: &[u8], overwrite: bool) -> Result<PathBuf> {
        fs::create_dir_all(folder)?;
        let path = if overwrite {
            folder.join(file_name)
        } else {
            unique_path(folder, file_name)
        };
        fs::write(&path, data)?;
        tracing::debug!("Saved {} bytes to {}", data.len(), path.display());
        Ok(path)
    }

    fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, data)?;
        Ok(())
    }

    fn save_thumbnail(&self, image: &DynamicImage, source: &Path, width: u32, height: u32) -> Result<PathBuf> {
        if width == 0 {
            return Err(Error::config("thumbnail width must be greater than zero"));
        }

        let height = if height == 0 {
            let scaled = image.height() as u64 * width as u64 / image.width().max(1) as u64;
            scaled.clamp(1, u32::MAX as u64) as u32
        } else {
            height
        };

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture".to_string());
        let folder = source.parent().unwrap_or_else(|| Path::new("."));
        let path = folder.join(format!("{}-thumbnail.png", stem));

        let thumbnail = image.thumbnail(width, height);
        thumbnail.save_with_format(&path, ImageFormat::Png)?;
        Ok(path)
    }

    fn load(&self, path: &Path) -> Result<Bytes> {
        Ok(Bytes::from(fs::read(path)?))
    }
}

/// Encoder for PNG, JPEG and BMP using the `image` crate
#[derive(Debug, Clone, Default)]
pub struct DefaultImageEncoder;

impl ImageEncoder for DefaultImageEncoder {
    fn encode(&self, image: &DynamicImage, settings: &TaskSettings) -> Result<EncodedImage> {
        let mut buffer = Cursor::new(Vec::new());

        match settings.image_format {
            ImageFileFormat::Png => image.write_to(&mut buffer, ImageFormat::Png)?,
            ImageFileFormat::Bmp => image.write_to(&mut buffer, ImageFormat::Bmp)?,
            ImageFileFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut buffer, settings.jpeg_quality);
                rgb.write_with_encoder(encoder)?;
            }
        }

        Ok(EncodedImage {
            data: Bytes::from(buffer.into_inner()),
            extension: settings.image_format.extension(),
        })
    }
}

/// Processor that leaves every image unchanged
#[derive(Debug, Clone, Default)]
pub struct NoopImageProcessor;

impl ImageProcessor for NoopImageProcessor {}

/// Desktop integration that only logs
#[derive(Debug, Clone, Default)]
pub struct NoopDesktop;

impl Desktop for NoopDesktop {
    fn copy_image(&self, image: &DynamicImage) -> Result<()> {
        tracing::debug!("copy_image {}x{} skipped", image.width(), image.height());
        Ok(())
    }

    fn copy_file(&self, path: &Path) -> Result<()> {
        tracing::debug!("copy_file {} skipped", path.display());
        Ok(())
    }

    fn copy_text(&self, text: &str) -> Result<()> {
        tracing::debug!("copy_text ({} chars) skipped", text.len());
        Ok(())
    }

    fn pin_to_screen(&self, _image: DynamicImage) -> Result<()> {
        Ok(())
    }

    fn print(&self, _image: &DynamicImage) -> Result<()> {
        Ok(())
    }

    fn show_in_folder(&self, path: &Path) -> Result<()> {
        tracing::debug!("show_in_folder {} skipped", path.display());
        Ok(())
    }
}

/// Dialogs for unattended runs: saving is cancelled, large uploads are allowed
#[derive(Debug, Clone, Default)]
pub struct NoopDialogs;

impl Dialogs for NoopDialogs {
    fn choose_save_path(&self, _suggested: &Path) -> Option<PathBuf> {
        None
    }

    fn confirm_large_upload(&self, _size: u64, _threshold: u64) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoopFileActions;

impl FileActions for NoopFileActions {
    fn run(&self, _path: &Path, _settings: &TaskSettings) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoopOcr;

impl OcrProvider for NoopOcr {
    fn recognize(&self, _image: &DynamicImage) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Uploader service that "uploads" by copying the payload into a folder
#[derive(Debug, Clone)]
pub struct DirectoryUploaderService {
    id: String,
    folder: PathBuf,
    chunk_size: usize,
}

impl DirectoryUploaderService {
    pub fn new(id: impl Into<String>, folder: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            folder: folder.into(),
            chunk_size: 64 * 1024,
        }
    }

    /// Write in chunks of `chunk_size` bytes, reporting progress after each
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

impl UploaderService for DirectoryUploaderService {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Local folder"
    }

    fn check_config(&self) -> bool {
        !self.folder.as_os_str().is_empty()
    }

    fn create_uploader(&self) -> Result<Arc<dyn Uploader>> {
        Ok(Arc::new(DirectoryUploader {
            folder: self.folder.clone(),
            chunk_size: self.chunk_size,
            cancelled: AtomicBool::new(false),
            written: Mutex::new(None),
        }))
    }
}

/// One copy into the target folder
#[derive(Debug)]
pub struct DirectoryUploader {
    folder: PathBuf,
    chunk_size: usize,
    cancelled: AtomicBool,
    written: Mutex<Option<PathBuf>>,
}

impl DirectoryUploader {
    fn copy(&self, data: &[u8], ctx: &UploadContext<'_>) -> Result<Option<PathBuf>> {
        fs::create_dir_all(&self.folder)?;
        let path = unique_path(&self.folder, ctx.file_name);
        *self.written.lock() = Some(path.clone());

        let mut file = fs::File::create(&path)?;
        let total = data.len() as u64;
        let mut position = 0u64;
        ctx.report_progress(0, total);

        for chunk in data.chunks(self.chunk_size) {
            if self.cancelled.load(Ordering::SeqCst) || ctx.stop.is_stopped() {
                drop(file);
                let _ = fs::remove_file(&path);
                return Ok(None);
            }
            file.write_all(chunk)?;
            position += chunk.len() as u64;
            ctx.report_progress(position, total);
        }

        file.flush()?;
        Ok(Some(path))
    }
}

impl Uploader for DirectoryUploader {
    fn upload(&self, data: &[u8], ctx: &UploadContext<'_>) -> UploadResult {
        match self.copy(data, ctx) {
            Ok(Some(path)) => {
                let url = format!("file://{}", path.display());
                UploadResult::success(url)
            }
            Ok(None) => ctx.failure("Upload cancelled"),
            Err(e) => ctx.failure(e.to_string()),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(path) = self.written.lock().as_ref() {
            tracing::debug!("Cancelling copy to {}", path.display());
        }
    }
}
