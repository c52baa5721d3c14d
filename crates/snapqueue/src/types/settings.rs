//! Per-task settings snapshot
//!
//! A `TaskSettings` value is cloned into an `Arc` when a task is created, so edits made to
//! the application defaults afterwards never leak into a running pipeline.

use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;

/// Bitmask of actions requested after a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AfterCaptureJobs(u32);

impl AfterCaptureJobs {
    pub const NONE: Self = Self(0);
    pub const BEAUTIFY_IMAGE: Self = Self(1);
    pub const ADD_IMAGE_EFFECTS: Self = Self(1 << 1);
    pub const ANNOTATE_IMAGE: Self = Self(1 << 2);
    pub const COPY_IMAGE_TO_CLIPBOARD: Self = Self(1 << 3);
    pub const PIN_TO_SCREEN: Self = Self(1 << 4);
    pub const SEND_IMAGE_TO_PRINTER: Self = Self(1 << 5);
    pub const SAVE_IMAGE_TO_FILE: Self = Self(1 << 6);
    pub const SAVE_IMAGE_TO_FILE_WITH_DIALOG: Self = Self(1 << 7);
    pub const SAVE_THUMBNAIL_IMAGE_TO_FILE: Self = Self(1 << 8);
    pub const PERFORM_ACTIONS: Self = Self(1 << 9);
    pub const COPY_FILE_TO_CLIPBOARD: Self = Self(1 << 10);
    pub const COPY_FILE_PATH_TO_CLIPBOARD: Self = Self(1 << 11);
    pub const SHOW_IN_EXPLORER: Self = Self(1 << 12);
    pub const DO_OCR: Self = Self(1 << 13);
    pub const UPLOAD_TO_HOST: Self = Self(1 << 14);

    /// Raw bit value
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Build from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// True when every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when at least one bit of `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Clear the bits of `other`
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for AfterCaptureJobs {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for AfterCaptureJobs {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Bitmask of actions requested after a successful upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AfterUploadJobs(u32);

impl AfterUploadJobs {
    pub const NONE: Self = Self(0);
    pub const COPY_URL_TO_CLIPBOARD: Self = Self(1);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for AfterUploadJobs {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Output encoding for captured images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFileFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
}

impl ImageFileFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Bmp => "bmp",
        }
    }
}

/// Settings snapshot consumed by the pipeline stages of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskSettings {
    /// Actions after capture
    pub after_capture: AfterCaptureJobs,
    /// Actions after upload
    pub after_upload: AfterUploadJobs,
    /// Destination id used for image uploads
    pub image_destination: String,
    /// Destination id used for text uploads
    pub text_destination: String,
    /// Destination id used for every other file
    pub file_destination: String,
    /// Folder used by "save image to file"
    pub screenshots_folder: PathBuf,
    /// `chrono` format string used to name captures
    pub name_pattern: String,
    /// Encoding for captured images
    pub image_format: ImageFileFormat,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// Thumbnail bounds for "save thumbnail"
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    /// Overwrite instead of appending a counter when the target exists
    pub overwrite_existing: bool,
    /// Save text tasks as a `.txt` file before uploading
    pub text_save_as_file: bool,
    /// Hand a cloned preview to `ImageReady` observers
    pub keep_preview_image: bool,
    /// Keep the image after completion for a toast notification
    pub show_toast_after_completed: bool,
}

impl Default for TaskSettings {
    fn default() -> Self {
        let screenshots_folder = dirs::picture_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
            .join("snapqueue");

        Self {
            after_capture: AfterCaptureJobs::COPY_IMAGE_TO_CLIPBOARD
                | AfterCaptureJobs::SAVE_IMAGE_TO_FILE
                | AfterCaptureJobs::UPLOAD_TO_HOST,
            after_upload: AfterUploadJobs::NONE,
            image_destination: "local".to_string(),
            text_destination: "local".to_string(),
            file_destination: "local".to_string(),
            screenshots_folder,
            name_pattern: "%Y-%m-%d_%H-%M-%S".to_string(),
            image_format: ImageFileFormat::Png,
            jpeg_quality: 90,
            thumbnail_width: 200,
            thumbnail_height: 0,
            overwrite_existing: false,
            text_save_as_file: false,
            keep_preview_image: true,
            show_toast_after_completed: true,
        }
    }
}

impl TaskSettings {
    /// Settings with only the given after-capture jobs enabled
    pub fn with_jobs(mut self, jobs: AfterCaptureJobs) -> Self {
        self.after_capture = jobs;
        self
    }

    /// Whether the capture payload has to be encoded to bytes
    pub fn needs_encoded_image(&self) -> bool {
        self.after_capture.intersects(
            AfterCaptureJobs::SAVE_IMAGE_TO_FILE
                | AfterCaptureJobs::SAVE_IMAGE_TO_FILE_WITH_DIALOG
                | AfterCaptureJobs::DO_OCR
                | AfterCaptureJobs::UPLOAD_TO_HOST,
        )
    }

    /// Generate a file name (without extension) from `name_pattern`
    pub fn generate_name(&self) -> String {
        let now = chrono::Local::now();
        let name = now.format(&self.name_pattern).to_string();
        let cleaned: String = name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
            .collect();
        if cleaned.trim().is_empty() {
            "capture".to_string()
        } else {
            cleaned
        }
    }
}
