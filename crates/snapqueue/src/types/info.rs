//! Task information record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::history::HistoryItem;
use super::result::{UploadProgress, UploadResult};
use super::settings::TaskSettings;

/// Kind of payload a task carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Image,
    Text,
    File,
}

impl DataType {
    /// Guess the data type from a file name or path
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let mime = mime_guess::from_path(path.as_ref()).first();
        match mime {
            Some(mime) if mime.type_() == mime_guess::mime::IMAGE => Self::Image,
            Some(mime) if mime.type_() == mime_guess::mime::TEXT => Self::Text,
            _ => Self::File,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Text => "text",
            Self::File => "file",
        }
    }
}

/// What the pipeline should do with the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskJob {
    /// Capture or file job: after-capture stages, file stages, upload
    Job,
    /// Text job: optional save as file, upload
    TextUpload,
}

/// Descriptive metadata supplied by the capture provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Title of the captured window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    /// Process that owned the captured window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
}

/// Identity, settings snapshot, timestamps and result of one task
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: Uuid,
    pub settings: Arc<TaskSettings>,
    pub job: TaskJob,
    pub data_type: DataType,
    pub file_name: String,
    pub file_path: Option<PathBuf>,
    pub thumbnail_file_path: Option<PathBuf>,
    pub metadata: TaskMetadata,
    /// Human-readable status line
    pub status_text: String,
    /// Name of the uploader service that handled the upload
    pub uploader_host: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub upload_duration: Option<Duration>,
    /// Latest upload progress, only set while uploading
    pub progress: Option<UploadProgress>,
    /// Text recognized by the OCR stage
    pub ocr_text: Option<String>,
    pub result: UploadResult,
}

impl TaskInfo {
    pub fn new(settings: Arc<TaskSettings>, job: TaskJob, data_type: DataType) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings,
            job,
            data_type,
            file_name: String::new(),
            file_path: None,
            thumbnail_file_path: None,
            metadata: TaskMetadata::default(),
            status_text: String::new(),
            uploader_host: None,
            start_time: None,
            end_time: None,
            upload_duration: None,
            progress: None,
            ocr_text: None,
            result: UploadResult::default(),
        }
    }

    /// Destination id selected by the data type
    pub fn destination(&self) -> &str {
        match self.data_type {
            DataType::Image => &self.settings.image_destination,
            DataType::Text => &self.settings.text_destination,
            DataType::File => &self.settings.file_destination,
        }
    }

    /// Wall time between start and end, if both are known
    pub fn task_duration(&self) -> Option<Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }

    /// Text shown for a finished task: the link, or else the local path
    pub fn summary(&self) -> Option<String> {
        if let Some(url) = self.result.best_url() {
            return Some(url.to_string());
        }
        self.file_path
            .as_ref()
            .map(|path| path.display().to_string())
    }

    /// Flattened record for the history log
    pub fn history_item(&self) -> HistoryItem {
        HistoryItem {
            id: self.id,
            file_name: self.file_name.clone(),
            file_path: self.file_path.clone(),
            date_time: self.end_time.unwrap_or_else(Utc::now),
            data_type: self.data_type,
            host: self.uploader_host.clone(),
            url: self.result.url.clone(),
            thumbnail_url: self.result.thumbnail_url.clone(),
            deletion_url: self.result.deletion_url.clone(),
            shortened_url: self.result.shortened_url.clone(),
        }
    }
}
