//! History log records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::info::DataType;

/// Flattened summary of a completed task, appended to the history log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: Uuid,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    pub date_time: DateTime<Utc>,
    pub data_type: DataType,
    /// Uploader service name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortened_url: Option<String>,
}

/// Lightweight entry used to rebuild `History` tasks at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub time: DateTime<Utc>,
}

impl From<&HistoryItem> for RecentTask {
    fn from(item: &HistoryItem) -> Self {
        Self {
            file_path: item.file_path.clone(),
            file_name: item.file_name.clone(),
            url: item.shortened_url.clone().or_else(|| item.url.clone()),
            time: item.date_time,
        }
    }
}
