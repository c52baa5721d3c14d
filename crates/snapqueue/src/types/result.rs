//! Upload result and error accumulation

use serde::{Deserialize, Serialize};
use std::fmt;

/// Title used for entries added without an explicit title
pub const DEFAULT_ERROR_TITLE: &str = "Task error";

/// One error entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploaderError {
    pub title: String,
    pub message: String,
}

impl fmt::Display for UploaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

/// Ordered, append-only list of error entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorList {
    /// Title for entries pushed with [`ErrorList::add`]
    #[serde(default)]
    pub default_title: Option<String>,
    entries: Vec<UploaderError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Error list whose untitled entries use `title`
    pub fn with_default_title(title: impl Into<String>) -> Self {
        Self {
            default_title: Some(title.into()),
            entries: Vec::new(),
        }
    }

    /// Append a message under the default title
    pub fn add(&mut self, message: impl Into<String>) {
        let title = self
            .default_title
            .clone()
            .unwrap_or_else(|| DEFAULT_ERROR_TITLE.to_string());
        self.add_titled(title, message);
    }

    /// Append a message with an explicit title
    pub fn add_titled(&mut self, title: impl Into<String>, message: impl Into<String>) {
        self.entries.push(UploaderError {
            title: title.into(),
            message: message.into(),
        });
    }

    /// Append every entry of `other`, in order
    pub fn extend(&mut self, other: &ErrorList) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn first(&self) -> Option<&UploaderError> {
        self.entries.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploaderError> {
        self.entries.iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", entry)?;
        }
        Ok(())
    }
}

/// Outcome of an upload (or of a whole task, once terminal)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResult {
    /// Uploader reported success
    pub is_success: bool,
    /// Raw response body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Public URL of the uploaded payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortened_url: Option<String>,
    /// Errors reported while producing this result
    pub errors: ErrorList,
}

impl UploadResult {
    /// Successful result pointing at `url`
    pub fn success(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            is_success: true,
            response: Some(url.clone()),
            url: Some(url),
            ..Self::default()
        }
    }

    /// Failed result carrying a single error
    pub fn failure(title: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::default();
        result.errors.add_titled(title, message);
        result
    }

    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Best link to show for this result
    pub fn best_url(&self) -> Option<&str> {
        self.shortened_url
            .as_deref()
            .or(self.url.as_deref())
            .filter(|url| !url.is_empty())
    }

    /// Errors rendered one per line, `None` when there are none
    pub fn errors_to_string(&self) -> Option<String> {
        if self.is_error() {
            Some(self.errors.to_string())
        } else {
            None
        }
    }
}

/// Upload progress reported by an uploader
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UploadProgress {
    /// Bytes sent so far
    pub position: u64,
    /// Total bytes
    pub length: u64,
}

impl UploadProgress {
    pub fn new(position: u64, length: u64) -> Self {
        Self { position, length }
    }

    /// Percentage in 0..=100
    pub fn percentage(&self) -> f64 {
        if self.length == 0 {
            return 0.0;
        }
        (self.position as f64 / self.length as f64 * 100.0).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_list_default_title() {
        let mut errors = ErrorList::with_default_title("Imgur error");
        errors.add("timeout");
        errors.add_titled("Other", "boom");

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.first().unwrap().title, "Imgur error");
        assert_eq!(errors.to_string(), "Imgur error: timeout\nOther: boom");
    }

    #[test]
    fn test_error_list_fallback_title() {
        let mut errors = ErrorList::new();
        errors.add("stage blew up");
        assert_eq!(errors.first().unwrap().title, DEFAULT_ERROR_TITLE);
    }

    #[test]
    fn test_result_is_error() {
        assert!(!UploadResult::success("https://example.com/a.png").is_error());
        let failed = UploadResult::failure("Host", "503");
        assert!(failed.is_error());
        assert_eq!(failed.errors_to_string().unwrap(), "Host: 503");
    }

    #[test]
    fn test_best_url_prefers_short() {
        let mut result = UploadResult::success("https://example.com/long");
        assert_eq!(result.best_url(), Some("https://example.com/long"));
        result.shortened_url = Some("https://ex.co/s".to_string());
        assert_eq!(result.best_url(), Some("https://ex.co/s"));
    }

    #[test]
    fn test_progress_percentage() {
        assert_eq!(UploadProgress::new(50, 200).percentage(), 25.0);
        assert_eq!(UploadProgress::new(10, 0).percentage(), 0.0);
        assert_eq!(UploadProgress::new(300, 200).percentage(), 100.0);
    }
}
