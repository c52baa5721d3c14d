//! Uploader abstraction and destination registry

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::task::StopToken;
use crate::types::{DataType, ErrorList, UploadProgress, UploadResult};

/// Per-attempt context handed to an [`Uploader`]
pub struct UploadContext<'a> {
    /// Name the payload should have remotely
    pub file_name: &'a str,
    pub data_type: DataType,
    /// Fires when the owning task is stopped
    pub stop: &'a StopToken,
    /// Title given to untitled errors, `"<service> error"`
    pub error_title: &'a str,
    progress: &'a (dyn Fn(UploadProgress) + Send + Sync),
}

impl<'a> UploadContext<'a> {
    pub fn new(
        file_name: &'a str,
        data_type: DataType,
        stop: &'a StopToken,
        error_title: &'a str,
        progress: &'a (dyn Fn(UploadProgress) + Send + Sync),
    ) -> Self {
        Self {
            file_name,
            data_type,
            stop,
            error_title,
            progress,
        }
    }

    /// Forward a progress update to the task
    pub fn report_progress(&self, position: u64, length: u64) {
        (self.progress)(UploadProgress::new(position, length));
    }

    /// Empty error list using this service's default title
    pub fn errors(&self) -> ErrorList {
        ErrorList::with_default_title(self.error_title)
    }

    /// Failed result with one untitled error
    pub fn failure(&self, message: impl Into<String>) -> UploadResult {
        let mut result = UploadResult {
            errors: self.errors(),
            ..UploadResult::default()
        };
        result.errors.add(message);
        result
    }
}

impl fmt::Debug for UploadContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadContext")
            .field("file_name", &self.file_name)
            .field("data_type", &self.data_type)
            .field("stopped", &self.stop.is_stopped())
            .finish()
    }
}

/// One upload session
///
/// `upload` blocks the runner thread. `cancel` may be called from any thread while an
/// upload is in flight and should make it return promptly.
pub trait Uploader: Send + Sync {
    fn upload(&self, data: &[u8], ctx: &UploadContext<'_>) -> UploadResult;

    fn cancel(&self) {}
}

/// Factory for uploaders of one destination
pub trait UploaderService: Send + Sync {
    /// Destination id referenced by task settings
    fn id(&self) -> &str;

    /// Human readable service name
    fn name(&self) -> &str;

    /// Whether the destination is configured well enough to upload
    fn check_config(&self) -> bool {
        true
    }

    fn create_uploader(&self) -> Result<Arc<dyn Uploader>>;
}

/// Destination id → uploader service
#[derive(Default)]
pub struct UploaderRegistry {
    services: DashMap<String, Arc<dyn UploaderService>>,
}

impl UploaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service under its id, replacing any previous one
    pub fn register(&self, service: Arc<dyn UploaderService>) {
        let id = service.id().to_string();
        tracing::debug!("Registered uploader '{}' ({})", id, service.name());
        self.services.insert(id, service);
    }

    pub fn with(self, service: Arc<dyn UploaderService>) -> Self {
        self.register(service);
        self
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn UploaderService>> {
        self.services
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::uploader(format!("No uploader registered for destination '{}'", id)))
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for UploaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploaderRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

/// Result returned without any attempt when a service is not configured
pub fn invalid_config_result(service: &dyn UploaderService) -> UploadResult {
    let message = format!("{} configuration is invalid or missing", service.name());
    tracing::warn!("{}", message);
    let mut result = UploadResult::default();
    result.errors.add(message);
    result
}
