//! Collaborators shared by every task created from the same configuration

use std::fmt;
use std::sync::Arc;

use super::affinity::AffinityWorker;
use super::retry::RetryPolicy;
use crate::config::AppConfig;
use crate::error::Result;
use crate::providers::local::{
    DefaultImageEncoder, LocalFileStore, NoopDesktop, NoopDialogs, NoopFileActions, NoopImageProcessor, NoopOcr,
};
use crate::providers::{
    Desktop, Dialogs, FileActions, FileStore, ImageEncoder, ImageProcessor, OcrProvider, UploaderRegistry,
};

/// Stage collaborators, uploader registry and upload policy
#[derive(Clone)]
pub struct TaskServices {
    pub processor: Arc<dyn ImageProcessor>,
    pub encoder: Arc<dyn ImageEncoder>,
    pub files: Arc<dyn FileStore>,
    pub dialogs: Arc<dyn Dialogs>,
    pub desktop: Arc<dyn Desktop>,
    pub actions: Arc<dyn FileActions>,
    pub ocr: Arc<dyn OcrProvider>,
    pub uploaders: Arc<UploaderRegistry>,
    pub affinity: Arc<AffinityWorker>,
    pub retry: RetryPolicy,
    /// Ask before uploading payloads larger than this many bytes
    pub large_file_threshold: Option<u64>,
}

impl TaskServices {
    /// Local collaborators with the default retry policy
    pub fn new(uploaders: Arc<UploaderRegistry>) -> Result<Self> {
        Ok(Self {
            processor: Arc::new(NoopImageProcessor),
            encoder: Arc::new(DefaultImageEncoder),
            files: Arc::new(LocalFileStore::new()),
            dialogs: Arc::new(NoopDialogs),
            desktop: Arc::new(NoopDesktop),
            actions: Arc::new(NoopFileActions),
            ocr: Arc::new(NoopOcr),
            uploaders,
            affinity: Arc::new(AffinityWorker::spawn("snapqueue-affinity")?),
            retry: RetryPolicy::default(),
            large_file_threshold: None,
        })
    }

    /// Local collaborators with the upload policy from `config`
    pub fn from_config(config: &AppConfig, uploaders: Arc<UploaderRegistry>) -> Result<Self> {
        let mut services = Self::new(uploaders)?;
        services.retry = RetryPolicy::from_config(&config.upload);
        services.large_file_threshold = config.upload.large_file_threshold();
        Ok(services)
    }

    pub fn with_processor(mut self, processor: Arc<dyn ImageProcessor>) -> Self {
        self.processor = processor;
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn ImageEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_files(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = files;
        self
    }

    pub fn with_dialogs(mut self, dialogs: Arc<dyn Dialogs>) -> Self {
        self.dialogs = dialogs;
        self
    }

    pub fn with_desktop(mut self, desktop: Arc<dyn Desktop>) -> Self {
        self.desktop = desktop;
        self
    }

    pub fn with_actions(mut self, actions: Arc<dyn FileActions>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrProvider>) -> Self {
        self.ocr = ocr;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_large_file_threshold(mut self, threshold: Option<u64>) -> Self {
        self.large_file_threshold = threshold;
        self
    }
}

impl fmt::Debug for TaskServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskServices")
            .field("uploaders", &self.uploaders)
            .field("retry", &self.retry)
            .field("large_file_threshold", &self.large_file_threshold)
            .finish_non_exhaustive()
    }
}
