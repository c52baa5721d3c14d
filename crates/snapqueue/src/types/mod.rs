//! Core data records shared by the runner and the scheduler

pub mod history;
pub mod info;
pub mod result;
pub mod settings;

pub use history::{HistoryItem, RecentTask};
pub use info::{DataType, TaskInfo, TaskJob, TaskMetadata};
pub use result::{ErrorList, UploadProgress, UploadResult, UploaderError, DEFAULT_ERROR_TITLE};
pub use settings::{AfterCaptureJobs, AfterUploadJobs, ImageFileFormat, TaskSettings};
