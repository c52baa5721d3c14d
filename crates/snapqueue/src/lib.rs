//! snapqueue: capture → process → upload task runner with a bounded scheduler
//!
//! A [`WorkerTask`] carries one captured image, file or piece of text through the
//! after-capture stages and an upload with retry. The [`TaskManager`] admits queued tasks
//! under an upload limit and forwards every task event to a channel drained by the host.

pub mod config;
pub mod error;
pub mod providers;
pub mod scheduler;
pub mod storage;
pub mod task;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use scheduler::{NotificationSink, TaskManager};
pub use storage::HistoryDb;
pub use task::{TaskEvent, TaskEventKind, TaskServices, TaskStatus, WorkerTask};
pub use types::{
    history::{HistoryItem, RecentTask},
    info::{DataType, TaskInfo, TaskMetadata},
    result::UploadResult,
    settings::{AfterCaptureJobs, AfterUploadJobs, TaskSettings},
};
