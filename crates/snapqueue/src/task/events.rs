//! Notifications emitted by a running task

use image::DynamicImage;
use std::fmt;
use std::sync::Arc;

use super::status::TaskStatus;
use super::worker::WorkerTask;
use crate::types::UploadProgress;

/// What happened
#[derive(Debug, Clone)]
pub enum TaskEventKind {
    StatusChanged(TaskStatus),
    /// Fired once after the capture-side stages; carries a preview clone when enabled
    ImageReady(Option<DynamicImage>),
    UploadStarted,
    UploadProgressChanged(UploadProgress),
    UploadCompleted,
    /// Always the last event of a task
    TaskCompleted(TaskStatus),
}

impl TaskEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusChanged(_) => "status_changed",
            Self::ImageReady(_) => "image_ready",
            Self::UploadStarted => "upload_started",
            Self::UploadProgressChanged(_) => "upload_progress_changed",
            Self::UploadCompleted => "upload_completed",
            Self::TaskCompleted(_) => "task_completed",
        }
    }
}

/// A notification together with the task that raised it
#[derive(Clone)]
pub struct TaskEvent {
    pub task: Arc<WorkerTask>,
    pub kind: TaskEventKind,
}

impl fmt::Debug for TaskEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskEvent")
            .field("task", &self.task.id())
            .field("kind", &self.kind.name())
            .finish()
    }
}

/// Receives every event of the tasks it is attached to.
///
/// Called from runner threads and from whichever thread calls `stop()`, so implementations
/// should return quickly. Non-final events are delivered while the task's state lock is
/// held. The lock is re-entrant: a listener may read the task or call `stop()` on it, and
/// other threads touching the task wait until `on_event` returns.
pub trait TaskListener: Send + Sync {
    fn on_event(&self, event: TaskEvent);
}
