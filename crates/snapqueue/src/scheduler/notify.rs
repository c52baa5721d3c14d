//! Outbound notifications drained on the caller's own context

use image::DynamicImage;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::task::{TaskEvent, TaskEventKind, TaskStatus, WorkerTask};
use crate::types::UploadProgress;

/// Receiver side of the scheduler's event channel
pub trait NotificationSink: Send + Sync {
    fn status_changed(&self, task: &Arc<WorkerTask>, status: TaskStatus);

    fn image_ready(&self, task: &Arc<WorkerTask>, image: Option<&DynamicImage>);

    fn upload_started(&self, _task: &Arc<WorkerTask>) {}

    fn upload_progress_changed(&self, task: &Arc<WorkerTask>, progress: UploadProgress);

    fn upload_completed(&self, _task: &Arc<WorkerTask>) {}

    fn task_completed(&self, task: &Arc<WorkerTask>, status: TaskStatus);
}

/// Route one event to the matching sink method
pub fn dispatch(event: &TaskEvent, sink: &dyn NotificationSink) {
    let task = &event.task;
    match &event.kind {
        TaskEventKind::StatusChanged(status) => sink.status_changed(task, *status),
        TaskEventKind::ImageReady(image) => sink.image_ready(task, image.as_ref()),
        TaskEventKind::UploadStarted => sink.upload_started(task),
        TaskEventKind::UploadProgressChanged(progress) => sink.upload_progress_changed(task, *progress),
        TaskEventKind::UploadCompleted => sink.upload_completed(task),
        TaskEventKind::TaskCompleted(status) => sink.task_completed(task, *status),
    }
}

/// Drain `receiver` into `sink` until every sender is gone
///
/// Returns the number of events delivered.
pub async fn relay(mut receiver: mpsc::UnboundedReceiver<TaskEvent>, sink: Arc<dyn NotificationSink>) -> usize {
    let mut delivered = 0;
    while let Some(event) = receiver.recv().await {
        dispatch(&event, sink.as_ref());
        delivered += 1;
    }
    tracing::debug!("Notification relay closed after {} events", delivered);
    delivered
}

/// Sink that writes every notification to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn status_changed(&self, task: &Arc<WorkerTask>, status: TaskStatus) {
        tracing::debug!("Task {} ({}): {}", task.id(), task.file_name(), status.status_text());
    }

    fn image_ready(&self, task: &Arc<WorkerTask>, image: Option<&DynamicImage>) {
        if let Some(image) = image {
            tracing::debug!("Task {} preview ready ({}x{})", task.id(), image.width(), image.height());
        }
    }

    fn upload_progress_changed(&self, task: &Arc<WorkerTask>, progress: UploadProgress) {
        tracing::trace!("Task {} upload {:.1}%", task.id(), progress.percentage());
    }

    fn task_completed(&self, task: &Arc<WorkerTask>, status: TaskStatus) {
        let info = task.info();
        match status {
            TaskStatus::Completed => tracing::info!(
                "{}: {}",
                info.file_name,
                info.summary().unwrap_or_default()
            ),
            TaskStatus::Failed => tracing::error!(
                "{}: {}",
                info.file_name,
                info.result.errors_to_string().unwrap_or_default()
            ),
            _ => tracing::info!("{}: {}", info.file_name, status.status_text()),
        }
    }
}
