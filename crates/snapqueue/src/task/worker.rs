//! Per-task state machine and its runner thread

mod pipeline;

use bytes::Bytes;
use chrono::Utc;
use image::DynamicImage;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::cell::Cell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use uuid::Uuid;

use super::events::{TaskEvent, TaskEventKind, TaskListener};
use super::services::TaskServices;
use super::status::TaskStatus;
use super::stop::StopToken;
use crate::providers::Uploader;
use crate::types::{
    DataType, RecentTask, TaskInfo, TaskJob, TaskMetadata, TaskSettings, UploadProgress, UploadResult,
};

/// Heavyweight data owned by the runner while the task executes
#[derive(Default)]
pub(crate) struct Payload {
    pub(crate) image: Option<DynamicImage>,
    pub(crate) data: Option<Bytes>,
    pub(crate) text: Option<String>,
}

/// One capture / file / text job and its lifecycle
///
/// Tasks are created `Queued` by one of the factories and always handled through an
/// `Arc`. Only the runner thread mutates the task info; `stop()` may be called from any
/// thread.
pub struct WorkerTask {
    id: Uuid,
    /// Re-entrant so listeners may query or stop the task from inside `on_event`
    state: ReentrantMutex<Cell<TaskStatus>>,
    info: RwLock<TaskInfo>,
    stop: StopToken,
    /// Capture side gave up; ends the task as stopped without touching `stop`
    aborted: AtomicBool,
    keep_image: AtomicBool,
    payload: Mutex<Payload>,
    uploader: Mutex<Option<Arc<dyn Uploader>>>,
    listener: OnceLock<Arc<dyn TaskListener>>,
    services: Option<Arc<TaskServices>>,
}

impl WorkerTask {
    fn new(info: TaskInfo, status: TaskStatus, payload: Payload, services: Option<Arc<TaskServices>>) -> Self {
        Self {
            id: info.id,
            state: ReentrantMutex::new(Cell::new(status)),
            info: RwLock::new(info),
            stop: StopToken::new(),
            aborted: AtomicBool::new(false),
            keep_image: AtomicBool::new(false),
            payload: Mutex::new(payload),
            uploader: Mutex::new(None),
            listener: OnceLock::new(),
            services,
        }
    }

    fn queued(mut info: TaskInfo, payload: Payload, services: Arc<TaskServices>) -> Arc<Self> {
        info.status_text = TaskStatus::Queued.status_text().to_string();
        Arc::new(Self::new(info, TaskStatus::Queued, payload, Some(services)))
    }

    /// Task for a freshly captured image
    pub fn image(
        metadata: TaskMetadata,
        image: DynamicImage,
        settings: TaskSettings,
        services: Arc<TaskServices>,
        custom_name: Option<&str>,
    ) -> Arc<Self> {
        let extension = settings.image_format.extension();
        let base = custom_name
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| settings.generate_name());

        let mut info = TaskInfo::new(Arc::new(settings), TaskJob::Job, DataType::Image);
        info.file_name = format!("{}.{}", base, extension);
        info.metadata = metadata;

        let payload = Payload {
            image: Some(image),
            ..Payload::default()
        };
        Self::queued(info, payload, services)
    }

    /// Task for a file that already exists on disk
    pub fn file(
        path: impl Into<PathBuf>,
        metadata: TaskMetadata,
        settings: TaskSettings,
        services: Arc<TaskServices>,
        custom_name: Option<&str>,
    ) -> Arc<Self> {
        let path = path.into();
        let original_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut info = TaskInfo::new(Arc::new(settings), TaskJob::Job, DataType::from_path(&path));
        info.file_name = match custom_name.filter(|name| !name.trim().is_empty()) {
            Some(name) => match Path::new(&original_name).extension() {
                Some(ext) => format!("{}.{}", name, ext.to_string_lossy()),
                None => name.to_string(),
            },
            None => original_name,
        };
        info.file_path = Some(path);
        info.metadata = metadata;

        Self::queued(info, Payload::default(), services)
    }

    /// Task that uploads a piece of text
    pub fn text(text: impl Into<String>, settings: TaskSettings, services: Arc<TaskServices>) -> Arc<Self> {
        let base = settings.generate_name();
        let mut info = TaskInfo::new(Arc::new(settings), TaskJob::TextUpload, DataType::Text);
        info.file_name = format!("{}.txt", base);

        let payload = Payload {
            text: Some(text.into()),
            ..Payload::default()
        };
        Self::queued(info, payload, services)
    }

    /// Read-only entry rebuilt from the history log; never runs
    pub fn history(recent: &RecentTask) -> Arc<Self> {
        let mut info = TaskInfo::new(Arc::new(TaskSettings::default()), TaskJob::Job, DataType::File);
        info.data_type = DataType::from_path(&recent.file_name);
        info.file_name = recent.file_name.clone();
        info.file_path = recent.file_path.clone();
        info.end_time = Some(recent.time);
        info.status_text = TaskStatus::History.status_text().to_string();
        if let Some(url) = &recent.url {
            info.result = UploadResult::success(url.clone());
        }

        Arc::new(Self::new(info, TaskStatus::History, Payload::default(), None))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().get()
    }

    pub fn is_working(&self) -> bool {
        self.status().is_working()
    }

    pub fn is_busy(&self) -> bool {
        self.status().is_busy()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Snapshot of the task info
    pub fn info(&self) -> TaskInfo {
        self.info.read().clone()
    }

    /// Read the task info without cloning it
    pub fn with_info<R>(&self, f: impl FnOnce(&TaskInfo) -> R) -> R {
        f(&self.info.read())
    }

    pub fn file_name(&self) -> String {
        self.info.read().file_name.clone()
    }

    pub fn result(&self) -> UploadResult {
        self.info.read().result.clone()
    }

    pub fn progress(&self) -> Option<UploadProgress> {
        self.info.read().progress
    }

    /// Whether the final image was retained for a completion notification
    pub fn keep_image(&self) -> bool {
        self.keep_image.load(Ordering::SeqCst)
    }

    /// Take ownership of the retained image
    pub fn take_image(&self) -> Option<DynamicImage> {
        let mut payload = self.payload.lock();
        if !self.keep_image.swap(false, Ordering::SeqCst) {
            return None;
        }
        payload.image.take()
    }

    /// Attach the listener that receives this task's events. Only the first call wins.
    pub fn set_listener(&self, listener: Arc<dyn TaskListener>) -> bool {
        self.listener.set(listener).is_ok()
    }

    /// Release the payload. A retained image survives only while `keep_image` is set.
    pub fn dispose(&self) {
        let mut payload = self.payload.lock();
        payload.data = None;
        payload.text = None;
        if !self.keep_image() {
            payload.image = None;
        }
    }

    /// Move `Queued → Preparing` and spawn the runner thread.
    ///
    /// Returns `false` without side effects unless the task is queued and no stop was
    /// requested.
    pub fn start(self: &Arc<Self>) -> bool {
        {
            let state = self.state.lock();
            if state.get() != TaskStatus::Queued || self.stop.is_stopped() {
                return false;
            }

            state.set(TaskStatus::Preparing);
            {
                let mut info = self.info.write();
                info.start_time = Some(Utc::now());
                info.status_text = TaskStatus::Preparing.status_text().to_string();
            }
            self.emit(TaskEventKind::StatusChanged(TaskStatus::Preparing));
        }

        let task = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("snapqueue-task-{}", &self.id.simple().to_string()[..8]))
            .spawn(move || task.run());

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn runner for task {}: {}", self.id, e);
            self.info.write().result.errors.add(format!("Failed to start task: {}", e));
            self.dispose();
            self.finish();
        }

        true
    }

    /// Request a stop.
    ///
    /// A queued task completes as `Stopped` immediately. A running task moves to
    /// `Stopping` and its active uploader is cancelled; the runner finishes it later.
    /// Further calls do nothing.
    pub fn stop(self: &Arc<Self>) {
        self.stop.stop();

        let state = self.state.lock();
        match state.get() {
            TaskStatus::Queued => {
                state.set(TaskStatus::Stopped);
                {
                    let mut info = self.info.write();
                    info.end_time = Some(Utc::now());
                    info.status_text = TaskStatus::Stopped.status_text().to_string();
                }
                drop(state);

                tracing::info!("Task {} stopped before it started", self.id);
                self.dispose();
                self.emit(TaskEventKind::TaskCompleted(TaskStatus::Stopped));
            }
            TaskStatus::Preparing | TaskStatus::Working => {
                if let Some(uploader) = self.uploader.lock().as_ref() {
                    uploader.cancel();
                }
                state.set(TaskStatus::Stopping);
                self.info.write().status_text = TaskStatus::Stopping.status_text().to_string();
                self.emit(TaskEventKind::StatusChanged(TaskStatus::Stopping));
            }
            _ => {}
        }
    }

    /// Raise the stop flag without a transition, so admission skips the task
    pub(crate) fn request_stop(&self) {
        self.stop.stop();
    }

    /// Runner thread body
    fn run(self: Arc<Self>) {
        let proceed = {
            let state = self.state.lock();
            if state.get() == TaskStatus::Preparing {
                state.set(TaskStatus::Working);
                self.info.write().status_text = TaskStatus::Working.status_text().to_string();
                self.emit(TaskEventKind::StatusChanged(TaskStatus::Working));
                true
            } else {
                false
            }
        };

        let mut payload = std::mem::take(&mut *self.payload.lock());
        let mut run = pipeline::RunState::default();

        match &self.services {
            Some(services) if proceed => self.execute(services, &mut payload, &mut run),
            Some(_) => {}
            None => {
                self.info.write().result.errors.add("Task has no services attached");
            }
        }

        if !run.image_ready_sent {
            let preview = self.preview(&payload);
            self.emit_live(TaskEventKind::ImageReady(preview));
        }

        if run.aborted {
            self.aborted.store(true, Ordering::SeqCst);
        }

        let keep = payload.image.is_some() && self.with_info(|info| info.settings.show_toast_after_completed);
        self.keep_image.store(keep, Ordering::SeqCst);
        if keep {
            self.payload.lock().image = payload.image.take();
        }
        drop(payload);

        self.finish();
    }

    /// Enter the terminal state and emit `TaskCompleted`
    fn finish(self: &Arc<Self>) {
        let status = {
            let state = self.state.lock();

            let next = if self.stop.is_stopped() || self.aborted.load(Ordering::SeqCst) {
                TaskStatus::Stopped
            } else if self.info.read().result.is_error() {
                TaskStatus::Failed
            } else {
                TaskStatus::Completed
            };

            // A stop that raced a failed spawn still has to pass through Stopping
            if state.get() == TaskStatus::Preparing && next == TaskStatus::Stopped {
                state.set(TaskStatus::Stopping);
                self.emit(TaskEventKind::StatusChanged(TaskStatus::Stopping));
            }

            let current = state.get();
            if !current.can_transition_to(next) {
                tracing::error!("Task {} finished with unexpected transition {} -> {}", self.id, current, next);
            }

            state.set(next);
            let mut info = self.info.write();
            info.end_time = Some(Utc::now());
            info.status_text = next.status_text().to_string();
            next
        };

        match status {
            TaskStatus::Failed => tracing::error!(
                "Task {} failed: {}",
                self.id,
                self.result().errors_to_string().unwrap_or_default()
            ),
            _ => tracing::info!("Task {} {}", self.id, status),
        }

        self.emit(TaskEventKind::TaskCompleted(status));
    }

    fn preview(&self, payload: &Payload) -> Option<DynamicImage> {
        if self.with_info(|info| info.settings.keep_preview_image) {
            payload.image.clone()
        } else {
            None
        }
    }

    fn emit(self: &Arc<Self>, kind: TaskEventKind) {
        if let Some(listener) = self.listener.get() {
            listener.on_event(TaskEvent {
                task: Arc::clone(self),
                kind,
            });
        }
    }

    /// Emit a non-final event, ordered against status transitions
    fn emit_live(self: &Arc<Self>, kind: TaskEventKind) {
        let state = self.state.lock();
        if !state.get().is_terminal() {
            self.emit(kind);
        }
    }
}

impl fmt::Debug for WorkerTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerTask")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("file_name", &self.file_name())
            .field("stop_requested", &self.is_stop_requested())
            .finish()
    }
}

/// `name` with its extension replaced by `extension`
pub(crate) fn with_extension(name: &str, extension: &str) -> String {
    let path = Path::new(name);
    match path.extension() {
        Some(_) => path.with_extension(extension).to_string_lossy().into_owned(),
        None => format!("{}.{}", name, extension),
    }
}
