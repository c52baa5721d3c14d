//! Test doubles shared by the unit tests

use image::{DynamicImage, RgbaImage};
use parking_lot::{Condvar, Mutex};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::providers::{Desktop, Dialogs, HistorySink, ImageProcessor, OcrProvider, ProcessOutcome};
use crate::providers::{UploadContext, Uploader, UploaderRegistry, UploaderService};
use crate::task::{RetryPolicy, TaskEvent, TaskEventKind, TaskListener, TaskServices, TaskStatus, WorkerTask};
use crate::types::{HistoryItem, TaskSettings, UploadResult};

pub const WAIT: Duration = Duration::from_secs(10);

pub fn sample_image() -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 8, image::Rgba([200, 100, 50, 255])))
}

/// Settings with only `jobs` enabled and files going to `folder`
pub fn settings_in(folder: &Path, jobs: crate::types::AfterCaptureJobs) -> TaskSettings {
    TaskSettings {
        screenshots_folder: folder.to_path_buf(),
        image_destination: "stub".to_string(),
        text_destination: "stub".to_string(),
        file_destination: "stub".to_string(),
        ..TaskSettings::default()
    }
    .with_jobs(jobs)
}

/// Local services around `service` with a short retry delay
pub fn services_with(service: Arc<dyn UploaderService>, max_retries: u32) -> TaskServices {
    let registry = Arc::new(UploaderRegistry::new().with(service));
    TaskServices::new(registry)
        .unwrap()
        .with_retry(RetryPolicy::new(max_retries, Duration::from_millis(10)))
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Listener that records every event
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<TaskEventKind>>,
    completed: Condvar,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach(self: &Arc<Self>, task: &Arc<WorkerTask>) {
        task.set_listener(self.clone());
    }

    pub fn events(&self) -> Vec<TaskEventKind> {
        self.events.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.name()).collect()
    }

    pub fn statuses(&self) -> Vec<TaskStatus> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TaskEventKind::StatusChanged(status) => Some(*status),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name() == name).count()
    }

    /// Block until `TaskCompleted` arrives and return its status
    pub fn wait_completed(&self) -> TaskStatus {
        let deadline = Instant::now() + WAIT;
        let mut events = self.events.lock();
        loop {
            let done = events.iter().find_map(|e| match e {
                TaskEventKind::TaskCompleted(status) => Some(*status),
                _ => None,
            });
            if let Some(status) = done {
                return status;
            }
            if self.completed.wait_until(&mut events, deadline).timed_out() {
                panic!("task did not complete in time; events: {:?}", events.iter().map(|e| e.name()).collect::<Vec<_>>());
            }
        }
    }
}

impl TaskListener for RecordingListener {
    fn on_event(&self, event: TaskEvent) {
        self.events.lock().push(event.kind);
        self.completed.notify_all();
    }
}

/// Listener that records events and stops the task once it reports `trigger`
pub struct StopOnStatus {
    trigger: TaskStatus,
    pub recorder: Arc<RecordingListener>,
    /// `status()` as read from inside the triggering callback
    pub observed: Mutex<Option<TaskStatus>>,
}

impl StopOnStatus {
    pub fn new(trigger: TaskStatus) -> Arc<Self> {
        Arc::new(Self {
            trigger,
            recorder: RecordingListener::new(),
            observed: Mutex::new(None),
        })
    }

    pub fn attach(self: &Arc<Self>, task: &Arc<WorkerTask>) {
        task.set_listener(self.clone());
    }
}

impl TaskListener for StopOnStatus {
    fn on_event(&self, event: TaskEvent) {
        let task = Arc::clone(&event.task);
        let triggered = matches!(event.kind, TaskEventKind::StatusChanged(status) if status == self.trigger);
        self.recorder.on_event(event);
        if triggered {
            *self.observed.lock() = Some(task.status());
            task.stop();
        }
    }
}

/// Uploader service that fails a fixed number of attempts before succeeding
pub struct ScriptedService {
    failures: u32,
    attempts: Arc<AtomicU32>,
    configured: bool,
}

impl ScriptedService {
    /// Fails the first `failures` attempts
    pub fn failing(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            attempts: Arc::new(AtomicU32::new(0)),
            configured: true,
        })
    }

    pub fn succeeding() -> Arc<Self> {
        Self::failing(0)
    }

    pub fn unconfigured() -> Arc<Self> {
        Arc::new(Self {
            failures: 0,
            attempts: Arc::new(AtomicU32::new(0)),
            configured: false,
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl UploaderService for ScriptedService {
    fn id(&self) -> &str {
        "stub"
    }

    fn name(&self) -> &str {
        "Stub"
    }

    fn check_config(&self) -> bool {
        self.configured
    }

    fn create_uploader(&self) -> Result<Arc<dyn Uploader>> {
        Ok(Arc::new(ScriptedUploader {
            failures: self.failures,
            attempts: self.attempts.clone(),
        }))
    }
}

struct ScriptedUploader {
    failures: u32,
    attempts: Arc<AtomicU32>,
}

impl Uploader for ScriptedUploader {
    fn upload(&self, data: &[u8], ctx: &UploadContext<'_>) -> UploadResult {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        ctx.report_progress(data.len() as u64 / 2, data.len() as u64);
        if attempt < self.failures {
            return ctx.failure(format!("attempt {} failed", attempt + 1));
        }
        ctx.report_progress(data.len() as u64, data.len() as u64);
        UploadResult::success(format!("https://stub.example/{}", ctx.file_name))
    }
}

/// Uploader service whose uploads block until cancelled
#[derive(Default)]
pub struct BlockingService {
    started: AtomicU32,
    cancelled: Arc<AtomicU32>,
}

impl BlockingService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Uploaders created so far
    pub fn started(&self) -> u32 {
        self.started.load(Ordering::SeqCst)
    }

    /// Uploaders cancelled so far
    pub fn cancelled(&self) -> u32 {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl UploaderService for BlockingService {
    fn id(&self) -> &str {
        "stub"
    }

    fn name(&self) -> &str {
        "Blocking"
    }

    fn create_uploader(&self) -> Result<Arc<dyn Uploader>> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(BlockingUploader {
            cancelled: AtomicBool::new(false),
            cancels: self.cancelled.clone(),
        }))
    }
}

struct BlockingUploader {
    cancelled: AtomicBool,
    cancels: Arc<AtomicU32>,
}

impl Uploader for BlockingUploader {
    fn upload(&self, _data: &[u8], ctx: &UploadContext<'_>) -> UploadResult {
        let deadline = Instant::now() + WAIT;
        while !self.cancelled.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        ctx.failure("Upload cancelled")
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// History sink that records appended items
#[derive(Default)]
pub struct RecordingHistory {
    pub items: Mutex<Vec<HistoryItem>>,
}

impl RecordingHistory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}

impl HistorySink for RecordingHistory {
    fn append(&self, item: &HistoryItem) -> Result<()> {
        self.items.lock().push(item.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<HistoryItem>> {
        let items = self.items.lock();
        Ok(items.iter().rev().take(limit).cloned().collect())
    }
}

/// Processor whose stages abort, fail, panic or replace the image
pub enum StubProcessor {
    Abort,
    Fail,
    Panic,
    Shrink,
}

impl ImageProcessor for StubProcessor {
    fn beautify(&self, image: &DynamicImage, _settings: &TaskSettings) -> Result<ProcessOutcome> {
        match self {
            Self::Abort => Ok(ProcessOutcome::Abort),
            Self::Fail => Err(Error::internal("beautifier crashed")),
            Self::Panic => panic!("beautifier panicked"),
            Self::Shrink => Ok(ProcessOutcome::Replace(image.thumbnail(4, 2))),
        }
    }
}

/// Desktop that records which thread each call ran on
pub struct RecordingDesktop {
    affinity: bool,
    fail_copy_text: bool,
    pub calls: Mutex<Vec<(String, ThreadId)>>,
}

impl RecordingDesktop {
    pub fn new(affinity: bool) -> Arc<Self> {
        Arc::new(Self {
            affinity,
            fail_copy_text: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Desktop whose clipboard rejects text
    pub fn failing_copy_text() -> Arc<Self> {
        Arc::new(Self {
            affinity: false,
            fail_copy_text: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().push((call, thread::current().id()));
        Ok(())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(c, _)| c.clone()).collect()
    }
}

impl Desktop for RecordingDesktop {
    fn requires_affinity(&self) -> bool {
        self.affinity
    }

    fn copy_image(&self, _image: &DynamicImage) -> Result<()> {
        self.record("copy_image".to_string())
    }

    fn copy_file(&self, path: &Path) -> Result<()> {
        self.record(format!("copy_file:{}", path.display()))
    }

    fn copy_text(&self, text: &str) -> Result<()> {
        self.record(format!("copy_text:{}", text))?;
        if self.fail_copy_text {
            return Err(Error::internal("clipboard busy"));
        }
        Ok(())
    }

    fn pin_to_screen(&self, _image: DynamicImage) -> Result<()> {
        self.record("pin".to_string())
    }

    fn print(&self, _image: &DynamicImage) -> Result<()> {
        self.record("print".to_string())
    }

    fn show_in_folder(&self, path: &Path) -> Result<()> {
        self.record(format!("show:{}", path.display()))
    }
}

/// Dialogs with fixed answers
pub struct StubDialogs {
    pub allow_large_upload: bool,
    pub save_path: Option<std::path::PathBuf>,
}

impl Dialogs for StubDialogs {
    fn choose_save_path(&self, _suggested: &Path) -> Option<std::path::PathBuf> {
        self.save_path.clone()
    }

    fn confirm_large_upload(&self, _size: u64, _threshold: u64) -> bool {
        self.allow_large_upload
    }
}

/// OCR that always fails
pub struct FailingOcr;

impl OcrProvider for FailingOcr {
    fn recognize(&self, _image: &DynamicImage) -> Result<Option<String>> {
        Err(Error::internal("recognizer unavailable"))
    }
}

/// OCR that reports the image size
pub struct SizeOcr;

impl OcrProvider for SizeOcr {
    fn recognize(&self, image: &DynamicImage) -> Result<Option<String>> {
        Ok(Some(format!("{}x{}", image.width(), image.height())))
    }
}
