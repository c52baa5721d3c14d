//! Stage execution for a running task
//!
//! Order: image processors, clipboard / pin / print, encode and save, file actions, text
//! save, upload with retry, OCR. Stop is checked before every stage. Any error or panic
//! raised by a collaborator before the upload starts is recorded and aborts the capture
//! side; upload failures go through the retry policy and end up in the task result
//! instead. Once the upload has started, the remaining stages only log their failures.

use bytes::Bytes;
use image::DynamicImage;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::{with_extension, Payload, WorkerTask};
use crate::error::{Error, Result};
use crate::providers::uploader::invalid_config_result;
use crate::providers::{Desktop, Dialogs, ImageProcessor, ProcessOutcome, UploadContext};
use crate::task::events::TaskEventKind;
use crate::task::services::TaskServices;
use crate::types::{
    AfterCaptureJobs, AfterUploadJobs, DataType, TaskJob, TaskSettings, UploadProgress, UploadResult,
    DEFAULT_ERROR_TITLE,
};

type ProcessStage = fn(&dyn ImageProcessor, &DynamicImage, &TaskSettings) -> Result<ProcessOutcome>;

/// Bookkeeping for one pass through the pipeline
#[derive(Debug, Default)]
pub(super) struct RunState {
    /// A stage failed or the capture side gave up
    pub(super) aborted: bool,
    pub(super) image_ready_sent: bool,
    /// `UploadStarted` went out; the upload result decides the outcome from here on
    pub(super) upload_started: bool,
}

impl WorkerTask {
    pub(super) fn execute(self: &Arc<Self>, services: &TaskServices, payload: &mut Payload, run: &mut RunState) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.execute_stages(services, payload, run)));
        if let Err(panic) = outcome {
            self.stage_error("pipeline", &panic_message(panic.as_ref()));
            run.aborted = !run.upload_started;
        }
    }

    fn execute_stages(self: &Arc<Self>, services: &TaskServices, payload: &mut Payload, run: &mut RunState) {
        let (job, settings) = self.with_info(|info| (info.job, Arc::clone(&info.settings)));
        let jobs = settings.after_capture;

        match job {
            TaskJob::Job => {
                let captured = self.capture_stages(services, &settings, payload);
                self.image_ready(payload, run);
                run.aborted = !captured || !self.file_stages(services, &settings, payload);
            }
            TaskJob::TextUpload => {
                self.image_ready(payload, run);
                run.aborted = !self.text_stages(services, &settings, payload);
            }
        }

        let upload = job == TaskJob::TextUpload || jobs.contains(AfterCaptureJobs::UPLOAD_TO_HOST);
        if upload && !run.aborted && !self.upload_stage(services, &settings, payload, run) {
            run.aborted = true;
        }

        // Runs on the last good image even when the capture side gave up
        if jobs.contains(AfterCaptureJobs::DO_OCR) && !self.stop.is_stopped() && !self.ocr_stage(services, payload, run) {
            run.aborted = true;
        }
    }

    fn image_ready(self: &Arc<Self>, payload: &Payload, run: &mut RunState) {
        if run.image_ready_sent {
            return;
        }
        run.image_ready_sent = true;
        self.emit_live(TaskEventKind::ImageReady(self.preview(payload)));
    }

    /// Image processors, clipboard, pin, print, encode, save and thumbnail
    fn capture_stages(&self, services: &TaskServices, settings: &TaskSettings, payload: &mut Payload) -> bool {
        let jobs = settings.after_capture;
        if payload.image.is_none() {
            return true;
        }

        let processors: [(AfterCaptureJobs, &str, ProcessStage); 3] = [
            (AfterCaptureJobs::BEAUTIFY_IMAGE, "beautify", |p, image, s| p.beautify(image, s)),
            (AfterCaptureJobs::ADD_IMAGE_EFFECTS, "effects", |p, image, s| p.apply_effects(image, s)),
            (AfterCaptureJobs::ANNOTATE_IMAGE, "annotate", |p, image, s| p.annotate(image, s)),
        ];

        for (flag, stage, process) in processors {
            if !jobs.contains(flag) {
                continue;
            }
            if self.stop.is_stopped() {
                return false;
            }
            let Some(image) = payload.image.as_ref() else {
                return false;
            };

            let processor = services.processor.as_ref();
            match self.guard(stage, || process(processor, image, settings)) {
                Some(ProcessOutcome::Keep) => {}
                Some(ProcessOutcome::Replace(next)) => payload.image = Some(next),
                Some(ProcessOutcome::Abort) => {
                    tracing::info!("Task {} capture aborted at stage '{}'", self.id, stage);
                    return false;
                }
                None => return false,
            }
        }

        let Some(image) = payload.image.as_ref() else {
            return false;
        };

        if jobs.contains(AfterCaptureJobs::COPY_IMAGE_TO_CLIPBOARD) {
            if self.stop.is_stopped() {
                return false;
            }
            let copy = image.clone();
            if !self.on_desktop(services, "copy_image", move |desktop| desktop.copy_image(&copy)) {
                return false;
            }
            tracing::debug!("Task {} image copied to clipboard", self.id);
        }

        if jobs.contains(AfterCaptureJobs::PIN_TO_SCREEN) {
            if self.stop.is_stopped() {
                return false;
            }
            let copy = image.clone();
            if !self.on_desktop(services, "pin_to_screen", move |desktop| desktop.pin_to_screen(copy)) {
                return false;
            }
        }

        if jobs.contains(AfterCaptureJobs::SEND_IMAGE_TO_PRINTER) {
            if self.stop.is_stopped() {
                return false;
            }
            let copy = image.clone();
            if !self.on_desktop(services, "print", move |desktop| desktop.print(&copy)) {
                return false;
            }
        }

        if !settings.needs_encoded_image() {
            return true;
        }

        if self.stop.is_stopped() {
            return false;
        }
        let Some(encoded) = self.guard("encode", || services.encoder.encode(image, settings)) else {
            return false;
        };
        let file_name = {
            let mut info = self.info.write();
            let renamed = with_extension(&info.file_name, encoded.extension);
            info.file_name = renamed.clone();
            renamed
        };
        let data = encoded.data;
        payload.data = Some(data.clone());

        if jobs.contains(AfterCaptureJobs::SAVE_IMAGE_TO_FILE) {
            if self.stop.is_stopped() {
                return false;
            }
            let folder = &settings.screenshots_folder;
            let saved = self.guard("save_image", || {
                services.files.save(folder, &file_name, &data, settings.overwrite_existing)
            });
            match saved {
                Some(path) => {
                    tracing::debug!("Task {} image saved to {}", self.id, path.display());
                    self.info.write().file_path = Some(path);
                }
                None => return false,
            }
        }

        if jobs.contains(AfterCaptureJobs::SAVE_IMAGE_TO_FILE_WITH_DIALOG)
            && !self.save_with_dialog(services, settings, &file_name, &data)
        {
            return false;
        }

        if jobs.contains(AfterCaptureJobs::SAVE_THUMBNAIL_IMAGE_TO_FILE) {
            if self.stop.is_stopped() {
                return false;
            }
            let source = self
                .with_info(|info| info.file_path.clone())
                .unwrap_or_else(|| settings.screenshots_folder.join(&file_name));
            let thumbnail = self.guard("save_thumbnail", || {
                services
                    .files
                    .save_thumbnail(image, &source, settings.thumbnail_width, settings.thumbnail_height)
            });
            match thumbnail {
                Some(path) => self.info.write().thumbnail_file_path = Some(path),
                None => return false,
            }
        }

        true
    }

    /// Ask for a path until the image is written or the dialog is cancelled
    fn save_with_dialog(&self, services: &TaskServices, settings: &TaskSettings, file_name: &str, data: &Bytes) -> bool {
        let folder = self
            .with_info(|info| info.file_path.as_ref().and_then(|p| p.parent().map(Path::to_path_buf)))
            .unwrap_or_else(|| settings.screenshots_folder.clone());
        let suggested = folder.join(file_name);

        loop {
            if self.stop.is_stopped() {
                return false;
            }

            let prompt = suggested.clone();
            let Some(chosen) = self.on_dialogs(services, "save_dialog", move |dialogs| dialogs.choose_save_path(&prompt))
            else {
                return false;
            };
            let Some(path) = chosen else {
                return true;
            };

            match services.files.write(&path, data) {
                Ok(()) => {
                    tracing::debug!("Task {} image saved with dialog to {}", self.id, path.display());
                    self.info.write().file_path = Some(path);
                    return true;
                }
                Err(e) => tracing::warn!("Failed to save {}: {}", path.display(), e),
            }
        }
    }

    /// Actions on the saved file; skipped when there is no file on disk
    fn file_stages(&self, services: &TaskServices, settings: &TaskSettings, payload: &mut Payload) -> bool {
        let jobs = settings.after_capture;
        let Some(mut path) = self.with_info(|info| info.file_path.clone()) else {
            return true;
        };
        if !services.files.exists(&path) {
            return true;
        }

        if jobs.contains(AfterCaptureJobs::PERFORM_ACTIONS) {
            if self.stop.is_stopped() {
                return false;
            }
            match self.guard("perform_actions", || services.actions.run(&path, settings)) {
                Some(Some(modified)) => {
                    let Some(data) = self.guard("load_file", || services.files.load(&modified)) else {
                        return false;
                    };
                    payload.data = Some(data);

                    let mut info = self.info.write();
                    if let Some(extension) = modified.extension() {
                        let renamed = with_extension(&info.file_name, &extension.to_string_lossy());
                        info.file_name = renamed;
                    }
                    info.file_path = Some(modified.clone());
                    drop(info);

                    tracing::debug!("Task {} file replaced by {}", self.id, modified.display());
                    path = modified;
                }
                Some(None) => {}
                None => return false,
            }
        }

        if jobs.contains(AfterCaptureJobs::COPY_FILE_TO_CLIPBOARD) {
            if self.stop.is_stopped() {
                return false;
            }
            let file = path.clone();
            if !self.on_desktop(services, "copy_file", move |desktop| desktop.copy_file(&file)) {
                return false;
            }
        } else if jobs.contains(AfterCaptureJobs::COPY_FILE_PATH_TO_CLIPBOARD) {
            if self.stop.is_stopped() {
                return false;
            }
            let text = path.display().to_string();
            if !self.on_desktop(services, "copy_file_path", move |desktop| desktop.copy_text(&text)) {
                return false;
            }
        }

        if jobs.contains(AfterCaptureJobs::SHOW_IN_EXPLORER) {
            if self.stop.is_stopped() {
                return false;
            }
            let file = path.clone();
            if !self.on_desktop(services, "show_in_folder", move |desktop| desktop.show_in_folder(&file)) {
                return false;
            }
        }

        true
    }

    fn text_stages(&self, services: &TaskServices, settings: &TaskSettings, payload: &mut Payload) -> bool {
        let text = payload.text.take().unwrap_or_default();

        if settings.text_save_as_file {
            if self.stop.is_stopped() {
                return false;
            }
            let file_name = self.file_name();
            let saved = self.guard("save_text", || {
                services.files.save(
                    &settings.screenshots_folder,
                    &file_name,
                    text.as_bytes(),
                    settings.overwrite_existing,
                )
            });
            match saved {
                Some(path) => {
                    tracing::debug!("Task {} text saved to {}", self.id, path.display());
                    self.info.write().file_path = Some(path);
                }
                None => return false,
            }
        }

        payload.data = Some(Bytes::from(text.into_bytes()));
        true
    }

    /// Upload the payload through the destination's uploader with retry
    ///
    /// Returns `false` only when a collaborator failed before the upload could start.
    fn upload_stage(
        self: &Arc<Self>,
        services: &TaskServices,
        settings: &TaskSettings,
        payload: &mut Payload,
        run: &mut RunState,
    ) -> bool {
        if self.stop.is_stopped() {
            return true;
        }

        if payload.data.is_none() {
            let Some(path) = self.with_info(|info| info.file_path.clone()) else {
                tracing::warn!("Task {} has nothing to upload", self.id);
                return true;
            };
            match self.guard("load_file", || services.files.load(&path)) {
                Some(data) => payload.data = Some(data),
                None => return false,
            }
        }
        let Some(data) = payload.data.clone() else {
            return true;
        };

        if let Some(threshold) = services.large_file_threshold {
            let size = data.len() as u64;
            if size > threshold {
                match self.on_dialogs(services, "confirm_upload", move |dialogs| {
                    dialogs.confirm_large_upload(size, threshold)
                }) {
                    Some(true) => {}
                    Some(false) => {
                        tracing::info!("Task {} upload of {} bytes declined", self.id, size);
                        self.stop();
                        return true;
                    }
                    None => return false,
                }
            }
        }

        if self.stop.is_stopped() {
            return true;
        }

        let (file_name, data_type, destination) =
            self.with_info(|info| (info.file_name.clone(), info.data_type, info.destination().to_string()));

        let service = match services.uploaders.get(&destination) {
            Ok(service) => service,
            Err(e) => {
                tracing::error!("Task {}: {}", self.id, e);
                self.info.write().result.errors.add(e.to_string());
                return true;
            }
        };

        {
            let mut info = self.info.write();
            info.status_text = "Uploading...".to_string();
            info.uploader_host = Some(service.name().to_string());
        }
        self.emit_live(TaskEventKind::UploadStarted);
        run.upload_started = true;

        if !service.check_config() {
            self.merge_result(invalid_config_result(service.as_ref()));
            return true;
        }

        tracing::info!("Task {} uploading {} ({} bytes) to {}", self.id, file_name, data.len(), service.name());

        let error_title = format!("{} error", service.name());
        let progress = |progress: UploadProgress| {
            self.info.write().progress = Some(progress);
            self.emit_live(TaskEventKind::UploadProgressChanged(progress));
        };

        let started = Instant::now();
        let outcome = services.retry.run(&self.stop, |attempt| {
            if attempt > 0 {
                tracing::info!("Task {} retrying upload (attempt {})", self.id, attempt + 1);
            }

            let uploader = match service.create_uploader() {
                Ok(uploader) => uploader,
                Err(e) => return UploadResult::failure(error_title.clone(), e.to_string()),
            };
            *self.uploader.lock() = Some(Arc::clone(&uploader));
            if self.stop.is_stopped() {
                uploader.cancel();
            }

            let ctx = UploadContext::new(&file_name, data_type, &self.stop, &error_title, &progress);
            let result = catch_unwind(AssertUnwindSafe(|| uploader.upload(&data, &ctx))).unwrap_or_else(|panic| {
                UploadResult::failure(DEFAULT_ERROR_TITLE, panic_message(panic.as_ref()))
            });

            *self.uploader.lock() = None;
            result
        });
        let elapsed = started.elapsed();

        let success = !outcome.result.is_error();
        tracing::info!(
            "Task {} upload {} after {} attempt(s) in {:?}",
            self.id,
            if success { "succeeded" } else { "failed" },
            outcome.attempts,
            elapsed
        );

        self.info.write().upload_duration = Some(elapsed);
        self.merge_result(outcome.result);

        if !success || self.stop.is_stopped() {
            return true;
        }

        self.emit_live(TaskEventKind::UploadCompleted);

        if settings.after_upload.contains(AfterUploadJobs::COPY_URL_TO_CLIPBOARD) {
            if let Some(url) = self.with_info(|info| info.result.best_url().map(str::to_string)) {
                if let Err(message) = self.desktop_call(services, move |desktop| desktop.copy_text(&url)) {
                    tracing::warn!("Task {} could not copy URL to clipboard: {}", self.id, message);
                }
            }
        }

        true
    }

    fn ocr_stage(&self, services: &TaskServices, payload: &Payload, run: &RunState) -> bool {
        if self.with_info(|info| info.data_type) != DataType::Image {
            return true;
        }
        let Some(image) = payload.image.as_ref() else {
            return true;
        };

        let text = if run.upload_started {
            match attempt(|| services.ocr.recognize(image)) {
                Ok(text) => text,
                Err(message) => {
                    tracing::warn!("Task {} OCR failed after upload: {}", self.id, message);
                    return true;
                }
            }
        } else {
            match self.guard("ocr", || services.ocr.recognize(image)) {
                Some(text) => text,
                None => return false,
            }
        };

        if let Some(text) = &text {
            tracing::debug!("Task {} recognized {} characters", self.id, text.len());
        }
        self.info.write().ocr_text = text;
        true
    }

    /// Keep errors recorded so far ahead of the upload's own errors
    fn merge_result(&self, result: UploadResult) {
        let mut info = self.info.write();
        let mut errors = std::mem::take(&mut info.result.errors);
        let mut result = result;
        if !errors.is_empty() {
            errors.extend(&result.errors);
            result.errors = errors;
        }
        info.result = result;
    }

    /// Run a collaborator call, turning errors and panics into error entries
    fn guard<T>(&self, stage: &str, f: impl FnOnce() -> Result<T>) -> Option<T> {
        match attempt(f) {
            Ok(value) => Some(value),
            Err(message) => {
                self.stage_error(stage, &message);
                None
            }
        }
    }

    fn stage_error(&self, stage: &str, message: &str) {
        tracing::error!("Task {} stage '{}' failed: {}", self.id, stage, message);
        let error = Error::stage(stage, message);
        self.info.write().result.errors.add(error.to_string());
    }

    /// Call the desktop collaborator, on the affinity thread when it asks for one
    fn on_desktop<F>(&self, services: &TaskServices, stage: &str, f: F) -> bool
    where
        F: FnOnce(&dyn Desktop) -> Result<()> + Send + 'static,
    {
        match self.desktop_call(services, f) {
            Ok(()) => true,
            Err(message) => {
                self.stage_error(stage, &message);
                false
            }
        }
    }

    fn desktop_call<F>(&self, services: &TaskServices, f: F) -> std::result::Result<(), String>
    where
        F: FnOnce(&dyn Desktop) -> Result<()> + Send + 'static,
    {
        let desktop = Arc::clone(&services.desktop);
        let affinity = Arc::clone(&services.affinity);
        attempt(move || {
            if desktop.requires_affinity() {
                affinity.run(move || f(desktop.as_ref()))?
            } else {
                f(desktop.as_ref())
            }
        })
    }

    /// Ask the user, on the affinity thread when the dialogs need one
    fn on_dialogs<T, F>(&self, services: &TaskServices, stage: &str, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Dialogs) -> T + Send + 'static,
    {
        let dialogs = Arc::clone(&services.dialogs);
        let affinity = Arc::clone(&services.affinity);
        self.guard(stage, move || {
            if dialogs.requires_affinity() {
                affinity.run(move || f(dialogs.as_ref()))
            } else {
                Ok(f(dialogs.as_ref()))
            }
        })
    }
}

/// Run `f`, flattening its error or panic into a message
fn attempt<T>(f: impl FnOnce() -> Result<T>) -> std::result::Result<T, String> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
