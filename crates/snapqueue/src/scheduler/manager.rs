//! Task registry and admission under the upload budget

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::recent::RecentTasks;
use crate::config::AppConfig;
use crate::error::Result;
use crate::providers::HistorySink;
use crate::task::{TaskEvent, TaskEventKind, TaskListener, TaskStatus, WorkerTask};
use crate::types::{HistoryItem, RecentTask};

/// Owns every task and decides which queued tasks may start
///
/// At most `upload_limit` tasks are working at once (0 = unlimited); queued tasks are
/// admitted in insertion order whenever a task is added, a task completes or the limit
/// changes. Every task event is forwarded to the channel returned by [`TaskManager::new`].
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    tasks: RwLock<Vec<Arc<WorkerTask>>>,
    /// Serializes admission; re-entered when a start fails synchronously
    admission: ReentrantMutex<()>,
    upload_limit: AtomicUsize,
    events: mpsc::UnboundedSender<TaskEvent>,
    history: Option<Arc<dyn HistorySink>>,
    save_tasks: bool,
    recent: Mutex<RecentTasks>,
}

/// Listener attached to every managed task
struct ManagerListener {
    inner: Weak<ManagerInner>,
}

impl TaskManager {
    /// Create a manager and the receiver for its task events
    pub fn new(
        config: &AppConfig,
        history: Option<Arc<dyn HistorySink>>,
    ) -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();

        let inner = ManagerInner {
            tasks: RwLock::new(Vec::new()),
            admission: ReentrantMutex::new(()),
            upload_limit: AtomicUsize::new(config.scheduler.upload_limit),
            events,
            history,
            save_tasks: config.history.save_tasks,
            recent: Mutex::new(RecentTasks::new(config.history.recent_tasks_max)),
        };

        (Self { inner: Arc::new(inner) }, receiver)
    }

    /// Register a task and admit queued tasks up to the limit
    ///
    /// `History` tasks are only listed.
    pub fn start(&self, task: Arc<WorkerTask>) {
        {
            let mut tasks = self.inner.tasks.write();
            if tasks.iter().any(|t| t.id() == task.id()) {
                tracing::warn!("Task {} is already managed", task.id());
                return;
            }
            tasks.push(Arc::clone(&task));
        }

        if task.status() == TaskStatus::History {
            return;
        }

        let listener = Arc::new(ManagerListener {
            inner: Arc::downgrade(&self.inner),
        });
        if !task.set_listener(listener) {
            tracing::warn!("Task {} already has a listener; its events are not forwarded", task.id());
        }

        tracing::debug!("Task {} queued ({})", task.id(), task.file_name());
        self.inner.start_tasks();
    }

    /// Stop a task, drop it from the manager and release its payload
    pub fn remove(&self, task: &Arc<WorkerTask>) -> bool {
        task.stop();

        let removed = {
            let mut tasks = self.inner.tasks.write();
            let before = tasks.len();
            tasks.retain(|t| t.id() != task.id());
            tasks.len() != before
        };

        task.dispose();
        if removed {
            tracing::debug!("Task {} removed", task.id());
        }
        removed
    }

    /// Stop every task, queued ones first
    pub fn stop_all(&self) {
        let tasks = self.tasks();

        // Flag first so completions triggered below cannot admit anything
        for task in &tasks {
            if task.status() == TaskStatus::Queued {
                task.request_stop();
            }
        }

        for task in tasks.iter().filter(|t| t.status() == TaskStatus::Queued) {
            task.stop();
        }
        for task in tasks.iter().filter(|t| t.is_working()) {
            task.stop();
        }
    }

    /// Change the concurrency budget and re-run admission
    pub fn set_upload_limit(&self, limit: usize) {
        self.inner.upload_limit.store(limit, Ordering::SeqCst);
        tracing::info!("Upload limit set to {}", limit);
        self.inner.start_tasks();
    }

    pub fn upload_limit(&self) -> usize {
        self.inner.upload_limit.load(Ordering::SeqCst)
    }

    /// Any task queued or occupying a slot
    pub fn is_busy(&self) -> bool {
        self.tasks().iter().any(|t| t.is_busy())
    }

    /// Mean upload percentage over `Working` tasks
    ///
    /// `None` when nothing is working; tasks without progress yet are left out of the mean.
    pub fn average_progress(&self) -> Option<f64> {
        let working: Vec<_> = self
            .tasks()
            .into_iter()
            .filter(|t| t.status() == TaskStatus::Working)
            .collect();
        if working.is_empty() {
            return None;
        }

        let percentages: Vec<f64> = working
            .iter()
            .filter_map(|t| t.progress())
            .map(|p| p.percentage())
            .collect();
        if percentages.is_empty() {
            return Some(0.0);
        }
        Some(percentages.iter().sum::<f64>() / percentages.len() as f64)
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<WorkerTask>> {
        self.inner.tasks.read().iter().find(|t| t.id() == id).cloned()
    }

    /// Snapshot of all tasks in insertion order
    pub fn tasks(&self) -> Vec<Arc<WorkerTask>> {
        self.inner.tasks.read().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.read().is_empty()
    }

    /// Recently completed tasks, newest first
    pub fn recent_tasks(&self) -> Vec<RecentTask> {
        self.inner.recent.lock().to_vec()
    }

    /// Load the recent list from the history sink and list each entry as a `History` task
    pub fn restore_recent(&self) -> Result<usize> {
        let Some(history) = &self.inner.history else {
            return Ok(0);
        };

        let max = self.inner.recent.lock().max();
        let items = history.recent(max)?;
        let recent: Vec<RecentTask> = items.iter().map(RecentTask::from).collect();

        self.inner.recent.lock().restore(recent.iter().cloned());
        for entry in recent.iter().rev() {
            self.start(WorkerTask::history(entry));
        }

        tracing::info!("Restored {} recent tasks", recent.len());
        Ok(recent.len())
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl ManagerInner {
    /// Admit queued tasks until the budget is spent
    fn start_tasks(&self) {
        let _admission = self.admission.lock();

        loop {
            let tasks = self.tasks.read().clone();
            let limit = self.upload_limit.load(Ordering::SeqCst);
            let working = tasks.iter().filter(|t| t.is_working()).count();
            if limit != 0 && working >= limit {
                break;
            }

            let Some(next) = tasks
                .iter()
                .find(|t| t.status() == TaskStatus::Queued && !t.is_stop_requested())
            else {
                break;
            };

            if next.start() {
                tracing::debug!("Task {} admitted ({} working, limit {})", next.id(), working + 1, limit);
            }
        }
    }

    fn task_completed(&self, task: &Arc<WorkerTask>, status: TaskStatus) {
        if status == TaskStatus::Completed && !task.is_stop_requested() {
            let info = task.info();
            if info.summary().is_some_and(|s| !s.is_empty()) {
                let item = info.history_item();
                self.recent.lock().push(RecentTask::from(&item));
                if self.save_tasks {
                    if let Some(history) = &self.history {
                        append_history(Arc::clone(history), item);
                    }
                }
            }
        }

        self.start_tasks();
    }
}

impl TaskListener for ManagerListener {
    fn on_event(&self, event: TaskEvent) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        let completed = match event.kind {
            TaskEventKind::TaskCompleted(status) => Some((Arc::clone(&event.task), status)),
            _ => None,
        };

        // Receiver may be gone; tasks keep running regardless
        let _ = inner.events.send(event);

        if let Some((task, status)) = completed {
            inner.task_completed(&task, status);
        }
    }
}

/// Append on a background thread; failures are only logged
fn append_history(history: Arc<dyn HistorySink>, item: HistoryItem) {
    let spawned = thread::Builder::new()
        .name("snapqueue-history".to_string())
        .spawn(move || {
            if let Err(e) = history.append(&item) {
                tracing::error!("Failed to append history item {}: {}", item.file_name, e);
            }
        });

    if let Err(e) = spawned {
        tracing::error!("Failed to spawn history writer: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskServices;
    use crate::testing::*;
    use crate::types::{AfterCaptureJobs, TaskMetadata};
    use std::path::Path;

    fn config(limit: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.scheduler.upload_limit = limit;
        config
    }

    fn upload_task(dir: &Path, services: &Arc<TaskServices>) -> Arc<WorkerTask> {
        WorkerTask::image(
            TaskMetadata::default(),
            sample_image(),
            settings_in(dir, AfterCaptureJobs::UPLOAD_TO_HOST),
            Arc::clone(services),
            None,
        )
    }

    fn working(manager: &TaskManager) -> usize {
        manager.tasks().iter().filter(|t| t.is_working()).count()
    }

    fn finished(manager: &TaskManager) -> bool {
        manager.tasks().iter().all(|t| t.status().is_terminal())
    }

    #[test]
    fn test_limit_two_with_three_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let service = BlockingService::new();
        let services = Arc::new(services_with(service.clone(), 0));
        let (manager, _events) = TaskManager::new(&config(2), None);

        let tasks: Vec<_> = (0..3).map(|_| upload_task(dir.path(), &services)).collect();
        for task in &tasks {
            manager.start(task.clone());
        }

        assert!(wait_until(WAIT, || service.started() == 2));
        assert_eq!(working(&manager), 2);
        assert_eq!(tasks[2].status(), TaskStatus::Queued);
        assert!(manager.is_busy());

        tasks[0].stop();
        assert!(wait_until(WAIT, || service.started() == 3));
        assert_eq!(tasks[0].status(), TaskStatus::Stopped);
        assert!(working(&manager) <= 2);

        manager.stop_all();
        assert!(wait_until(WAIT, || finished(&manager)));
        assert!(!manager.is_busy());
        assert!(tasks.iter().all(|t| t.status() == TaskStatus::Stopped));
    }

    #[test]
    fn test_working_never_exceeds_limit() {
        let dir = tempfile::tempdir().unwrap();
        let services = Arc::new(services_with(ScriptedService::succeeding(), 0));
        let (manager, mut events) = TaskManager::new(&config(2), None);

        for _ in 0..6 {
            manager.start(upload_task(dir.path(), &services));
        }

        let mut completed = 0;
        while completed < 6 {
            let event = events.blocking_recv().unwrap();
            if matches!(event.kind, TaskEventKind::StatusChanged(_)) {
                assert!(working(&manager) <= 2);
            }
            if matches!(event.kind, TaskEventKind::TaskCompleted(_)) {
                completed += 1;
            }
        }
        assert!(manager.tasks().iter().all(|t| t.status() == TaskStatus::Completed));
    }

    #[test]
    fn test_zero_limit_is_unlimited() {
        let dir = tempfile::tempdir().unwrap();
        let service = BlockingService::new();
        let services = Arc::new(services_with(service.clone(), 0));
        let (manager, _events) = TaskManager::new(&config(0), None);

        for _ in 0..4 {
            manager.start(upload_task(dir.path(), &services));
        }

        assert!(wait_until(WAIT, || service.started() == 4));
        manager.stop_all();
        assert!(wait_until(WAIT, || finished(&manager)));
    }

    #[test]
    fn test_raising_limit_admits_queued() {
        let dir = tempfile::tempdir().unwrap();
        let service = BlockingService::new();
        let services = Arc::new(services_with(service.clone(), 0));
        let (manager, _events) = TaskManager::new(&config(1), None);

        for _ in 0..3 {
            manager.start(upload_task(dir.path(), &services));
        }
        assert!(wait_until(WAIT, || service.started() == 1));
        assert_eq!(manager.upload_limit(), 1);

        manager.set_upload_limit(3);
        assert!(wait_until(WAIT, || service.started() == 3));

        manager.stop_all();
        assert!(wait_until(WAIT, || finished(&manager)));
    }

    #[test]
    fn test_stop_all_stops_queued_without_starting_them() {
        let dir = tempfile::tempdir().unwrap();
        let service = BlockingService::new();
        let services = Arc::new(services_with(service.clone(), 0));
        let (manager, _events) = TaskManager::new(&config(1), None);

        for _ in 0..4 {
            manager.start(upload_task(dir.path(), &services));
        }
        assert!(wait_until(WAIT, || service.started() == 1));

        manager.stop_all();
        assert!(wait_until(WAIT, || finished(&manager)));
        assert_eq!(service.started(), 1);
        assert!(manager.tasks().iter().all(|t| t.status() == TaskStatus::Stopped));
    }

    #[test]
    fn test_history_only_for_completed_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let history = RecordingHistory::new();
        let (manager, _events) = TaskManager::new(&config(0), Some(history.clone() as Arc<dyn HistorySink>));

        let ok = Arc::new(services_with(ScriptedService::succeeding(), 0));
        let failing = Arc::new(services_with(ScriptedService::failing(5), 0));

        let done = upload_task(dir.path(), &ok);
        let failed = upload_task(dir.path(), &failing);
        manager.start(done.clone());
        manager.start(failed.clone());

        assert!(wait_until(WAIT, || finished(&manager)));
        assert_eq!(done.status(), TaskStatus::Completed);
        assert_eq!(failed.status(), TaskStatus::Failed);

        assert!(wait_until(WAIT, || history.len() == 1));
        let item = history.items.lock()[0].clone();
        assert_eq!(item.id, done.id());
        assert_eq!(item.host.as_deref(), Some("Stub"));

        let recent = manager.recent_tasks();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].url.as_deref(), Some(format!("https://stub.example/{}", done.file_name()).as_str()));
    }

    #[test]
    fn test_history_disabled_by_config() {
        let dir = tempfile::tempdir().unwrap();
        let history = RecordingHistory::new();
        let mut config = config(0);
        config.history.save_tasks = false;
        let (manager, _events) = TaskManager::new(&config, Some(history.clone() as Arc<dyn HistorySink>));

        let services = Arc::new(services_with(ScriptedService::succeeding(), 0));
        manager.start(upload_task(dir.path(), &services));

        assert!(wait_until(WAIT, || finished(&manager)));
        thread::sleep(std::time::Duration::from_millis(50));
        assert_eq!(history.len(), 0);
        assert_eq!(manager.recent_tasks().len(), 1);
    }

    #[test]
    fn test_remove_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let service = BlockingService::new();
        let services = Arc::new(services_with(service.clone(), 0));
        let (manager, _events) = TaskManager::new(&config(1), None);

        let first = upload_task(dir.path(), &services);
        let second = upload_task(dir.path(), &services);
        manager.start(first.clone());
        manager.start(second.clone());
        assert!(wait_until(WAIT, || service.started() == 1));
        assert!(manager.get(second.id()).is_some());

        assert!(manager.remove(&first));
        assert!(!manager.remove(&first));
        assert!(manager.get(first.id()).is_none());
        assert_eq!(manager.len(), 1);

        // The freed slot goes to the remaining task
        assert!(wait_until(WAIT, || service.started() == 2));
        manager.stop_all();
        assert!(wait_until(WAIT, || finished(&manager)));
    }

    #[test]
    fn test_average_progress() {
        let dir = tempfile::tempdir().unwrap();
        let service = BlockingService::new();
        let services = Arc::new(services_with(service.clone(), 0));
        let (manager, _events) = TaskManager::new(&config(0), None);
        assert_eq!(manager.average_progress(), None);

        manager.start(upload_task(dir.path(), &services));
        assert!(wait_until(WAIT, || service.started() == 1));
        assert_eq!(manager.average_progress(), Some(0.0));

        manager.stop_all();
        assert!(wait_until(WAIT, || finished(&manager)));
        assert_eq!(manager.average_progress(), None);
    }

    #[test]
    fn test_restore_recent_lists_history_tasks() {
        let history = RecordingHistory::new();
        for name in ["a.png", "b.txt"] {
            history
                .append(&HistoryItem {
                    id: Uuid::new_v4(),
                    file_name: name.to_string(),
                    file_path: None,
                    date_time: chrono::Utc::now(),
                    data_type: crate::types::DataType::from_path(name),
                    host: None,
                    url: Some(format!("https://example.com/{}", name)),
                    thumbnail_url: None,
                    deletion_url: None,
                    shortened_url: None,
                })
                .unwrap();
        }
        let (manager, _events) = TaskManager::new(&config(1), Some(history as Arc<dyn HistorySink>));

        assert_eq!(manager.restore_recent().unwrap(), 2);
        assert_eq!(manager.len(), 2);
        assert!(manager.tasks().iter().all(|t| t.status() == TaskStatus::History));
        assert!(!manager.is_busy());
        assert_eq!(manager.recent_tasks()[0].file_name, "b.txt");
        assert_eq!(manager.tasks()[1].file_name(), "b.txt");
    }
}
