//! snapqueue CLI: push files through the task scheduler into a local folder
//!
//! Run with: cargo run -p snapqueue -- --dest ./uploaded shots/ notes.txt

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use clap::Parser;
use console::style;
use dashmap::DashMap;
use image::DynamicImage;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::Notify;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use walkdir::WalkDir;

use snapqueue::providers::local::DirectoryUploaderService;
use snapqueue::providers::{HistorySink, UploaderRegistry};
use snapqueue::scheduler::relay;
use snapqueue::types::UploadProgress;
use snapqueue::{
    AfterCaptureJobs, AppConfig, HistoryDb, NotificationSink, TaskManager, TaskMetadata, TaskServices, TaskStatus,
    WorkerTask,
};

const DESTINATION: &str = "local";

/// Upload files through the snapqueue scheduler
#[derive(Parser)]
#[command(name = "snapqueue", version, about)]
struct Cli {
    /// Files or directories to upload; directories are walked recursively
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Folder the local uploader copies files into
    #[arg(short, long)]
    dest: PathBuf,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Concurrent upload limit, 0 for unlimited
    #[arg(short, long)]
    limit: Option<usize>,

    /// Upload retries per task
    #[arg(short, long)]
    retries: Option<u32>,

    /// Do not record completed tasks in the history database
    #[arg(long)]
    no_history: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

/// Per-task line of the final report
#[derive(Serialize)]
struct TaskSummary {
    file_name: String,
    status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<u128>,
}

/// Progress bars driven by task notifications
struct ProgressSink {
    multi: MultiProgress,
    style: ProgressStyle,
    bars: DashMap<Uuid, ProgressBar>,
    remaining: AtomicUsize,
    finished: Notify,
}

impl ProgressSink {
    fn new(total: usize) -> anyhow::Result<Self> {
        let style = ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("=> ");

        Ok(Self {
            multi: MultiProgress::new(),
            style,
            bars: DashMap::new(),
            remaining: AtomicUsize::new(total),
            finished: Notify::new(),
        })
    }

    fn bar(&self, task: &Arc<WorkerTask>) -> ProgressBar {
        self.bars
            .entry(task.id())
            .or_insert_with(|| {
                let bar = self.multi.add(ProgressBar::new(100));
                bar.set_style(self.style.clone());
                bar.set_message(task.file_name());
                bar
            })
            .clone()
    }
}

impl NotificationSink for ProgressSink {
    fn status_changed(&self, task: &Arc<WorkerTask>, status: TaskStatus) {
        let bar = self.bar(task);
        bar.set_message(format!("{} {}", task.file_name(), style(status.status_text()).dim()));
    }

    fn image_ready(&self, _task: &Arc<WorkerTask>, _image: Option<&DynamicImage>) {}

    fn upload_progress_changed(&self, task: &Arc<WorkerTask>, progress: UploadProgress) {
        self.bar(task).set_position(progress.percentage() as u64);
    }

    fn task_completed(&self, task: &Arc<WorkerTask>, status: TaskStatus) {
        let label = match status {
            TaskStatus::Completed => style(status.status_text()).green(),
            TaskStatus::Failed => style(status.status_text()).red(),
            _ => style(status.status_text()).yellow(),
        };

        if let Some((_, bar)) = self.bars.remove(&task.id()) {
            bar.finish_with_message(format!("{} {}", task.file_name(), label));
        }

        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.finished.notify_one();
        }
    }
}

/// Expand directories into the files below them
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(
                WalkDir::new(path)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.into_path()),
            );
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            tracing::warn!("Skipping {}: not a file or directory", path.display());
        }
    }
    files
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    };

    if let Some(limit) = cli.limit {
        config.scheduler.upload_limit = limit;
    }
    if let Some(retries) = cli.retries {
        config.upload.max_retries = retries;
    }
    if cli.no_history {
        config.history.save_tasks = false;
    }

    let task = &mut config.default_task;
    task.image_destination = DESTINATION.to_string();
    task.text_destination = DESTINATION.to_string();
    task.file_destination = DESTINATION.to_string();
    task.after_capture |= AfterCaptureJobs::UPLOAD_TO_HOST;

    config.validate()?;
    Ok(config)
}

fn open_history(config: &AppConfig) -> Option<Arc<HistoryDb>> {
    if !config.history.save_tasks {
        return None;
    }
    match HistoryDb::new(&config.history.database_path) {
        Ok(db) => Some(Arc::new(db)),
        Err(e) => {
            tracing::warn!("History disabled: {}", e);
            None
        }
    }
}

fn summarize(task: &WorkerTask) -> TaskSummary {
    let info = task.info();
    TaskSummary {
        file_name: info.file_name.clone(),
        status: task.status(),
        url: info.result.best_url().map(str::to_string),
        errors: info.result.errors.iter().map(|e| e.to_string()).collect(),
        duration_ms: info.task_duration().map(|d| d.as_millis()),
    }
}

fn print_report(summaries: &[TaskSummary], dest: &Path) {
    for summary in summaries {
        let status = match summary.status {
            TaskStatus::Completed => style("ok").green().bold(),
            TaskStatus::Failed => style("failed").red().bold(),
            _ => style("stopped").yellow().bold(),
        };
        println!("{:>8} {}", status, summary.file_name);
        if let Some(url) = &summary.url {
            println!("         {}", style(url).dim());
        }
        for error in &summary.errors {
            println!("         {}", style(error).red());
        }
    }

    let completed = summaries.iter().filter(|s| s.status == TaskStatus::Completed).count();
    println!(
        "\n{} of {} uploaded to {}",
        style(completed).bold(),
        summaries.len(),
        dest.display()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapqueue=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let files = collect_files(&cli.paths);
    if files.is_empty() {
        anyhow::bail!("no files found under the given paths");
    }

    tracing::info!(
        "Queueing {} files (limit {}, retries {})",
        files.len(),
        config.scheduler.upload_limit,
        config.upload.max_retries
    );

    let registry = UploaderRegistry::new().with(Arc::new(DirectoryUploaderService::new(DESTINATION, &cli.dest)));
    let services = Arc::new(TaskServices::from_config(&config, Arc::new(registry))?);

    let history = open_history(&config);
    let (manager, events) = TaskManager::new(&config, history.clone().map(|db| db as Arc<dyn HistorySink>));

    let sink = Arc::new(ProgressSink::new(files.len())?);
    let relay = tokio::spawn(relay(events, sink.clone()));

    for path in files {
        let task = WorkerTask::file(
            path,
            TaskMetadata::default(),
            config.default_task.clone(),
            Arc::clone(&services),
            None,
        );
        manager.start(task);
    }

    tokio::select! {
        _ = sink.finished.notified() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping all tasks");
            manager.stop_all();
            sink.finished.notified().await;
        }
    }

    let tasks = manager.tasks();
    drop(manager);
    let delivered = relay.await?;
    tracing::debug!("Relayed {} notifications", delivered);

    let summaries: Vec<TaskSummary> = tasks.iter().map(|t| summarize(t)).collect();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print_report(&summaries, &cli.dest);
    }

    if let Some(db) = history {
        match db.count() {
            Ok(count) => tracing::info!("History holds {} entries", count),
            Err(e) => tracing::warn!("Failed to count history entries: {}", e),
        }
    }

    let failed = summaries.iter().any(|s| s.status != TaskStatus::Completed);
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
