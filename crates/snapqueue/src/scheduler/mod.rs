//! Scheduling of worker tasks under an upload budget, plus outbound notifications

mod manager;
mod notify;
mod recent;

pub use manager::TaskManager;
pub use notify::{dispatch, relay, LogSink, NotificationSink};
pub use recent::RecentTasks;
