//! Task runner: state machine, cancellation, retry and stage execution

pub mod affinity;
pub mod events;
pub mod retry;
pub mod services;
pub mod status;
pub mod stop;
pub mod worker;

pub use affinity::AffinityWorker;
pub use events::{TaskEvent, TaskEventKind, TaskListener};
pub use retry::{RetryOutcome, RetryPolicy};
pub use services::TaskServices;
pub use status::TaskStatus;
pub use stop::StopToken;
pub use worker::WorkerTask;
