//! Dedicated thread for collaborators bound to a single thread
//!
//! Clipboard, pin-to-screen, print and dialog providers on some desktops must always be
//! called from the same thread. Runner threads hand those calls to one `AffinityWorker` and
//! block until the reply arrives.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, ThreadId};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the affinity thread. Dropping the last handle shuts the thread down.
pub struct AffinityWorker {
    sender: mpsc::UnboundedSender<Job>,
    thread_id: ThreadId,
}

impl AffinityWorker {
    /// Spawn the affinity thread
    pub fn spawn(name: impl Into<String>) -> Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();

        let handle = thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    job();
                }
                tracing::debug!("Affinity worker stopped");
            })
            .map_err(|e| Error::Spawn(e.to_string()))?;

        Ok(Self {
            sender,
            thread_id: handle.thread().id(),
        })
    }

    /// Run `f` on the affinity thread and wait for its return value.
    ///
    /// Must not be called from inside an async runtime. A panic inside `f` is re-raised on
    /// the calling thread; the affinity thread keeps running.
    pub fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        if thread::current().id() == self.thread_id {
            return Ok(f());
        }

        let (reply, response) = oneshot::channel();
        let job: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(f));
            let _ = reply.send(outcome);
        });

        self.sender.send(job).map_err(|_| Error::AffinityClosed)?;

        match response.blocking_recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(panic)) => std::panic::resume_unwind(panic),
            Err(_) => Err(Error::AffinityClosed),
        }
    }

    /// Id of the affinity thread
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }
}

impl std::fmt::Debug for AffinityWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffinityWorker")
            .field("thread_id", &self.thread_id)
            .finish()
    }
}
