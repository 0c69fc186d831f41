//! Sequenced executors for listener callbacks.
//!
//! Each listener registration carries an executor; callbacks submitted to
//! one executor run on a single task in submission order, so a listener
//! never observes its own callbacks concurrently or out of order. Neither
//! the transport worker nor the supervisor ever runs listener code
//! directly.

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send>;

/// A single-task sequenced dispatcher. Cloning yields another handle to
/// the same task; the task exits when every handle is dropped.
#[derive(Clone)]
pub struct EventExecutor {
    name: &'static str,
    tx: mpsc::UnboundedSender<Job>,
}

impl EventExecutor {
    pub fn new(name: &'static str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
        });
        Self {
            name,
            tx,
        }
    }

    /// Submit a callback. Jobs run in submission order. Submissions after
    /// the executor task has gone away are dropped.
    pub fn execute(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::debug!(executor = self.name, "executor gone, dropping callback");
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Debug for EventExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventExecutor").field("name", &self.name).finish()
    }
}
