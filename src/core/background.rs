use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;
use tracing::warn;

/// Fire-and-forget work whose outcome never reaches the caller.
///
/// Tasks are spawned on the ambient tokio runtime and tracked so that tests and
/// the binary can drain them before inspecting backend state or exiting.
#[derive(Clone, Debug, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    // Serializes drains: one waiter's reopen must not strand another waiter.
    drain: Arc<Mutex<()>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` if a runtime is available. Returns whether it was spawned.
    pub fn spawn<F>(&self, label: &'static str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => {
                self.tracker.spawn_on(task, &handle);
                true
            }
            Err(_) => {
                warn!(task = label, "no async runtime available; skipping background task");
                false
            }
        }
    }

    /// Spawn a fallible task and log its error at `warn`.
    pub fn spawn_best_effort<F, E>(&self, label: &'static str, task: F) -> bool
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        self.spawn(label, async move {
            if let Err(err) = task.await {
                warn!(task = label, error = %err, "background backend call failed");
            }
        })
    }

    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every task spawned so far. New tasks may be spawned afterwards.
    ///
    /// Concurrent callers drain one after another.
    pub async fn wait(&self) {
        let _draining = self.drain.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
