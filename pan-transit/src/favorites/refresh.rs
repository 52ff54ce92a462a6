//! Background line refresh.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::warn;

/// Default number of refreshes allowed to query providers at once.
const DEFAULT_CONCURRENCY: usize = 4;

/// Runs fire-and-forget refresh tasks on a tokio runtime.
///
/// Each task holds a semaphore permit while it runs, which bounds the load
/// a burst of refreshes (e.g. at startup) puts on provider APIs. Mutating
/// callers never wait for a task. [`settle`](Self::settle) waits for all of
/// them; shutdown bounds that wait with a timeout.
#[derive(Debug, Clone)]
pub struct LineRefresher {
    handle: Handle,
    permits: Arc<Semaphore>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl LineRefresher {
    /// Spawn tasks on the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        Self::with_concurrency(handle, DEFAULT_CONCURRENCY)
    }

    /// Spawn tasks on `handle`, at most `n` running at once.
    pub fn with_concurrency(handle: Handle, n: usize) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(n.max(1))),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Refresher on the runtime of the calling task, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Run `task` in the background once a permit is free.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let handle = self.handle.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Number of tasks spawned and not yet finished.
    pub fn pending(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|task| !task.is_finished())
            .count()
    }

    /// Wait for every task spawned so far, including tasks spawned by the
    /// tasks being waited for.
    pub async fn settle(&self) {
        loop {
            let pending = {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *tasks)
            };
            if pending.is_empty() {
                return;
            }
            for task in pending {
                if let Err(e) = task.await {
                    warn!(error = %e, "Line refresh task failed");
                }
            }
        }
    }
}
