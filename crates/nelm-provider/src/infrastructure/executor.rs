//! Fixed-size worker pool for event-driven and connection work.
//!
//! Producers call [`WorkerPool::submit`], which never blocks: jobs go onto an
//! unbounded queue and at most `size` of them run at once.  Every job runs in
//! its own Tokio task, so a job that panics is reported through its
//! `JoinError` and the worker carries on with the next one.
//!
//! ```text
//! submit() ──► [ queue ] ──► worker 0 ──► tokio::spawn(job)
//!                        ├─► worker 1 ──► tokio::spawn(job)
//!                        └─► worker N ──► tokio::spawn(job)
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::join_all;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Task {
    label: String,
    job: Job,
}

pub struct WorkerPool {
    name: String,
    size: usize,
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts `size` workers (at least one).  Must be called from within a
    /// Tokio runtime.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        let name = name.into();
        let size = size.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Task>();
        let queue = Arc::new(AsyncMutex::new(rx));

        let workers = (0..size)
            .map(|index| tokio::spawn(run_worker(name.clone(), index, Arc::clone(&queue))))
            .collect();

        Self {
            name,
            size,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queues `job`.  Returns `false` if the pool has been shut down.
    pub fn submit<F>(&self, label: impl Into<String>, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        let sender = lock(&self.sender);
        let Some(tx) = sender.as_ref() else {
            debug!("{} pool is shut down; dropping '{label}'", self.name);
            return false;
        };
        tx.send(Task {
            label,
            job: Box::pin(job),
        })
        .is_ok()
    }

    /// Stops accepting jobs, lets the workers drain the queue, and waits for
    /// them to finish.
    pub async fn shutdown(&self) {
        lock(&self.sender).take();
        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        for outcome in join_all(workers).await {
            if let Err(e) = outcome {
                error!("{} pool worker ended abnormally: {e}", self.name);
            }
        }
        debug!("{} pool stopped", self.name);
    }
}

async fn run_worker(pool: String, index: usize, queue: Arc<AsyncMutex<mpsc::UnboundedReceiver<Task>>>) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some(Task { label, job }) = next else {
            break;
        };
        if let Err(e) = tokio::spawn(job).await {
            error!("{pool}-{index}: task '{label}' failed: {e}");
        }
    }
}

// A panic while holding these locks cannot leave the guarded data half-written.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
