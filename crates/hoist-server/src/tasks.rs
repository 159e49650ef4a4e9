//! Bounded background task queue.
//!
//! Notifications and snapshot uploads run here instead of being spawned
//! ad hoc: a fixed set of workers drains a bounded channel, a full channel
//! rejects new jobs without blocking the caller, and shutdown drains what
//! is already queued.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics::TASK_QUEUE_REJECTIONS_TOTAL;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Cloneable handle to a worker pool.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<(&'static str, Job)>,
    cancel: CancellationToken,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TaskQueue {
    /// Spawn `workers` workers sharing a queue of `capacity` jobs.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<(&'static str, Job)>(capacity.max(1));
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let cancel = CancellationToken::new();

        let handles = (0..workers.max(1))
            .map(|worker| {
                let rx = rx.clone();
                let cancel = cancel.clone();
                tokio::spawn(run_worker(worker, rx, cancel))
            })
            .collect();

        Self {
            tx,
            cancel,
            workers: Arc::new(Mutex::new(handles)),
        }
    }

    /// Queue `job` without waiting.
    ///
    /// Returns `false` (and counts a rejection) when the queue is full or
    /// shutting down.
    pub fn submit<F>(&self, label: &'static str, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            debug!(label, "task queue shut down, dropping job");
            counter!(TASK_QUEUE_REJECTIONS_TOTAL, "reason" => "shutdown").increment(1);
            return false;
        }
        match self.tx.try_send((label, Box::pin(job))) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(label, "task queue full, dropping job");
                counter!(TASK_QUEUE_REJECTIONS_TOTAL, "reason" => "full").increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(label, "task queue closed, dropping job");
                counter!(TASK_QUEUE_REJECTIONS_TOTAL, "reason" => "shutdown").increment(1);
                false
            }
        }
    }

    /// Jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Stop accepting jobs, let workers drain the queue, and wait up to
    /// `timeout` for them to finish.
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        if handles.is_empty() {
            return;
        }
        info!(workers = handles.len(), queued = self.queued(), "draining task queue");
        if tokio::time::timeout(timeout, join_all(handles)).await.is_err() {
            warn!("task queue drain timed out after {timeout:?}");
        }
    }
}

async fn run_worker(
    worker: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<(&'static str, Job)>>>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                job = rx.recv() => job,
                () = cancel.cancelled() => rx.try_recv().ok(),
            }
        };
        let Some((label, job)) = next else { break };

        // A panicking job must not take the worker down with it.
        if let Err(e) = tokio::spawn(job).await {
            warn!(worker, label, error = %e, "background job panicked");
        }
    }
    debug!(worker, "task worker stopped");
}
