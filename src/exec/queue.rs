// src/exec/queue.rs

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::{BatchError, Result};
use crate::exec::worker::{ProcessWorker, WorkerOutcome};

/// Counts collected by a successful [`ExecutionQueue::wait_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueReport {
    pub admitted: usize,
    pub succeeded: usize,
    pub cancelled: usize,
}

/// Bounded set of running workers.
///
/// Semantics:
/// - At most `capacity` workers run at once. [`admit`](Self::admit) waits for
///   a free slot, checking every `poll_interval` and whenever a worker
///   finishes.
/// - A finished worker leaves the running set but is kept until
///   [`wait_all`](Self::wait_all) joins it, so no result is lost.
/// - Cancelling the shared token, or calling [`terminate`](Self::terminate),
///   closes the queue: admission fails with `BatchError::Cancelled` instead of
///   waiting.
///
/// The running set is touched both by the orchestration (admit/drain) and by
/// an asynchronous stop request (terminate), hence the mutex. It is never held
/// across an await.
#[derive(Debug)]
pub struct ExecutionQueue {
    capacity: usize,
    poll_interval: Duration,
    cancel: CancellationToken,
    finished: Arc<Notify>,
    inner: Mutex<QueueInner>,
}

#[derive(Debug, Default)]
struct QueueInner {
    /// (admission sequence, worker)
    running: Vec<(u64, ProcessWorker)>,
    reaped: Vec<(u64, ProcessWorker)>,
    next_seq: u64,
    closed: bool,
}

impl QueueInner {
    /// Move every terminated worker from `running` to `reaped`.
    fn reap(&mut self) {
        let mut i = 0;
        while i < self.running.len() {
            if self.running[i].1.is_finished() {
                let (seq, worker) = self.running.remove(i);
                debug!(label = worker.label(), "worker finished; slot freed");
                self.reaped.push((seq, worker));
            } else {
                i += 1;
            }
        }
    }
}

impl ExecutionQueue {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize, poll_interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            capacity: capacity.max(1),
            poll_interval,
            cancel,
            finished: Arc::new(Notify::new()),
            inner: Mutex::new(QueueInner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of workers currently holding a slot.
    pub fn running(&self) -> usize {
        let mut inner = self.lock();
        inner.reap();
        inner.running.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed || self.cancel.is_cancelled()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait for a free slot, then start `worker` in it.
    pub async fn admit(&self, mut worker: ProcessWorker) -> Result<()> {
        loop {
            {
                let mut inner = self.lock();
                inner.reap();

                if inner.closed || self.cancel.is_cancelled() {
                    debug!(label = worker.label(), "queue closed; worker not admitted");
                    return Err(BatchError::Cancelled);
                }

                if inner.running.len() < self.capacity {
                    worker.start(Arc::clone(&self.finished))?;
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    debug!(
                        label = worker.label(),
                        seq,
                        running = inner.running.len() + 1,
                        capacity = self.capacity,
                        "worker admitted"
                    );
                    inner.running.push((seq, worker));
                    return Ok(());
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = self.finished.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// Wait until every admitted worker has terminated, then join them all in
    /// admission order.
    ///
    /// Every worker is joined even if an earlier one failed; the first error
    /// is returned only after that.
    pub async fn wait_all(&self) -> Result<QueueReport> {
        loop {
            {
                let mut inner = self.lock();
                inner.reap();
                if inner.running.is_empty() {
                    break;
                }
            }

            tokio::select! {
                _ = self.finished.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        let mut reaped = std::mem::take(&mut self.lock().reaped);
        reaped.sort_by_key(|(seq, _)| *seq);

        let mut report = QueueReport {
            admitted: reaped.len(),
            ..QueueReport::default()
        };
        let mut first_error: Option<BatchError> = None;

        for (_, worker) in reaped {
            let label = worker.label().to_string();
            match worker.join().await {
                Ok(WorkerOutcome::Succeeded) => report.succeeded += 1,
                Ok(WorkerOutcome::Cancelled) => report.cancelled += 1,
                Err(e) => {
                    warn!(label = %label, error = %e, "worker failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Interrupt every running worker and refuse further admissions.
    pub fn terminate(&self) {
        let mut inner = self.lock();
        inner.closed = true;

        let mut interrupted = 0;
        for (_, worker) in inner.running.iter().filter(|(_, w)| !w.is_finished()) {
            worker.interrupt();
            interrupted += 1;
        }

        info!(interrupted, "queue terminated; no further workers will be admitted");
    }
}
