use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::Inner;
use crate::error::{Result, SchedulerError};
use crate::store::Dispatch;

/// Fixed set of workers draining a shared queue of due occurrences.
///
/// The queue is unbounded but the worker count is not: when every worker is
/// busy, further occurrences wait in line instead of spawning more
/// concurrent executions.
pub(crate) struct ExecutionPool {
    max_workers: usize,
    runtime: Mutex<Option<PoolRuntime>>,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
}

struct PoolRuntime {
    tx: mpsc::UnboundedSender<Dispatch>,
    /// `true` tells workers to drop whatever is still queued.
    drop_queued: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl ExecutionPool {
    pub(crate) fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            runtime: Mutex::new(None),
            active: Arc::new(AtomicUsize::new(0)),
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Executions currently running.
    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Occurrences waiting for a free worker.
    pub(crate) fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub(crate) fn is_open(&self) -> bool {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Spawn the workers. Must be called from within a Tokio runtime.
    /// No-op when already running.
    pub(crate) fn start(&self, inner: Weak<Inner>) {
        let mut runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        if runtime.is_some() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel::<Dispatch>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let (drop_queued, drop_rx) = watch::channel(false);

        let workers = (0..self.max_workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    inner.clone(),
                    Arc::clone(&rx),
                    drop_rx.clone(),
                    Arc::clone(&self.active),
                    Arc::clone(&self.queued),
                ))
            })
            .collect();

        *runtime = Some(PoolRuntime { tx, drop_queued, workers });
        info!(workers = self.max_workers, "execution pool started");
    }

    /// Queue an occurrence. Hands the dispatch back when the pool is closed.
    pub(crate) fn submit(&self, dispatch: Dispatch) -> std::result::Result<(), Dispatch> {
        let runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(rt) = runtime.as_ref() else {
            return Err(dispatch);
        };
        self.queued.fetch_add(1, Ordering::SeqCst);
        rt.tx.send(dispatch).map_err(|e| {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            e.0
        })
    }

    /// Close the queue and stop the workers.
    ///
    /// With `Some(bound)`, waits up to `bound` for queued and in-flight work;
    /// whatever is still queued afterwards is dropped. With `None`, queued
    /// work is dropped immediately and in-flight executions finish on their
    /// own. Running task bodies are never aborted.
    pub(crate) async fn shutdown(&self, wait: Option<Duration>) -> Result<()> {
        let runtime = self.runtime.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(PoolRuntime { tx, drop_queued, workers }) = runtime else {
            return Err(SchedulerError::PoolClosed);
        };
        if wait.is_none() {
            let _ = drop_queued.send(true);
        }
        // Workers exit once the channel is drained and every sender is gone.
        drop(tx);

        let Some(bound) = wait else {
            info!(dropped = self.queued(), "execution pool stopped without waiting");
            return Ok(());
        };

        let drained = tokio::time::timeout(bound, async {
            for handle in workers {
                let _ = handle.await;
            }
        })
        .await;

        match drained {
            Ok(()) => info!("execution pool drained and stopped"),
            Err(_) => {
                let _ = drop_queued.send(true);
                warn!(
                    active = self.active(),
                    dropped = self.queued(),
                    "execution pool shutdown timed out; in-flight runs left to finish"
                );
            }
        }
        Ok(())
    }
}

async fn worker_loop(
    worker: usize,
    inner: Weak<Inner>,
    rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Dispatch>>>,
    drop_queued: watch::Receiver<bool>,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
) {
    debug!(worker, "execution worker started");
    loop {
        let next = rx.lock().await.recv().await;
        let Some(dispatch) = next else { break };
        queued.fetch_sub(1, Ordering::SeqCst);

        let Some(inner) = inner.upgrade() else { break };
        if *drop_queued.borrow() {
            debug!(job_id = %dispatch.job_id, "dropping queued occurrence on shutdown");
            inner.release(&dispatch);
            continue;
        }

        active.fetch_add(1, Ordering::SeqCst);
        inner.execute(dispatch).await;
        active.fetch_sub(1, Ordering::SeqCst);
    }
    debug!(worker, "execution worker stopped");
}
