//! Bounded worker pool over an item queue
//!
//! Each worker pulls one item id at a time and drives it end-to-end through
//! the orchestrator; the item lease guarantees no two workers ever hold the
//! same item even when it is enqueued twice. Parking at the approval gate
//! frees the worker — resumption re-enqueues the item through a
//! [`WorkQueue`] handle.
//!
//! The pool drains and stops once every [`WorkQueue`] handle has been
//! dropped; [`WorkerPool::shutdown`] drops the pool's own handle and waits
//! for the workers to finish what is queued.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::orchestrator::{EngineError, Orchestrator};

/// Sender half used to enqueue items for processing.
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl WorkQueue {
    /// Enqueue an item for a worker to pick up. Returns `false` when the
    /// pool has stopped.
    pub fn enqueue(&self, item_id: impl Into<String>) -> bool {
        self.tx.send(item_id.into()).is_ok()
    }
}

/// A running pool of workers sharing one queue.
pub struct WorkerPool {
    queue: WorkQueue,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `concurrency` workers against the orchestrator.
    #[must_use]
    pub fn spawn(orchestrator: Arc<Orchestrator>, concurrency: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..concurrency.max(1))
            .map(|worker_id| {
                let orchestrator = orchestrator.clone();
                let rx = rx.clone();
                tokio::spawn(async move {
                    loop {
                        // Hold the receiver lock only while waiting, so
                        // other workers can pull the next item during a
                        // long stage
                        let item_id = match rx.lock().await.recv().await {
                            Some(item) => item,
                            None => break,
                        };

                        debug!(worker_id, item_id = %item_id, "worker picked up item");
                        match orchestrator.advance(&item_id).await {
                            Ok(status) => {
                                debug!(worker_id, item_id = %item_id, status = %status, "worker done");
                            }
                            Err(EngineError::Leased { .. }) => {
                                // Another worker holds it; the queue had a duplicate
                                debug!(worker_id, item_id = %item_id, "item already leased");
                            }
                            Err(e) => {
                                warn!(worker_id, item_id = %item_id, error = %e, "worker error");
                            }
                        }
                    }
                    debug!(worker_id, "worker stopped");
                })
            })
            .collect();

        Self {
            queue: WorkQueue { tx },
            workers,
        }
    }

    /// A handle for enqueueing items. Every clone keeps the pool alive;
    /// drop all handles to let it drain and stop.
    #[must_use]
    pub fn handle(&self) -> WorkQueue {
        self.queue.clone()
    }

    /// Drop the pool's own queue handle and wait for workers to drain.
    ///
    /// Items enqueued before the last handle dropped are still processed.
    pub async fn shutdown(self) {
        let Self { queue, workers } = self;
        drop(queue);
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "worker task join failed");
            }
        }
        info!("worker pool stopped");
    }
}
