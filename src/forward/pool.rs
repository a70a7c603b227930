use super::Forwarder;
use crate::event::SharedEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Log a drop warning on the first drop and then once per this many drops
const DROP_LOG_EVERY: u64 = 1000;

#[derive(Debug, Default)]
pub struct ForwardStats {
    forwarded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl ForwardStats {
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Cheap, cloneable producer side of a [`ForwardPool`].
#[derive(Clone)]
pub struct ForwardHandle {
    tx: mpsc::Sender<SharedEvent>,
    stats: Arc<ForwardStats>,
}

impl ForwardHandle {
    /// Queue an event for forwarding without waiting.
    ///
    /// Returns false if the event was dropped because the queue is full or
    /// the pool has shut down.
    pub fn offer(&self, event: SharedEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                let dropped = self.stats.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % DROP_LOG_EVERY == 0 {
                    let reason = match e {
                        mpsc::error::TrySendError::Full(_) => "queue full",
                        mpsc::error::TrySendError::Closed(_) => "pool stopped",
                    };
                    warn!(dropped_total = dropped, reason = reason, "Dropping event bound for side channel");
                }
                false
            }
        }
    }

    pub fn stats(&self) -> &ForwardStats {
        &self.stats
    }
}

/// Fixed set of workers draining a bounded forwarding queue.
pub struct ForwardPool {
    handle: ForwardHandle,
    workers: Vec<JoinHandle<()>>,
}

impl ForwardPool {
    pub fn start(forwarder: Arc<dyn Forwarder>, workers: usize, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_size.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(ForwardStats::default());

        let workers = (0..workers.max(1))
            .map(|id| {
                let rx = Arc::clone(&rx);
                let forwarder = Arc::clone(&forwarder);
                let stats = Arc::clone(&stats);
                tokio::spawn(run_worker(id, rx, forwarder, stats))
            })
            .collect();

        Self {
            handle: ForwardHandle { tx, stats },
            workers,
        }
    }

    pub fn handle(&self) -> ForwardHandle {
        self.handle.clone()
    }

    /// Stop accepting events and let workers drain the queue.
    ///
    /// Workers exit once every handle has been dropped and the queue is empty;
    /// whatever is still queued after `grace` is abandoned.
    pub async fn shutdown(self, grace: Duration) -> Arc<ForwardStats> {
        let ForwardPool { handle, workers } = self;
        let stats = Arc::clone(&handle.stats);
        drop(handle);

        for worker in workers {
            let abort = worker.abort_handle();
            if tokio::time::timeout(grace, worker).await.is_err() {
                abort.abort();
                warn!("Side channel worker did not drain in time, abandoning queued events");
            }
        }

        info!(
            forwarded = stats.forwarded(),
            failed = stats.failed(),
            dropped = stats.dropped(),
            "Side channel stopped"
        );
        stats
    }
}

async fn run_worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<SharedEvent>>>,
    forwarder: Arc<dyn Forwarder>,
    stats: Arc<ForwardStats>,
) {
    loop {
        let next = rx.lock().await.recv().await;
        let Some(event) = next else {
            break;
        };

        match forwarder.forward(&event).await {
            Ok(()) => {
                stats.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(worker = id, error = %e, "Failed to forward event");
            }
        }
    }
    debug!(worker = id, "Side channel worker exiting");
}
