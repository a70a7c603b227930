use super::channel::{create_channel, EventReceiver};
use super::intake::{Intake, WriterStats};
use super::PipelineError;
use crate::event::SharedEvent;
use crate::storage::DuckDbStorage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Destination that inserts events into a database table in batches.
///
/// Inserts are best effort: a failed batch is logged and discarded so a
/// database outage never stalls the file destinations sharing the router.
pub struct DatabaseWriter {
    storage: Arc<DuckDbStorage>,
    batch_size: usize,
    flush_interval: Duration,
    intake_buffer: usize,
}

impl DatabaseWriter {
    pub fn new(storage: Arc<DuckDbStorage>, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            storage,
            batch_size: batch_size.max(1),
            flush_interval,
            intake_buffer: 1,
        }
    }

    pub fn with_intake_buffer(mut self, intake_buffer: usize) -> Self {
        self.intake_buffer = intake_buffer;
        self
    }

    pub fn start(self, name: impl Into<String>) -> Intake {
        let (tx, rx) = create_channel(self.intake_buffer);
        let task = tokio::spawn(self.run(rx));
        Intake::new(name, tx, task)
    }

    async fn run(self, mut input: EventReceiver) -> Result<WriterStats, PipelineError> {
        let mut pending: Vec<SharedEvent> = Vec::with_capacity(self.batch_size);
        let mut flush_interval = tokio::time::interval(self.flush_interval);
        let mut stats = WriterStats::default();

        info!("Database writer started");

        loop {
            tokio::select! {
                result = input.recv() => {
                    match result {
                        Some(event) => {
                            pending.push(event);
                            if pending.len() >= self.batch_size {
                                self.flush(&mut pending, &mut stats).await;
                            }
                        }
                        None => {
                            info!("Input channel closed, flushing remaining events");
                            break;
                        }
                    }
                }

                _ = flush_interval.tick() => {
                    if !pending.is_empty() {
                        self.flush(&mut pending, &mut stats).await;
                    }
                }
            }
        }

        if !pending.is_empty() {
            self.flush(&mut pending, &mut stats).await;
        }

        info!(rows = stats.rows, batches = stats.batches, "Database writer shutdown complete");
        Ok(stats)
    }

    async fn flush(&self, pending: &mut Vec<SharedEvent>, stats: &mut WriterStats) {
        let batch = std::mem::take(pending);
        let count = batch.len();
        match self.storage.write_events(batch).await {
            Ok(written) => {
                stats.batches += 1;
                stats.rows += written as u64;
                debug!(count = written, "Wrote event batch");
            }
            Err(e) => {
                error!(count = count, error = %e, "Failed to write event batch, dropping it");
            }
        }
    }
}
