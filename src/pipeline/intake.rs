use super::channel::EventSender;
use super::PipelineError;
use crate::event::SharedEvent;
use tokio::task::JoinHandle;

/// Counters reported by a destination task when it exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Sealed files (or committed inserts) produced
    pub batches: u64,
    pub rows: u64,
    /// Batches that ended with no rows and were discarded
    pub empty_batches: u64,
}

/// Handle to a running destination task.
///
/// Holds the only sender for the destination's intake channel, so `stop`
/// (which consumes the handle) is what closes the channel and lets the task
/// drain and exit.
pub struct Intake {
    name: String,
    tx: EventSender,
    task: JoinHandle<Result<WriterStats, PipelineError>>,
}

impl Intake {
    pub(crate) fn new(
        name: impl Into<String>,
        tx: EventSender,
        task: JoinHandle<Result<WriterStats, PipelineError>>,
    ) -> Self {
        Self {
            name: name.into(),
            tx,
            task,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hand an event to the destination, waiting while it is busy.
    ///
    /// Fails only if the destination task has exited.
    pub async fn submit(&self, event: SharedEvent) -> Result<(), PipelineError> {
        self.tx
            .send(event)
            .await
            .map_err(|_| PipelineError::IntakeClosed(self.name.clone()))
    }

    /// Resolves once the destination task has dropped its receiver, which
    /// only happens when it exits.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Whether the destination task has already exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Close the intake and wait for the destination to finish its last batch.
    pub async fn stop(self) -> Result<WriterStats, PipelineError> {
        let Intake { tx, task, .. } = self;
        drop(tx);
        task.await?
    }
}
