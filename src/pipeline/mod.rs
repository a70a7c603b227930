pub mod batch_writer;
pub mod channel;
pub mod db_writer;
pub mod intake;
pub mod router;

pub use batch_writer::{BatchConfig, BatchWriter};
pub use channel::{create_channel, EventReceiver, EventSender, Receiver, Sender};
pub use db_writer::DatabaseWriter;
pub use intake::{Intake, WriterStats};
pub use router::{route, RouteSummary};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur during pipeline operation
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("destination '{0}' is no longer accepting events")]
    IntakeClosed(String),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
