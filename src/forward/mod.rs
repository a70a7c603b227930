//! Best-effort side channel that mirrors persisted events to an external
//! analytics service.
//!
//! Nothing in here may slow down or fail a batch write: events are offered to
//! a bounded queue drained by a fixed number of workers, and dropped when the
//! queue is full.

pub mod analytics;
pub mod pool;

pub use analytics::AnalyticsForwarder;
pub use pool::{ForwardHandle, ForwardPool, ForwardStats};

use crate::event::Event;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned error status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid endpoint URL: {0}")]
    Url(String),
}

#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, event: &Event) -> Result<(), ForwardError>;
}
