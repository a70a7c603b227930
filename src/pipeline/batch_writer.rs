//! Batch writer: turns an intake channel into a sequence of sealed batch files.
//!
//! Each iteration of the writer loop owns one batch file:
//!
//! ```text
//! open (data-<unix>-<uuid>.<ext>.temp)
//!   -> accumulate until idle deadline / lifetime deadline / row ceiling / close
//!   -> finalize: rows > 0 ? rename to data-<instant>.<ext> : delete temp
//! ```
//!
//! The rename is the only point at which a batch becomes visible to the
//! compactor. Any error while creating, writing or finalizing a file ends the
//! writer; the error is returned from [`Intake::stop`].

use super::channel::{create_channel, EventReceiver};
use super::intake::{Intake, WriterStats};
use super::PipelineError;
use crate::config::types::BatchSettings;
use crate::forward::ForwardHandle;
use crate::storage::naming;
use crate::storage::{BatchFormat, RowWriter, StorageError};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Rotation thresholds for one writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Seal once the row count exceeds this value
    pub max_rows: usize,
    /// Seal a non-empty batch after this long without a new event
    pub max_idle: Duration,
    /// Seal a non-empty batch this long after it was opened
    pub max_wait: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_rows: 50_000,
            max_idle: Duration::from_secs(60),
            max_wait: Duration::from_secs(3600),
        }
    }
}

impl From<&BatchSettings> for BatchConfig {
    fn from(settings: &BatchSettings) -> Self {
        Self {
            max_rows: settings.max_rows,
            max_idle: settings.max_idle,
            max_wait: settings.max_wait,
        }
    }
}

/// Why the accumulate phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rotation {
    Idle,
    Lifetime,
    Full,
    Closed,
}

pub struct BatchWriter {
    dir: PathBuf,
    format: Arc<dyn BatchFormat>,
    config: BatchConfig,
    forwarder: Option<ForwardHandle>,
    intake_buffer: usize,
}

impl BatchWriter {
    pub fn new(dir: impl Into<PathBuf>, format: Arc<dyn BatchFormat>, config: BatchConfig) -> Self {
        Self {
            dir: dir.into(),
            format,
            config,
            forwarder: None,
            intake_buffer: 1,
        }
    }

    /// Offer every written event to a side channel
    pub fn with_forwarder(mut self, forwarder: ForwardHandle) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn with_intake_buffer(mut self, intake_buffer: usize) -> Self {
        self.intake_buffer = intake_buffer;
        self
    }

    /// Spawn the writer loop. The first batch is opened right away.
    pub fn start(self) -> Intake {
        let name = format!("{}:{}", self.format.extension(), self.dir.display());
        let (tx, rx) = create_channel(self.intake_buffer);
        let task = tokio::spawn(self.run(rx));
        Intake::new(name, tx, task)
    }

    async fn run(self, rx: EventReceiver) -> Result<WriterStats, PipelineError> {
        let dir = self.dir.clone();
        let result = self.write_batches(rx).await;
        if let Err(e) = &result {
            // Dropping the receiver closes the intake, which the router
            // watches for
            error!(dir = %dir.display(), error = %e, "Batch writer failed");
        }
        result
    }

    async fn write_batches(self, mut rx: EventReceiver) -> Result<WriterStats, PipelineError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StorageError::file(&self.dir, e))?;
        self.warn_orphaned_batches();

        info!(
            dir = %self.dir.display(),
            format = self.format.extension(),
            max_rows = self.config.max_rows,
            max_idle = ?self.config.max_idle,
            max_wait = ?self.config.max_wait,
            "Batch writer started"
        );

        let mut stats = WriterStats::default();
        loop {
            let dir = self.dir.clone();
            let format = Arc::clone(&self.format);
            let mut batch = tokio::task::spawn_blocking(move || OpenBatch::open(&dir, format.as_ref())).await??;
            let rotation = self.accumulate(&mut batch, &mut rx).await?;
            debug!(rows = batch.rows, reason = ?rotation, "Rotating batch");

            let rows = batch.rows as u64;
            let dir = self.dir.clone();
            let extension = self.format.extension();
            let sealed = tokio::task::spawn_blocking(move || batch.finalize(&dir, extension)).await??;

            match sealed {
                Some(path) => {
                    stats.batches += 1;
                    stats.rows += rows;
                    info!(rows = rows, path = %path.display(), "Sealed batch");
                }
                None => {
                    stats.empty_batches += 1;
                    debug!("Removed empty batch file");
                }
            }

            if rotation == Rotation::Closed {
                break;
            }
        }

        info!(
            batches = stats.batches,
            rows = stats.rows,
            "Batch writer stopped"
        );
        Ok(stats)
    }

    /// Wait for events until one of the rotation triggers fires.
    async fn accumulate(
        &self,
        batch: &mut OpenBatch,
        rx: &mut EventReceiver,
    ) -> Result<Rotation, PipelineError> {
        let opened = Instant::now();
        let mut lifetime = opened + self.config.max_wait;
        let mut idle = opened + self.config.max_idle;

        loop {
            let deadline = idle.min(lifetime);

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if batch.rows > 0 {
                        return Ok(if lifetime <= idle { Rotation::Lifetime } else { Rotation::Idle });
                    }
                    // Nothing to seal; keep the empty batch open instead of
                    // churning through empty files during silence.
                    let now = Instant::now();
                    idle = now + self.config.max_idle;
                    if lifetime <= now {
                        lifetime = now + self.config.max_wait;
                    }
                }
                received = rx.recv() => {
                    let Some(event) = received else {
                        return Ok(Rotation::Closed);
                    };

                    // Row writers buffer in memory and only touch the file
                    // when a buffer fills, so this stays on the runtime
                    batch.write(&event)?;
                    if let Some(forwarder) = &self.forwarder {
                        forwarder.offer(event);
                    }

                    if batch.rows > self.config.max_rows {
                        return Ok(Rotation::Full);
                    }
                    idle = Instant::now() + self.config.max_idle;
                }
            }
        }
    }

    /// Temp files of this format that are already on disk were left by a
    /// writer that never finalized them. Their rows cannot be trusted to be
    /// complete, so they are reported rather than sealed.
    fn warn_orphaned_batches(&self) {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Could not scan for orphaned batches");
                return;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if naming::is_temp_batch(&name, self.format.extension()) {
                warn!(path = %entry.path().display(), "Found orphaned batch file from an earlier run");
            }
        }
    }
}

/// The batch currently being written
struct OpenBatch {
    temp_path: PathBuf,
    writer: Box<dyn RowWriter>,
    rows: usize,
    opened_at: DateTime<Utc>,
}

impl OpenBatch {
    fn open(dir: &Path, format: &dyn BatchFormat) -> Result<Self, StorageError> {
        let opened_at = Utc::now();
        let temp_path = dir.join(naming::temp_batch_name(opened_at, format.extension()));
        let writer = format.create(&temp_path)?;
        debug!(path = %temp_path.display(), "Opened batch");

        Ok(Self {
            temp_path,
            writer,
            rows: 0,
            opened_at,
        })
    }

    fn write(&mut self, event: &crate::event::Event) -> Result<(), StorageError> {
        self.writer.write(event)?;
        self.rows += 1;
        Ok(())
    }

    /// Publish the batch under its sealed name, or remove it if it is empty.
    /// Returns the sealed path.
    fn finalize(self, dir: &Path, extension: &str) -> Result<Option<PathBuf>, StorageError> {
        let OpenBatch {
            temp_path,
            writer,
            rows,
            opened_at,
        } = self;

        if rows == 0 {
            drop(writer);
            std::fs::remove_file(&temp_path).map_err(|e| StorageError::file(&temp_path, e))?;
            return Ok(None);
        }

        writer.finish()?;

        let sealed_at = Utc::now();
        let sealed_path = naming::next_free_sealed_path(dir, sealed_at, extension);
        std::fs::rename(&temp_path, &sealed_path).map_err(|e| StorageError::file(&temp_path, e))?;
        debug!(
            open_for_ms = (sealed_at - opened_at).num_milliseconds(),
            "Batch finalized"
        );

        Ok(Some(sealed_path))
    }
}
