use crate::event::Event;
use std::path::{Path, PathBuf};

/// Writes rows into one open output file.
///
/// `finish` must leave the file complete and synced to disk; dropping a writer
/// without finishing it abandons the file contents.
pub trait RowWriter: Send {
    fn write(&mut self, event: &Event) -> Result<(), StorageError>;

    fn finish(self: Box<Self>) -> Result<(), StorageError>;
}

/// A persistent file format for batches and daily archives.
pub trait BatchFormat: Send + Sync {
    /// Extension without leading dot, e.g. `parquet` or `json.gz`
    fn extension(&self) -> &'static str;

    fn create(&self, path: &Path) -> Result<Box<dyn RowWriter>, StorageError>;

    /// Stream every row of `sources`, in order, into a new file at `dest`.
    /// All sources are opened before `dest` is created.
    /// Returns the number of rows copied.
    fn merge(&self, sources: &[PathBuf], dest: &Path) -> Result<u64, StorageError>;

    fn read_events(&self, path: &Path) -> Result<Vec<Event>, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("invalid data in {path}: {message}")]
    InvalidData { path: PathBuf, message: String },
}

impl StorageError {
    pub fn file(path: &Path, source: std::io::Error) -> Self {
        StorageError::File {
            path: path.to_path_buf(),
            source,
        }
    }
}
