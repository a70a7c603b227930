pub mod compact;
pub mod config;
pub mod run;

use crate::compactor::Compactor;
use crate::config::{Config, DestinationConfig};
use crate::storage::{BatchFormat, JsonFormat, ParquetFormat};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(
        "config not found\n\
         Searched locations:\n  ~/.config/drain/config.yml\n  /etc/drain/config.yml\n\n\
         Use --config <path> to specify a config file, or run 'drain config init' to generate one."
    )]
    ConfigNotFound,

    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] crate::pipeline::PipelineError),

    #[error("forwarding error: {0}")]
    Forward(#[from] crate::forward::ForwardError),

    #[error("compaction error: {0}")]
    Compaction(#[from] crate::compactor::CompactionError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("ingest server error: {0}")]
    Server(std::io::Error),
}

/// Load the config at `path`, or report where it was looked for
pub(crate) fn load(path: Option<PathBuf>) -> Result<Config, RunError> {
    let path = path.ok_or(RunError::ConfigNotFound)?;
    tracing::info!(config_path = %path.display(), "Loading configuration");
    Ok(crate::config::load_config(&path)?)
}

/// Storage format of a file destination
pub(crate) fn batch_format(destination: &DestinationConfig) -> Option<Arc<dyn BatchFormat>> {
    match destination {
        DestinationConfig::Parquet { compression, .. } => Some(Arc::new(ParquetFormat::new(*compression))),
        DestinationConfig::Json { .. } => Some(Arc::new(JsonFormat)),
        DestinationConfig::Duckdb { .. } => None,
    }
}

/// One compactor per file destination
pub(crate) fn compactors(config: &Config) -> Vec<Arc<Compactor>> {
    config
        .file_destinations()
        .filter_map(|destination| {
            let dir = destination.dir()?;
            let format = batch_format(destination)?;
            Some(Arc::new(Compactor::new(dir.clone(), format)))
        })
        .collect()
}
