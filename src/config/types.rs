use crate::storage::Compression;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub compaction: CompactionConfig,
    /// Side channel; absent means nothing is forwarded
    #[serde(default)]
    pub forwarding: Option<ForwardingConfig>,
}

impl Config {
    /// Directories and formats the compactor is responsible for
    pub fn file_destinations(&self) -> impl Iterator<Item = &DestinationConfig> {
        self.destinations.iter().filter(|d| d.dir().is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Capacity of the channel between the HTTP handlers and the router
    #[serde(default = "default_buffer_limit")]
    pub buffer_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            buffer_limit: default_buffer_limit(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:4000".to_string()
}

fn default_buffer_limit() -> usize {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DestinationConfig {
    Parquet {
        dir: PathBuf,
        #[serde(default)]
        compression: Compression,
        #[serde(default)]
        batch: BatchSettings,
        #[serde(default)]
        forward: bool,
    },
    Json {
        dir: PathBuf,
        #[serde(default)]
        batch: BatchSettings,
        #[serde(default)]
        forward: bool,
    },
    Duckdb {
        path: PathBuf,
        #[serde(default = "default_db_batch_size")]
        batch_size: usize,
        #[serde(default = "default_flush_interval", with = "humantime_serde")]
        flush_interval: Duration,
        #[serde(default = "default_intake_buffer")]
        intake_buffer: usize,
    },
}

impl DestinationConfig {
    /// Short human-readable identifier used in logs and validation messages
    pub fn label(&self) -> String {
        match self {
            DestinationConfig::Parquet { dir, .. } => format!("parquet:{}", dir.display()),
            DestinationConfig::Json { dir, .. } => format!("json:{}", dir.display()),
            DestinationConfig::Duckdb { path, .. } => format!("duckdb:{}", path.display()),
        }
    }

    /// Data directory of a file destination
    pub fn dir(&self) -> Option<&PathBuf> {
        match self {
            DestinationConfig::Parquet { dir, .. } | DestinationConfig::Json { dir, .. } => Some(dir),
            DestinationConfig::Duckdb { .. } => None,
        }
    }

    pub fn forwards(&self) -> bool {
        match self {
            DestinationConfig::Parquet { forward, .. } | DestinationConfig::Json { forward, .. } => *forward,
            DestinationConfig::Duckdb { .. } => false,
        }
    }
}

fn default_db_batch_size() -> usize {
    1000
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_intake_buffer() -> usize {
    1
}

/// Rotation settings of a file destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_max_idle", with = "humantime_serde")]
    pub max_idle: Duration,
    #[serde(default = "default_max_wait", with = "humantime_serde")]
    pub max_wait: Duration,
    #[serde(default = "default_intake_buffer")]
    pub intake_buffer: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            max_idle: default_max_idle(),
            max_wait: default_max_wait(),
            intake_buffer: default_intake_buffer(),
        }
    }
}

fn default_max_rows() -> usize {
    50_000
}

fn default_max_idle() -> Duration {
    Duration::from_secs(60)
}

fn default_max_wait() -> Duration {
    Duration::from_secs(3600)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_compaction_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// Run one pass as soon as the process starts
    #[serde(default)]
    pub on_startup: bool,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_compaction_interval(),
            on_startup: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_compaction_interval() -> Duration {
    Duration::from_secs(24 * 3600)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub measurement_id: String,
    pub api_secret: String,
    #[serde(default = "default_event_name")]
    pub event_name: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_forward_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_endpoint() -> String {
    "https://www.google-analytics.com/mp/collect".to_string()
}

fn default_event_name() -> String {
    "eventStream".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_queue_size() -> usize {
    1024
}

fn default_forward_timeout() -> Duration {
    Duration::from_secs(5)
}
