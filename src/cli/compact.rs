use super::{compactors, load, RunError};
use crate::compactor::CompactionError;
use std::path::PathBuf;
use tracing::{info, warn};

/// Run a single compaction pass over every file destination and exit.
pub async fn compact(config_path: Option<PathBuf>) -> Result<(), RunError> {
    let config = load(config_path)?;
    let compactors = compactors(&config);

    if compactors.is_empty() {
        warn!("No file destinations configured, nothing to compact");
        return Ok(());
    }

    let mut failure = None;
    for compactor in compactors {
        let dir = compactor.dir().display().to_string();
        match tokio::task::spawn_blocking(move || compactor.compact()).await? {
            Ok(report) => {
                let rows: u64 = report.merged.iter().map(|day| day.rows).sum();
                info!(dir = %dir, days = report.merged.len(), rows = rows, "Compaction complete");
            }
            Err(e @ CompactionError::Incomplete(_)) => {
                warn!(dir = %dir, error = %e, "Compaction incomplete");
                failure.get_or_insert(e);
            }
            Err(e) => return Err(e.into()),
        }
    }

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
