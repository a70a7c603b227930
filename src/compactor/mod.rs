//! Daily compaction of sealed batch files.
//!
//! A pass looks at every sealed batch in one directory, groups the ones from
//! days that are already over by UTC day, and for each day:
//!
//! 1. merges the batches (and any existing day file) into `day-<date>.<ext>.temp`
//! 2. renames the temp file to `day-<date>.<ext>`
//! 3. renames each merged batch to `<name>.merged`
//!
//! A day whose merge fails leaves its batches alone and is retried by the next
//! pass. Batches already marked `.merged` are never looked at again, so
//! running a pass twice changes nothing the second time.

pub mod scheduler;

pub use scheduler::run_periodic;

use crate::storage::naming;
use crate::storage::{BatchFormat, StorageError};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("failed to list {}: {source}", path.display())]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("compaction incomplete, {} day(s) failed", .0.failed_days.len())]
    Incomplete(CompactionReport),
}

/// One day folded into its daily file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedDay {
    pub day: NaiveDate,
    pub path: PathBuf,
    /// Sealed batches marked merged by this pass
    pub batches: usize,
    /// Rows in the daily file, including rows it already held
    pub rows: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub merged: Vec<MergedDay>,
    pub failed_days: Vec<(NaiveDate, String)>,
    /// Names that looked like sealed batches but could not be parsed
    pub skipped: Vec<String>,
}

impl CompactionReport {
    pub fn is_empty(&self) -> bool {
        self.merged.is_empty() && self.failed_days.is_empty()
    }
}

pub struct Compactor {
    dir: PathBuf,
    format: Arc<dyn BatchFormat>,
}

impl Compactor {
    pub fn new(dir: impl Into<PathBuf>, format: Arc<dyn BatchFormat>) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Run one pass against the current time
    pub fn compact(&self) -> Result<CompactionReport, CompactionError> {
        self.compact_at(Utc::now())
    }

    /// Run one pass as if the current time were `now`.
    ///
    /// Only batches sealed before midnight of `now`'s day are considered.
    pub fn compact_at(&self, now: DateTime<Utc>) -> Result<CompactionReport, CompactionError> {
        let mut report = CompactionReport::default();
        let buckets = self.collect_days(now, &mut report)?;

        if buckets.is_empty() {
            debug!(dir = %self.dir.display(), "Nothing to compact");
        }

        for (day, sources) in buckets {
            match self.merge_day(day, &sources) {
                Ok(merged) => {
                    info!(
                        day = %day,
                        batches = merged.batches,
                        rows = merged.rows,
                        path = %merged.path.display(),
                        "Compacted day"
                    );
                    report.merged.push(merged);
                }
                Err(e) => {
                    error!(day = %day, dir = %self.dir.display(), error = %e, "Failed to compact day");
                    report.failed_days.push((day, e.to_string()));
                }
            }
        }

        if report.failed_days.is_empty() {
            Ok(report)
        } else {
            Err(CompactionError::Incomplete(report))
        }
    }

    /// Bucket sealed batches from past days by UTC day, each bucket sorted
    /// by file name.
    fn collect_days(
        &self,
        now: DateTime<Utc>,
        report: &mut CompactionReport,
    ) -> Result<BTreeMap<NaiveDate, Vec<PathBuf>>, CompactionError> {
        let scan_err = |source: std::io::Error| CompactionError::Scan {
            path: self.dir.clone(),
            source,
        };
        let extension = self.format.extension();
        let mut buckets: BTreeMap<NaiveDate, Vec<PathBuf>> = BTreeMap::new();

        for entry in std::fs::read_dir(&self.dir).map_err(scan_err)? {
            let entry = entry.map_err(scan_err)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !naming::is_sealed_candidate(name, extension) {
                continue;
            }

            let instant = match naming::parse_sealed_instant(name, extension) {
                Ok(instant) => instant,
                Err(e) => {
                    warn!(file = name, error = %e, "Skipping file with unparseable name");
                    report.skipped.push(name.to_string());
                    continue;
                }
            };

            if !naming::is_before_today(instant, now) {
                continue;
            }

            buckets
                .entry(naming::day_of(instant))
                .or_default()
                .push(entry.path());
        }

        for sources in buckets.values_mut() {
            sources.sort();
        }
        Ok(buckets)
    }

    fn merge_day(&self, day: NaiveDate, sources: &[PathBuf]) -> Result<MergedDay, StorageError> {
        let daily = self.dir.join(naming::daily_name(day, self.format.extension()));
        let temp = self.dir.join(naming::temp_name(&naming::daily_name(day, self.format.extension())));

        // A batch sealed after this day was last compacted: keep what the day
        // file already holds
        let mut inputs = Vec::with_capacity(sources.len() + 1);
        if daily.exists() {
            debug!(path = %daily.display(), "Including existing daily file");
            inputs.push(daily.clone());
        }
        inputs.extend_from_slice(sources);

        let rows = match self.format.merge(&inputs, &temp) {
            Ok(rows) => rows,
            Err(e) => {
                remove_partial(&temp);
                return Err(e);
            }
        };

        if let Err(e) = std::fs::rename(&temp, &daily) {
            remove_partial(&temp);
            return Err(StorageError::file(&temp, e));
        }

        for source in sources {
            let Some(name) = source.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let marked = self.dir.join(naming::merged_name(name));
            std::fs::rename(source, &marked).map_err(|e| StorageError::file(source, e))?;
        }

        Ok(MergedDay {
            day,
            path: daily,
            batches: sources.len(),
            rows,
        })
    }
}

fn remove_partial(temp: &Path) {
    match std::fs::remove_file(temp) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %temp.display(), error = %e, "Failed to remove partial daily file"),
    }
}
