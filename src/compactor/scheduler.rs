use super::{CompactionError, Compactor};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Compact every directory in `compactors` once per `interval` until
/// `shutdown` turns true.
///
/// Passes run on the blocking pool, one directory after another. A pass in
/// progress when shutdown is signalled is allowed to finish.
pub async fn run_periodic(
    compactors: Vec<Arc<Compactor>>,
    interval: Duration,
    run_on_start: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    let first = if run_on_start {
        Instant::now()
    } else {
        Instant::now() + interval
    };
    let mut ticker = interval_at(first, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        directories = compactors.len(),
        interval = ?interval,
        run_on_start = run_on_start,
        "Compaction scheduler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for compactor in &compactors {
                    run_pass(Arc::clone(compactor)).await;
                }
            }
            _ = async { let _ = shutdown.wait_for(|&stop| stop).await; } => {
                break;
            }
        }
    }

    info!("Compaction scheduler stopped");
}

async fn run_pass(compactor: Arc<Compactor>) {
    let dir = compactor.dir().display().to_string();
    match tokio::task::spawn_blocking(move || compactor.compact()).await {
        Ok(Ok(report)) => {
            if !report.is_empty() {
                info!(dir = %dir, days = report.merged.len(), "Compaction pass complete");
            }
        }
        Ok(Err(CompactionError::Incomplete(report))) => {
            warn!(
                dir = %dir,
                merged = report.merged.len(),
                failed = report.failed_days.len(),
                "Compaction pass incomplete, failed days will be retried"
            );
        }
        Ok(Err(e)) => error!(dir = %dir, error = %e, "Compaction pass failed"),
        Err(e) => error!(dir = %dir, error = %e, "Compaction task panicked"),
    }
}
