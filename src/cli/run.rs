use super::{batch_format, compactors, load, RunError};
use crate::compactor::run_periodic;
use crate::config::{Config, DestinationConfig};
use crate::forward::{AnalyticsForwarder, ForwardHandle, ForwardPool};
use crate::pipeline::{create_channel, route, BatchConfig, BatchWriter, DatabaseWriter, Intake};
use crate::storage::DuckDbStorage;
use crate::web::run_server;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Overrides `ingest.listen` when set
const LISTEN_ENV: &str = "DRAIN_ADDR";

/// How long forwarding workers may keep draining after the writers stopped
const FORWARD_GRACE: Duration = Duration::from_secs(5);

pub async fn run(config_path: Option<PathBuf>) -> Result<(), RunError> {
    let config = load(config_path)?;
    run_pipeline(config).await
}

async fn run_pipeline(config: Config) -> Result<(), RunError> {
    let forward_pool = start_forwarding(&config)?;
    let forward_handle = forward_pool.as_ref().map(ForwardPool::handle);

    let mut intakes = Vec::with_capacity(config.destinations.len());
    for destination in &config.destinations {
        match start_destination(destination, forward_handle.as_ref()).await {
            Ok(intake) => intakes.push(intake),
            Err(e) => {
                // Seal whatever the destinations started so far opened
                stop_started(intakes).await;
                return Err(e);
            }
        }
    }
    drop(forward_handle);

    let (inbound_tx, inbound_rx) = create_channel(config.ingest.buffer_limit);
    let mut router_task = tokio::spawn(route(inbound_rx, intakes));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let listen = std::env::var(LISTEN_ENV).unwrap_or_else(|_| config.ingest.listen.clone());
    let mut web_task = tokio::spawn(async move { run_server(&listen, inbound_tx, shutdown_rx).await });

    let (compaction_tx, compaction_rx) = watch::channel(false);
    let compaction_task = if config.compaction.enabled {
        Some(tokio::spawn(run_periodic(
            compactors(&config),
            config.compaction.interval,
            config.compaction.on_startup,
            compaction_rx,
        )))
    } else {
        info!("Compaction disabled");
        None
    };

    info!("Pipeline started, press Ctrl+C to shutdown");

    let mut router_result = None;
    let mut web_result = None;
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        result = &mut router_task => {
            error!("Router stopped unexpectedly, shutting down");
            router_result = Some(result);
        }
        result = &mut web_task => {
            web_result = Some(result);
        }
    }

    // HTTP first: once the server is gone nothing can produce events, so the
    // router sees the inbound channel close and drains the destinations
    let _ = shutdown_tx.send(true);
    let web_result = match web_result {
        Some(result) => result,
        None => web_task.await,
    };
    info!("Ingest server stopped");

    let router_result = match router_result {
        Some(result) => result,
        None => router_task.await,
    };

    if let Some(pool) = forward_pool {
        pool.shutdown(FORWARD_GRACE).await;
    }

    let _ = compaction_tx.send(true);
    if let Some(task) = compaction_task {
        if let Err(e) = task.await {
            error!(error = %e, "Compaction scheduler join error");
        }
    }

    // A destination failure is the more interesting error
    let summary = router_result??;
    web_result?.map_err(RunError::Server)?;

    info!(events = summary.events_routed, "Pipeline shutdown complete");
    Ok(())
}

fn start_forwarding(config: &Config) -> Result<Option<ForwardPool>, RunError> {
    let wanted = config.destinations.iter().any(DestinationConfig::forwards);
    match &config.forwarding {
        Some(forwarding) if wanted => {
            let forwarder = AnalyticsForwarder::new(forwarding)?;
            info!(
                endpoint = %forwarding.endpoint,
                workers = forwarding.workers,
                queue_size = forwarding.queue_size,
                "Starting event forwarding"
            );
            Ok(Some(ForwardPool::start(
                Arc::new(forwarder),
                forwarding.workers,
                forwarding.queue_size,
            )))
        }
        Some(_) => {
            warn!("'forwarding' is configured but no destination sets 'forward: true'");
            Ok(None)
        }
        None => Ok(None),
    }
}

async fn start_destination(
    destination: &DestinationConfig,
    forwarder: Option<&ForwardHandle>,
) -> Result<Intake, RunError> {
    let label = destination.label();

    match destination {
        DestinationConfig::Parquet { dir, batch, forward, .. } | DestinationConfig::Json { dir, batch, forward } => {
            let format = batch_format(destination).ok_or_else(|| {
                RunError::Config(crate::config::ConfigError::Validation(format!(
                    "no storage format for destination '{}'",
                    label
                )))
            })?;

            let mut writer = BatchWriter::new(dir.clone(), format, BatchConfig::from(batch))
                .with_intake_buffer(batch.intake_buffer);
            if *forward {
                if let Some(handle) = forwarder {
                    writer = writer.with_forwarder(handle.clone());
                }
            }

            info!(destination = %label, "Starting batch writer");
            Ok(writer.start())
        }
        DestinationConfig::Duckdb {
            path,
            batch_size,
            flush_interval,
            intake_buffer,
        } => {
            info!(destination = %label, "Initializing database");
            let storage = Arc::new(DuckDbStorage::new(path)?);
            storage.init_schema().await?;

            Ok(DatabaseWriter::new(storage, *batch_size, *flush_interval)
                .with_intake_buffer(*intake_buffer)
                .start(label))
        }
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix
/// Stop destinations started before a later one failed to start. Returns how
/// many of them failed.
async fn stop_started(intakes: Vec<Intake>) -> usize {
    let mut failed = 0;
    for intake in intakes {
        let name = intake.name().to_string();
        if let Err(e) = intake.stop().await {
            error!(destination = %name, error = %e, "Destination failed while rolling back startup");
            failed += 1;
        }
    }
    failed
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
