//! Sequential fan-out from the inbound channel to every destination.

use super::channel::EventReceiver;
use super::intake::{Intake, WriterStats};
use super::PipelineError;
use futures::future::select_all;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Default)]
pub struct RouteSummary {
    /// Events delivered to every destination
    pub events_routed: u64,
    /// Final counters of each destination, in routing order
    pub destinations: Vec<(String, WriterStats)>,
}

/// Deliver each inbound event to every destination, in order, before taking
/// the next one.
///
/// Returns once `input` is closed and every destination has stopped. If a
/// destination fails, whether or not events are flowing, the inbound channel
/// is closed, the remaining destinations are stopped so their open batches
/// are sealed, and the first destination error is returned.
pub async fn route(mut input: EventReceiver, outs: Vec<Intake>) -> Result<RouteSummary, PipelineError> {
    let mut summary = RouteSummary::default();
    let mut rejected = None;

    info!(destinations = outs.len(), "Router started");

    'events: loop {
        let event = tokio::select! {
            received = input.recv() => match received {
                Some(event) => event,
                None => break,
            },
            name = first_closed(&outs) => {
                error!(destination = name, "Destination exited while idle, shutting down");
                rejected = Some(PipelineError::IntakeClosed(name.to_string()));
                break;
            }
        };

        for out in &outs {
            if let Err(e) = out.submit(Arc::clone(&event)).await {
                error!(destination = out.name(), "Destination stopped accepting events, shutting down");
                rejected = Some(e);
                break 'events;
            }
        }
        summary.events_routed += 1;
    }

    // Refuse new events while the destinations drain
    input.close();

    let mut first_error = None;
    for out in outs {
        let name = out.name().to_string();
        match out.stop().await {
            Ok(stats) => {
                info!(
                    destination = %name,
                    batches = stats.batches,
                    rows = stats.rows,
                    "Destination stopped"
                );
                summary.destinations.push((name, stats));
            }
            Err(e) => {
                error!(destination = %name, error = %e, "Destination failed");
                first_error.get_or_insert(e);
            }
        }
    }

    // The destination's own error says more than the rejected send
    match first_error.or(rejected) {
        Some(e) => Err(e),
        None => {
            info!(events = summary.events_routed, "Router finished");
            Ok(summary)
        }
    }
}

/// Name of the first destination whose task has exited. Never resolves when
/// there are no destinations.
async fn first_closed(outs: &[Intake]) -> &str {
    if outs.is_empty() {
        return std::future::pending().await;
    }
    let (_, index, _) = select_all(outs.iter().map(|out| Box::pin(out.closed()))).await;
    outs[index].name()
}
