use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use crate::pipeline::EventSender;

use super::api::{create_event, health_check, AppState};

/// Build the ingestion routes around the inbound event channel
pub fn router(inbound: EventSender) -> Router {
    Router::new()
        .route("/event", post(create_event))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { inbound })
}

/// Serve the ingestion API until `shutdown_rx` turns true.
///
/// In-flight requests are completed before this returns. The server owns the
/// only producer handles of `inbound`, so returning closes the channel.
pub async fn run_server(
    listen: &str,
    inbound: EventSender,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let app = router(inbound);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!("Ingest server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|&v| v).await;
            tracing::info!("Ingest server shutting down gracefully");
        })
        .await
}
