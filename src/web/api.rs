use crate::event::{Event, REMOTE_IP};
use crate::pipeline::EventSender;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct AppState {
    pub inbound: EventSender,
}

/// Body of a beacon posted by the web client
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BeaconEvent {
    pub name: String,
    pub version: String,
    pub browser: String,
    pub auth_provider: String,
    pub filter_length: i64,
    pub clients: i64,
    pub has_custom_address: bool,
    pub has_custom_base: bool,
    pub has_hostname: bool,
    pub running_containers: i64,
    pub has_actions: bool,
    pub is_swarm_mode: bool,
    pub server_version: String,
    #[serde(rename = "serverID")]
    pub server_id: String,
}

impl BeaconEvent {
    pub fn into_event(self, created_at: DateTime<Utc>, remote_ip: Option<String>) -> Event {
        let event = Event::new(self.name, created_at)
            .with_attribute("version", self.version)
            .with_attribute("browser", self.browser)
            .with_attribute("auth_provider", self.auth_provider)
            .with_attribute("filter_length", self.filter_length)
            .with_attribute("clients", self.clients)
            .with_attribute("has_custom_address", self.has_custom_address)
            .with_attribute("has_custom_base", self.has_custom_base)
            .with_attribute("has_hostname", self.has_hostname)
            .with_attribute("running_containers", self.running_containers)
            .with_attribute("has_actions", self.has_actions)
            .with_attribute("is_swarm_mode", self.is_swarm_mode)
            .with_attribute("server_version", self.server_version)
            .with_attribute("server_id", self.server_id);

        match remote_ip {
            Some(ip) => event.with_attribute(REMOTE_IP, ip),
            None => event,
        }
    }
}

/// Client address as reported by the fronting proxy: the first entry of
/// `X-Forwarded-For`.
fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("x-forwarded-for")?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    (!first.is_empty()).then(|| first.to_string())
}

/// POST /event
///
/// The body is decoded regardless of Content-Type; browsers sending beacons
/// label JSON as text/plain.
pub async fn create_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let beacon: BeaconEvent =
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let event = beacon.into_event(Utc::now(), forwarded_for(&headers));
    debug!(name = %event.name, remote_ip = ?event.remote_ip(), "Received event");

    state
        .inbound
        .send(Arc::new(event))
        .await
        .map_err(|_| ApiError::Unavailable("pipeline is shutting down".to_string()))?;

    Ok(StatusCode::CREATED)
}

/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
