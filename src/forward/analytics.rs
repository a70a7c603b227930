use super::{ForwardError, Forwarder};
use crate::config::types::ForwardingConfig;
use crate::event::Event;
use async_trait::async_trait;
use serde::Serialize;

/// Posts events to a Measurement-Protocol style collection endpoint.
#[derive(Debug)]
pub struct AnalyticsForwarder {
    client: reqwest::Client,
    url: reqwest::Url,
    event_name: String,
}

#[derive(Debug, Serialize)]
struct CollectRequest<'a> {
    client_id: &'a str,
    events: [CollectEvent<'a>; 1],
}

#[derive(Debug, Serialize)]
struct CollectEvent<'a> {
    name: &'a str,
    params: &'a Event,
}

impl AnalyticsForwarder {
    pub fn new(config: &ForwardingConfig) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        let url = reqwest::Url::parse_with_params(
            &config.endpoint,
            &[
                ("measurement_id", config.measurement_id.as_str()),
                ("api_secret", config.api_secret.as_str()),
            ],
        )
        .map_err(|e| ForwardError::Url(format!("{}: {}", config.endpoint, e)))?;

        Ok(Self {
            client,
            url,
            event_name: config.event_name.clone(),
        })
    }

    fn body<'a>(&'a self, event: &'a Event) -> CollectRequest<'a> {
        CollectRequest {
            client_id: event.remote_ip().unwrap_or_default(),
            events: [CollectEvent {
                name: &self.event_name,
                params: event,
            }],
        }
    }
}

#[async_trait]
impl Forwarder for AnalyticsForwarder {
    async fn forward(&self, event: &Event) -> Result<(), ForwardError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&self.body(event))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ForwardError::Status {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}
