//! Batch delivery targets.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::{DispatchError, DispatchResult};
use crate::event::TelemetryEvent;
use crate::settings::DispatcherSettings;

/// How the sink acknowledged a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The sink already had these events; nothing to do.
    Duplicate,
}

/// Receives whole batches from the dispatcher consumer.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, batch: &[TelemetryEvent]) -> DispatchResult<Delivery>;
}

/// POSTs each batch as a JSON array.
#[derive(Debug, Clone)]
pub struct HttpSink {
    endpoint: String,
    client: Client,
}

impl HttpSink {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> DispatchResult<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    pub fn from_settings(settings: &DispatcherSettings) -> DispatchResult<Self> {
        Self::new(settings.endpoint.clone(), settings.request_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EventSink for HttpSink {
    async fn send(&self, batch: &[TelemetryEvent]) -> DispatchResult<Delivery> {
        if batch.is_empty() {
            debug!("No events to send, skipping network call");
            return Ok(Delivery::Delivered);
        }

        let body = serde_json::to_vec(batch)?;
        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        debug!(
            endpoint = %self.endpoint,
            events = batch.len(),
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch posted"
        );

        if status.is_success() {
            Ok(Delivery::Delivered)
        } else if status == StatusCode::CONFLICT {
            Ok(Delivery::Duplicate)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DispatchError::server(status.as_u16(), body))
        }
    }
}
