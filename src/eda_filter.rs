use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::bus::{BusRecord, TelemetryPublisher};
use crate::codec::{iso8601, EncodeError};
use crate::consumer::{ProcessError, TelemetryHandler};
use crate::envelope::{Envelope, UNKNOWN_TRUCK_KEY};
use crate::retry::{self, RetryPolicy};

pub const FILTERED_EVENT_TYPE: &str = "truck_telemetry_filtered";

/// Slim event republished for downstream event-driven consumers: identity and
/// firmware only, no sensor payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredTelemetryEvent {
    pub event_id: Uuid,
    pub event_type: String,
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub source_topic: String,
    pub truck_id: String,
    pub firmware_version: String,
}

impl FilteredTelemetryEvent {
    pub fn from_envelope(envelope: &Envelope, source_topic: &str) -> Self {
        let firmware_version = envelope
            .data
            .identification()
            .map(|ident| ident.firmware_version.clone())
            .unwrap_or_else(|| UNKNOWN_TRUCK_KEY.to_string());
        Self {
            event_id: Uuid::new_v4(),
            event_type: FILTERED_EVENT_TYPE.to_string(),
            timestamp: Utc::now(),
            source_topic: source_topic.to_string(),
            truck_id: envelope.partition_key().to_string(),
            firmware_version,
        }
    }
}

/// Consumes full telemetry and republishes a [`FilteredTelemetryEvent`] per
/// record, keyed by truck id so per-truck order carries over. The retry
/// schedule is not cut short by shutdown, since the consumer finishes the
/// batch it holds before exiting.
pub struct EdaFilterHandler {
    publisher: Arc<dyn TelemetryPublisher>,
    source_topic: String,
    send_timeout: Duration,
    retry: RetryPolicy,
}

impl EdaFilterHandler {
    pub fn new(
        publisher: Arc<dyn TelemetryPublisher>,
        source_topic: impl Into<String>,
        send_timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            publisher,
            source_topic: source_topic.into(),
            send_timeout,
            retry,
        }
    }
}

#[async_trait]
impl TelemetryHandler for EdaFilterHandler {
    async fn handle(&self, record: &BusRecord, envelope: Envelope) -> Result<(), ProcessError> {
        let event = FilteredTelemetryEvent::from_envelope(&envelope, &self.source_topic);
        let payload = serde_json::to_vec(&event).map_err(EncodeError::from)?;

        let outcome = retry::publish_with_retry(
            self.publisher.as_ref(),
            &event.truck_id,
            &payload,
            self.send_timeout,
            self.retry,
            None,
        )
        .await;
        let delivery = outcome.result?;

        info!(
            truck_id = %event.truck_id,
            event_id = %event.event_id,
            firmware_version = %event.firmware_version,
            from_offset = record.offset,
            partition = %delivery.partition,
            offset = delivery.offset,
            "Republished filtered event"
        );
        Ok(())
    }
}
