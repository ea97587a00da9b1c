use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::iso8601;
use crate::model::TruckTelemetry;

/// Partition key used when a record carries no truck identifier.
pub const UNKNOWN_TRUCK_KEY: &str = "unknown";

/// Delivery wrapper around one telemetry record. The envelope, not the bare
/// record, is what travels on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Producer instance that polled the record.
    pub source: String,
    #[serde(with = "iso8601")]
    pub polled_at: DateTime<Utc>,
    /// Data-source address the record was fetched from.
    pub api_url: String,
    pub data: TruckTelemetry,
}

impl Envelope {
    pub fn new(source: impl Into<String>, api_url: impl Into<String>, data: TruckTelemetry) -> Self {
        Self {
            source: source.into(),
            polled_at: Utc::now(),
            api_url: api_url.into(),
            data,
        }
    }

    pub fn partition_key(&self) -> &str {
        partition_key(&self.data)
    }
}

/// The truck identifier, or [`UNKNOWN_TRUCK_KEY`] when it is absent or blank.
pub fn partition_key(record: &TruckTelemetry) -> &str {
    record
        .truck_id()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or(UNKNOWN_TRUCK_KEY)
}
