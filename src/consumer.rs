use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bus::{BusError, BusRecord, TelemetryReceiver};
use crate::codec::{self, DecodeError, EncodeError};
use crate::config::ConsumerConfig;
use crate::envelope::Envelope;
use crate::metrics;
use crate::shutdown::Shutdown;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("Encode failed: {0}")]
    Encode(#[from] EncodeError),
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
    #[error("Handler failed: {0}")]
    Handler(String),
    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl ProcessError {
    fn kind(&self) -> &'static str {
        match self {
            ProcessError::Decode(_) => "decode",
            ProcessError::Panicked(_) => "panic",
            _ => "handler",
        }
    }
}

/// Business logic applied to every decoded envelope.
#[async_trait]
pub trait TelemetryHandler: Send + Sync {
    async fn handle(&self, record: &BusRecord, envelope: Envelope) -> Result<(), ProcessError>;
}

/// Logs a summary of each truck snapshot and flags clock skew, i.e. a
/// truck's `last_updated` moving backwards between consecutive records.
#[derive(Default)]
pub struct LoggingHandler {
    last_seen: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl LoggingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_clock(&self, truck_id: &str, updated: DateTime<Utc>) {
        let mut last_seen = self.last_seen.lock();
        if let Some(previous) = last_seen.insert(truck_id.to_string(), updated) {
            if updated < previous {
                metrics::CLOCK_SKEW.inc();
                warn!(
                    truck_id,
                    previous = %previous,
                    current = %updated,
                    "last_updated moved backwards, source clock skew"
                );
            }
        }
    }
}

#[async_trait]
impl TelemetryHandler for LoggingHandler {
    async fn handle(&self, record: &BusRecord, envelope: Envelope) -> Result<(), ProcessError> {
        let truck_id = envelope.partition_key();
        if let Some(key) = record.key.as_deref() {
            if key != truck_id {
                warn!(key, truck_id, "Message key does not match payload truck id");
            }
        }
        self.check_clock(truck_id, envelope.data.last_updated);

        let data = &envelope.data;
        let (asset_number, model) = data
            .identification()
            .map(|ident| (ident.asset_number.as_str(), ident.model.as_str()))
            .unwrap_or(("", ""));
        info!(
            truck_id,
            asset_number,
            model,
            partition = %record.partition,
            offset = record.offset,
            polled_at = %envelope.polled_at,
            latitude = data.location.latitude,
            longitude = data.location.longitude,
            speed = data.location.speed,
            heading = data.location.heading,
            engine_rpm = data.engine.engine_rpm,
            engine_temp = data.engine.engine_temp,
            fuel_level = data.engine.fuel_level,
            payload_weight = data.payload.payload_weight,
            load_status = data.payload.load_status.as_str(),
            moving = data.is_moving(),
            warnings = data.has_active_warnings(),
            "Received truck telemetry"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsumerOptions {
    pub batch_size: usize,
    pub poll_wait: Duration,
    pub commit_interval: Duration,
}

impl From<&ConsumerConfig> for ConsumerOptions {
    fn from(config: &ConsumerConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            poll_wait: config.poll_wait(),
            commit_interval: config.commit_interval(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub processed: u64,
    pub decode_failures: u64,
    pub handler_failures: u64,
    pub poll_errors: u64,
    pub commits: u64,
    pub commit_failures: u64,
}

impl ConsumerStats {
    pub fn failed(&self) -> u64 {
        self.decode_failures + self.handler_failures
    }
}

/// Poll, decode, handle, periodically commit; until shutdown.
///
/// Records are handled strictly in the order the receiver returns them. A bad
/// record is logged with its raw bytes and skipped; it never stops the loop.
/// A batch already received is always finished before shutdown takes effect.
pub struct ConsumerLoop {
    receiver: Box<dyn TelemetryReceiver>,
    handler: Arc<dyn TelemetryHandler>,
    options: ConsumerOptions,
    shutdown: Shutdown,
    stats: ConsumerStats,
}

impl ConsumerLoop {
    pub fn new(
        receiver: Box<dyn TelemetryReceiver>,
        handler: Arc<dyn TelemetryHandler>,
        options: ConsumerOptions,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            receiver,
            handler,
            options,
            shutdown,
            stats: ConsumerStats::default(),
        }
    }

    pub async fn run(mut self) -> ConsumerStats {
        info!(
            batch_size = self.options.batch_size,
            commit_interval = ?self.options.commit_interval,
            "🚀 Consumer loop started"
        );
        let mut last_commit = Instant::now();

        while !self.shutdown.is_triggered() {
            let polled = tokio::select! {
                result = self.receiver.poll(self.options.batch_size, self.options.poll_wait) => result,
                _ = self.shutdown.cancelled() => break,
            };

            match polled {
                Ok(batch) => {
                    if !batch.is_empty() {
                        debug!(records = batch.len(), "Polled batch");
                    }
                    self.process_batch(batch).await;
                }
                Err(e) => {
                    self.stats.poll_errors += 1;
                    metrics::BUS_ERRORS.with_label_values(&["poll"]).inc();
                    error!(error = %e, "Poll failed");
                    tokio::select! {
                        _ = tokio::time::sleep(self.options.poll_wait) => {}
                        _ = self.shutdown.cancelled() => {}
                    }
                }
            }

            if last_commit.elapsed() >= self.options.commit_interval {
                self.commit().await;
                last_commit = Instant::now();
            }
        }

        self.finish().await
    }

    async fn process_batch(&mut self, batch: Vec<BusRecord>) {
        for record in batch {
            self.stats.received += 1;
            metrics::RECEIVED.inc();

            match process_record(self.handler.as_ref(), &record).await {
                Ok(()) => {
                    self.stats.processed += 1;
                    metrics::PROCESSED.inc();
                }
                Err(e) => {
                    metrics::RECORD_FAILURES.with_label_values(&[e.kind()]).inc();
                    if matches!(e, ProcessError::Decode(_)) {
                        self.stats.decode_failures += 1;
                    } else {
                        self.stats.handler_failures += 1;
                    }
                    error!(
                        partition = %record.partition,
                        offset = record.offset,
                        key = ?record.key,
                        error = %e,
                        raw = %String::from_utf8_lossy(&record.payload),
                        "Failed to process message"
                    );
                }
            }
        }
    }

    async fn commit(&mut self) {
        match self.receiver.commit().await {
            Ok(()) => {
                self.stats.commits += 1;
                metrics::COMMITS.inc();
                debug!(processed = self.stats.processed, "Committed offsets");
            }
            Err(e) => {
                self.stats.commit_failures += 1;
                metrics::BUS_ERRORS.with_label_values(&["commit"]).inc();
                warn!(error = %e, "Offset commit failed, records may be redelivered");
            }
        }
    }

    async fn finish(mut self) -> ConsumerStats {
        info!("Closing consumer...");
        match self.receiver.close().await {
            Ok(()) => self.stats.commits += 1,
            Err(e) => {
                self.stats.commit_failures += 1;
                warn!(error = %e, "Final commit failed");
            }
        }

        let stats = self.stats;
        info!(
            received = stats.received,
            processed = stats.processed,
            failed = stats.failed(),
            commits = stats.commits,
            "Consumer stopped"
        );
        stats
    }
}

// Decoding happens before the handler sees anything, so a bad payload never
// reaches business logic.
async fn process_record(handler: &dyn TelemetryHandler, record: &BusRecord) -> Result<(), ProcessError> {
    let envelope = codec::decode(&record.payload)?;
    match AssertUnwindSafe(handler.handle(record, envelope))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(ProcessError::Panicked(message))
        }
    }
}
