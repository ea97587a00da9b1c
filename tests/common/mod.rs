//! Shared fixtures for the loop tests.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use haul_telemetry::bus::memory::MemoryReceiver;
use haul_telemetry::bus::{BusError, BusRecord, TelemetryReceiver};
use haul_telemetry::consumer::{ProcessError, TelemetryHandler};
use haul_telemetry::envelope::Envelope;
use haul_telemetry::model::{LoadStatus, TruckTelemetry};
use haul_telemetry::shutdown::Shutdown;
use haul_telemetry::source::{FetchError, TelemetrySource};

pub const TEST_API_URL: &str = "http://fleet.test/trucks/sample";

pub fn truck(id: &str, load_status: LoadStatus, payload_weight: f64) -> TruckTelemetry {
    let mut truck = TruckTelemetry::with_defaults(id, format!("ASSET-{}", id));
    truck.payload.load_status = load_status;
    truck.payload.payload_weight = payload_weight;
    truck
}

/// Serves a fixed script of fetch results. Once the script runs out it raises
/// shutdown and never answers, so the producer abandons that final cycle.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<TruckTelemetry, FetchError>>>,
    fetch_times: Mutex<Vec<Instant>>,
    latency: Duration,
    shutdown: Shutdown,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<TruckTelemetry, FetchError>>, shutdown: Shutdown) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fetch_times: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            shutdown,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.fetch_times.lock().clone()
    }
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn fetch(&self) -> Result<TruckTelemetry, FetchError> {
        self.fetch_times.lock().push(Instant::now());
        let next = self.script.lock().pop_front();
        match next {
            Some(result) => {
                tokio::time::sleep(self.latency).await;
                result
            }
            None => {
                self.shutdown.trigger("script exhausted");
                std::future::pending().await
            }
        }
    }

    fn address(&self) -> &str {
        TEST_API_URL
    }
}

/// Always returns the same truck.
pub struct RepeatingSource(pub TruckTelemetry);

#[async_trait]
impl TelemetrySource for RepeatingSource {
    async fn fetch(&self) -> Result<TruckTelemetry, FetchError> {
        Ok(self.0.clone())
    }

    fn address(&self) -> &str {
        TEST_API_URL
    }
}

/// Raises shutdown the first time a poll comes back empty, i.e. once the
/// bus has been drained.
pub struct DrainingReceiver {
    inner: MemoryReceiver,
    shutdown: Shutdown,
    pub closes: Arc<Mutex<u32>>,
}

impl DrainingReceiver {
    pub fn new(inner: MemoryReceiver, shutdown: Shutdown) -> Self {
        Self {
            inner,
            shutdown,
            closes: Arc::new(Mutex::new(0)),
        }
    }
}

#[async_trait]
impl TelemetryReceiver for DrainingReceiver {
    async fn poll(&mut self, max: usize, wait: Duration) -> Result<Vec<BusRecord>, BusError> {
        let batch = self.inner.poll(max, wait).await?;
        if batch.is_empty() {
            self.shutdown.trigger("bus drained");
        }
        Ok(batch)
    }

    async fn commit(&mut self) -> Result<(), BusError> {
        self.inner.commit().await
    }

    async fn close(&mut self) -> Result<(), BusError> {
        *self.closes.lock() += 1;
        self.inner.close().await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub partition: String,
    pub offset: u64,
    pub truck_id: String,
    pub odometer: f64,
}

/// Records every envelope it is given. Trucks named `FAIL-*` return an error
/// and trucks named `PANIC-*` panic.
#[derive(Default)]
pub struct RecordingHandler {
    pub seen: Mutex<Vec<Seen>>,
}

#[async_trait]
impl TelemetryHandler for RecordingHandler {
    async fn handle(&self, record: &BusRecord, envelope: Envelope) -> Result<(), ProcessError> {
        let truck_id = envelope.partition_key().to_string();
        if truck_id.starts_with("FAIL-") {
            return Err(ProcessError::Handler(format!("rejected {}", truck_id)));
        }
        if truck_id.starts_with("PANIC-") {
            panic!("handler blew up on {}", truck_id);
        }
        self.seen.lock().push(Seen {
            partition: record.partition.clone(),
            offset: record.offset,
            truck_id,
            odometer: envelope.data.operations.odometer,
        });
        Ok(())
    }
}

/// Collects JSON log lines written by a thread-local subscriber.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<serde_json::Value> {
        let bytes = self.0.lock().clone();
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }

    /// Log lines whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<serde_json::Value> {
        self.lines()
            .into_iter()
            .filter(|line| line["fields"]["message"] == message)
            .collect()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
