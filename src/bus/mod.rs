//! Seams to the message bus.
//!
//! The bus is an ordered, partitioned, durable log with consumer-group
//! offset tracking. Producers and consumers only see it through these traits;
//! [`nats`] binds them to JetStream and [`memory`] keeps everything in process.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod nats;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Publish rejected: {0}")]
    Publish(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Receive failed: {0}")]
    Receive(String),
    #[error("Commit failed: {0}")]
    Commit(String),
}

/// Where the bus stored an acknowledged message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub partition: String,
    pub offset: u64,
}

/// One message as received by a consumer, raw bytes included so failures can
/// be replayed by hand.
#[derive(Debug, Clone, PartialEq)]
pub struct BusRecord {
    pub key: Option<String>,
    pub partition: String,
    pub offset: u64,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    /// Sends one message and waits until the bus has durably acknowledged it.
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<Delivery, BusError>;

    /// Pushes out anything still buffered, bounded by `timeout`.
    async fn flush(&self, timeout: Duration) -> Result<(), BusError>;
}

#[async_trait]
pub trait TelemetryReceiver: Send {
    /// Waits at most `wait` for up to `max` records. An empty batch is normal.
    async fn poll(&mut self, max: usize, wait: Duration) -> Result<Vec<BusRecord>, BusError>;

    /// Marks everything returned by earlier polls as processed.
    async fn commit(&mut self) -> Result<(), BusError>;

    /// Commits outstanding progress and leaves the consumer group.
    async fn close(&mut self) -> Result<(), BusError>;
}
