use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use super::{BusError, BusRecord, Delivery, TelemetryPublisher, TelemetryReceiver};

/// In-process bus with keyed partitions, per-partition offsets and
/// per-group committed offsets. Used by tests and local dry runs.
#[derive(Clone)]
pub struct MemoryBus {
    topic: String,
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct State {
    partitions: Vec<Vec<BusRecord>>,
    committed: HashMap<(String, usize), u64>,
    scripted_failures: VecDeque<BusError>,
    publish_attempts: u64,
    flushes: u64,
}

impl MemoryBus {
    pub fn new(topic: impl Into<String>, partitions: usize) -> Self {
        let state = State {
            partitions: vec![Vec::new(); partitions.max(1)],
            ..Default::default()
        };
        Self {
            topic: topic.into(),
            state: Arc::new(Mutex::new(state)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// The next `count` publish attempts fail with `error`.
    pub fn fail_next_publishes(&self, count: usize, error: BusError) {
        let mut state = self.state.lock();
        state
            .scripted_failures
            .extend(std::iter::repeat(error).take(count));
    }

    pub fn publish_attempts(&self) -> u64 {
        self.state.lock().publish_attempts
    }

    pub fn flushes(&self) -> u64 {
        self.state.lock().flushes
    }

    /// Every stored record, partition by partition.
    pub fn records(&self) -> Vec<BusRecord> {
        self.state.lock().partitions.iter().flatten().cloned().collect()
    }

    pub fn records_for_key(&self, key: &str) -> Vec<BusRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.key.as_deref() == Some(key))
            .collect()
    }

    /// Next offset the group will read from `partition`.
    pub fn committed_offset(&self, group: &str, partition: &str) -> u64 {
        let state = self.state.lock();
        (0..state.partitions.len())
            .find(|&i| self.partition_name(i) == partition)
            .and_then(|i| state.committed.get(&(group.to_string(), i)).copied())
            .unwrap_or(0)
    }

    /// Joins `group`, resuming from its committed offsets.
    pub fn subscribe(&self, group: impl Into<String>) -> MemoryReceiver {
        let group = group.into();
        let positions = {
            let state = self.state.lock();
            (0..state.partitions.len())
                .map(|i| state.committed.get(&(group.clone(), i)).copied().unwrap_or(0))
                .collect()
        };
        MemoryReceiver {
            bus: self.clone(),
            group,
            positions,
            closed: false,
        }
    }

    fn partition_for(&self, key: &str, partitions: usize) -> usize {
        // FNV-1a keeps the key -> partition mapping stable across runs.
        let hash = key.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
            (h ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
        });
        (hash % partitions as u64) as usize
    }

    fn partition_name(&self, index: usize) -> String {
        format!("{}-{}", self.topic, index)
    }
}

#[async_trait]
impl TelemetryPublisher for MemoryBus {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<Delivery, BusError> {
        let delivery = {
            let mut state = self.state.lock();
            state.publish_attempts += 1;
            if let Some(err) = state.scripted_failures.pop_front() {
                return Err(err);
            }
            let index = self.partition_for(key, state.partitions.len());
            let partition = self.partition_name(index);
            let log = &mut state.partitions[index];
            let offset = log.len() as u64;
            log.push(BusRecord {
                key: Some(key.to_string()),
                partition: partition.clone(),
                offset,
                payload,
            });
            Delivery { partition, offset }
        };
        self.notify.notify_waiters();
        Ok(delivery)
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), BusError> {
        self.state.lock().flushes += 1;
        Ok(())
    }
}

pub struct MemoryReceiver {
    bus: MemoryBus,
    group: String,
    positions: Vec<u64>,
    closed: bool,
}

impl MemoryReceiver {
    fn take_available(&mut self, max: usize) -> Vec<BusRecord> {
        let state = self.bus.state.lock();
        let mut batch = Vec::new();
        for (index, log) in state.partitions.iter().enumerate() {
            let from = self.positions[index] as usize;
            for record in log.iter().skip(from) {
                if batch.len() == max {
                    return batch;
                }
                batch.push(record.clone());
                self.positions[index] += 1;
            }
        }
        batch
    }
}

#[async_trait]
impl TelemetryReceiver for MemoryReceiver {
    async fn poll(&mut self, max: usize, wait: Duration) -> Result<Vec<BusRecord>, BusError> {
        if self.closed {
            return Err(BusError::Receive("receiver closed".to_string()));
        }
        let notify = self.bus.notify.clone();
        let notified = notify.notified();
        let batch = self.take_available(max);
        if !batch.is_empty() {
            return Ok(batch);
        }
        let _ = tokio::time::timeout(wait, notified).await;
        Ok(self.take_available(max))
    }

    async fn commit(&mut self) -> Result<(), BusError> {
        let mut state = self.bus.state.lock();
        for (index, position) in self.positions.iter().enumerate() {
            state.committed.insert((self.group.clone(), index), *position);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BusError> {
        if !self.closed {
            self.commit().await?;
            self.closed = true;
        }
        Ok(())
    }
}
