use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bus::TelemetryPublisher;
use crate::codec;
use crate::config::ProducerConfig;
use crate::envelope::Envelope;
use crate::metrics;
use crate::retry::{self, RetryPolicy};
use crate::shutdown::Shutdown;
use crate::source::{FetchError, TelemetrySource};

#[derive(Debug, Clone)]
pub struct ProducerOptions {
    /// Tag stamped on every envelope's `source`.
    pub source_tag: String,
    /// Start-to-start spacing of poll cycles.
    pub poll_interval: Duration,
    pub send_timeout: Duration,
    pub retry: RetryPolicy,
    pub flush_timeout: Duration,
}

impl From<&ProducerConfig> for ProducerOptions {
    fn from(config: &ProducerConfig) -> Self {
        Self {
            source_tag: config.source.clone(),
            poll_interval: config.poll_interval(),
            send_timeout: config.send_timeout(),
            retry: RetryPolicy::new(config.max_retries, config.retry_backoff()),
            flush_timeout: config.flush_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub polls: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub fetch_failures: u64,
    pub publish_failures: u64,
    pub retries: u64,
    /// Cycles cut short by shutdown before anything was published.
    pub abandoned: u64,
}

enum CycleOutcome {
    Published,
    Failed,
    Abandoned,
}

/// Fetch, wrap, publish, sleep; until shutdown.
///
/// A failing cycle never stops the loop. Shutdown lets a publish attempt
/// already sent finish, but ends any retry backoff at once and fails the cycle.
pub struct ProducerLoop {
    source: Arc<dyn TelemetrySource>,
    publisher: Arc<dyn TelemetryPublisher>,
    options: ProducerOptions,
    shutdown: Shutdown,
    stats: ProducerStats,
}

impl ProducerLoop {
    pub fn new(
        source: Arc<dyn TelemetrySource>,
        publisher: Arc<dyn TelemetryPublisher>,
        options: ProducerOptions,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            source,
            publisher,
            options,
            shutdown,
            stats: ProducerStats::default(),
        }
    }

    pub async fn run(mut self) -> ProducerStats {
        info!(
            api_url = self.source.address(),
            interval = ?self.options.poll_interval,
            "🚀 Producer loop started"
        );

        while !self.shutdown.is_triggered() {
            let started = Instant::now();
            self.run_cycle().await;

            if self.shutdown.is_triggered() {
                break;
            }
            let remaining = self.options.poll_interval.saturating_sub(started.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                _ = self.shutdown.cancelled() => {}
            }
        }

        self.finish().await
    }

    async fn run_cycle(&mut self) {
        self.stats.polls += 1;
        metrics::POLLS.inc();

        match self.poll_once().await {
            CycleOutcome::Published => self.stats.succeeded += 1,
            CycleOutcome::Failed => self.stats.failed += 1,
            CycleOutcome::Abandoned => self.stats.abandoned += 1,
        }

        info!(
            polls = self.stats.polls,
            succeeded = self.stats.succeeded,
            failed = self.stats.failed,
            "Poll cycle complete"
        );
    }

    async fn poll_once(&mut self) -> CycleOutcome {
        let poll = self.stats.polls;
        debug!(poll, "Fetching truck data");

        let fetched = tokio::select! {
            result = self.source.fetch() => result,
            _ = self.shutdown.cancelled() => {
                info!(poll, "Shutdown during fetch, abandoning cycle");
                return CycleOutcome::Abandoned;
            }
        };
        let record = match fetched.and_then(|record| {
            record.validate()?;
            Ok(record)
        }) {
            Ok(record) => record,
            Err(e) => {
                self.stats.fetch_failures += 1;
                metrics::CYCLE_FAILURES.with_label_values(&["fetch"]).inc();
                match &e {
                    FetchError::Invalid(_) | FetchError::Malformed(_) => {
                        warn!(poll, api_url = self.source.address(), error = %e, "Discarding bad record")
                    }
                    _ => error!(poll, api_url = self.source.address(), error = %e, "Fetch failed"),
                }
                return CycleOutcome::Failed;
            }
        };

        let envelope = Envelope::new(&self.options.source_tag, self.source.address(), record);
        let key = envelope.partition_key().to_string();
        let payload = match codec::encode(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.publish_failures += 1;
                metrics::CYCLE_FAILURES.with_label_values(&["encode"]).inc();
                error!(poll, truck_id = %key, error = %e, "Failed to encode envelope");
                return CycleOutcome::Failed;
            }
        };

        let outcome = retry::publish_with_retry(
            self.publisher.as_ref(),
            &key,
            &payload,
            self.options.send_timeout,
            self.options.retry,
            Some(&self.shutdown),
        )
        .await;
        self.stats.retries += u64::from(outcome.retries);
        metrics::PUBLISH_RETRIES.inc_by(u64::from(outcome.retries));

        match outcome.result {
            Ok(delivery) => {
                metrics::PUBLISHED.inc();
                info!(
                    poll,
                    truck_id = %key,
                    partition = %delivery.partition,
                    offset = delivery.offset,
                    "✅ Published truck telemetry"
                );
                CycleOutcome::Published
            }
            Err(e) => {
                self.stats.publish_failures += 1;
                metrics::CYCLE_FAILURES.with_label_values(&["publish"]).inc();
                error!(
                    poll,
                    truck_id = %key,
                    attempts = outcome.retries + 1,
                    interrupted = outcome.interrupted,
                    error = %e,
                    "❌ Publish failed, dropping record"
                );
                CycleOutcome::Failed
            }
        }
    }

    async fn finish(self) -> ProducerStats {
        info!("Flushing pending messages...");
        if let Err(e) = self.publisher.flush(self.options.flush_timeout).await {
            warn!(error = %e, "Flush did not complete cleanly");
        }

        let stats = self.stats;
        info!(
            polls = stats.polls,
            succeeded = stats.succeeded,
            failed = stats.failed,
            fetch_failures = stats.fetch_failures,
            publish_failures = stats.publish_failures,
            retries = stats.retries,
            abandoned = stats.abandoned,
            "Producer stopped"
        );
        stats
    }
}
