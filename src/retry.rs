use std::time::Duration;
use tracing::warn;

use crate::bus::{BusError, Delivery, TelemetryPublisher};
use crate::shutdown::Shutdown;

/// Fixed-backoff retry schedule: one initial attempt plus `max_retries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self { max_retries, backoff }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Tracks failures of one operation against a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, failures: 0 }
    }

    /// 1-based number of the attempt about to run.
    pub fn attempt(&self) -> u32 {
        self.failures + 1
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record_failure(&mut self) -> RetryDecision {
        self.failures += 1;
        if self.failures > self.policy.max_retries {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.policy.backoff)
        }
    }
}

/// Result of [`publish_with_retry`] plus how many retries it took.
#[derive(Debug)]
pub struct PublishOutcome {
    pub result: Result<Delivery, BusError>,
    pub retries: u32,
    /// Shutdown cut the backoff short; `result` holds the last error.
    pub interrupted: bool,
}

/// Publishes one record, bounding each attempt by `send_timeout` and retrying
/// per `policy`.
///
/// An attempt already sent is always awaited. When `shutdown` is given and
/// raised, the next backoff ends at once and no further attempt is made.
pub async fn publish_with_retry(
    publisher: &dyn TelemetryPublisher,
    key: &str,
    payload: &[u8],
    send_timeout: Duration,
    policy: RetryPolicy,
    shutdown: Option<&Shutdown>,
) -> PublishOutcome {
    let mut state = RetryState::new(policy);
    loop {
        let attempt = state.attempt();
        let result = match tokio::time::timeout(send_timeout, publisher.publish(key, payload.to_vec())).await {
            Ok(result) => result,
            Err(_) => Err(BusError::Timeout(send_timeout)),
        };

        let error = match result {
            Ok(delivery) => {
                return PublishOutcome {
                    result: Ok(delivery),
                    retries: state.failures(),
                    interrupted: false,
                };
            }
            Err(e) => e,
        };

        match state.record_failure() {
            RetryDecision::RetryAfter(delay) => {
                warn!(
                    key,
                    attempt,
                    max_attempts = policy.max_attempts(),
                    error = %error,
                    "Publish failed, retrying in {:?}",
                    delay
                );
                let interrupted = match shutdown {
                    Some(shutdown) => tokio::select! {
                        _ = tokio::time::sleep(delay) => false,
                        _ = shutdown.cancelled() => true,
                    },
                    None => {
                        tokio::time::sleep(delay).await;
                        false
                    }
                };
                if interrupted {
                    warn!(key, attempt, "Shutdown during publish backoff, giving up");
                    return PublishOutcome {
                        result: Err(error),
                        retries: state.failures() - 1,
                        interrupted: true,
                    };
                }
            }
            RetryDecision::GiveUp => {
                return PublishOutcome {
                    result: Err(error),
                    retries: state.failures() - 1,
                    interrupted: false,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::MemoryBus;
    use tokio::time::Instant;

    #[test]
    fn test_schedule_gives_up_after_max_retries() {
        let mut state = RetryState::new(RetryPolicy::new(2, Duration::from_millis(10)));
        assert_eq!(state.attempt(), 1);
        assert_eq!(state.record_failure(), RetryDecision::RetryAfter(Duration::from_millis(10)));
        assert_eq!(state.record_failure(), RetryDecision::RetryAfter(Duration::from_millis(10)));
        assert_eq!(state.attempt(), 3);
        assert_eq!(state.record_failure(), RetryDecision::GiveUp);
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let mut state = RetryState::new(RetryPolicy::new(0, Duration::from_secs(1)));
        assert_eq!(state.record_failure(), RetryDecision::GiveUp);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_then_success() {
        let bus = MemoryBus::new("t", 1);
        bus.fail_next_publishes(3, BusError::Publish("leader not available".into()));

        let started = Instant::now();
        let outcome = publish_with_retry(
            &bus,
            "TRK-001",
            b"{}",
            Duration::from_secs(10),
            RetryPolicy::new(3, Duration::from_secs(1)),
            None,
        )
        .await;

        assert!(outcome.result.is_ok());
        assert_eq!(outcome.retries, 3);
        assert_eq!(bus.publish_attempts(), 4);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(bus.records().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let bus = MemoryBus::new("t", 1);
        bus.fail_next_publishes(10, BusError::Publish("broker down".into()));

        let outcome = publish_with_retry(
            &bus,
            "TRK-001",
            b"{}",
            Duration::from_secs(10),
            RetryPolicy::new(3, Duration::from_secs(1)),
            None,
        )
        .await;

        assert_eq!(outcome.result, Err(BusError::Publish("broker down".into())));
        assert_eq!(outcome.retries, 3);
        assert!(!outcome.interrupted);
        assert_eq!(bus.publish_attempts(), 4);
        assert!(bus.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cuts_backoff_short() {
        let bus = MemoryBus::new("t", 1);
        bus.fail_next_publishes(10, BusError::Publish("broker down".into()));
        let shutdown = Shutdown::new();
        let trigger = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                shutdown.trigger("SIGTERM");
            })
        };

        let started = Instant::now();
        let outcome = publish_with_retry(
            &bus,
            "TRK-001",
            b"{}",
            Duration::from_secs(10),
            RetryPolicy::new(3, Duration::from_secs(1)),
            Some(&shutdown),
        )
        .await;
        trigger.await.unwrap();

        assert!(outcome.interrupted);
        assert_eq!(outcome.result, Err(BusError::Publish("broker down".into())));
        assert_eq!(outcome.retries, 0);
        assert_eq!(bus.publish_attempts(), 1, "No attempt may start after shutdown");
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
