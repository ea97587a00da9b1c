use async_nats::jetstream::{self, consumer::pull, stream};
use async_nats::{ConnectOptions, HeaderMap, ServerAddr};
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{BusError, BusRecord, Delivery, TelemetryPublisher, TelemetryReceiver};
use crate::config::{BusConfig, ConsumerConfig, DeliverFrom, SecurityProtocol};
use crate::subjects;

/// Connects to the configured servers. Fails fast: an unreachable bus at
/// startup is fatal for every binary.
pub async fn connect(config: &BusConfig, client_name: &str) -> Result<async_nats::Client, BusError> {
    let servers = config
        .servers
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<ServerAddr>()
                .map_err(|e| BusError::Connect(format!("invalid server address '{}': {}", s, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut options = ConnectOptions::new()
        .name(client_name)
        .connection_timeout(config.connect_timeout());
    if config.security_protocol == SecurityProtocol::Tls {
        options = options.require_tls(true);
    }
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        options = options.user_and_password(user.clone(), pass.clone());
    }
    if let Some(token) = &config.token {
        options = options.token(token.clone());
    }

    options
        .connect(servers.as_slice())
        .await
        .map_err(|e| BusError::Connect(e.to_string()))
}

/// Looks up the stream backing `topic`, creating it on first use.
async fn ensure_stream(
    jetstream: &jetstream::Context,
    topic: &str,
    replicas: usize,
) -> Result<stream::Stream, BusError> {
    let name = subjects::stream_name(topic);
    match jetstream.get_stream(&name).await {
        Ok(s) => Ok(s),
        Err(_) => {
            info!(stream = %name, replicas, "Creating JetStream stream");
            jetstream
                .create_stream(stream::Config {
                    name: name.clone(),
                    subjects: vec![subjects::wildcard(topic)],
                    storage: stream::StorageType::File,
                    num_replicas: replicas,
                    ..Default::default()
                })
                .await
                .map_err(|e| {
                    error!("❌ Failed to create JetStream stream {}: {}", name, e);
                    BusError::Connect(e.to_string())
                })
        }
    }
}

pub struct NatsPublisher {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    topic: String,
}

impl NatsPublisher {
    pub async fn new(client: async_nats::Client, topic: &str, replicas: usize) -> Result<Self, BusError> {
        let jetstream = jetstream::new(client.clone());
        ensure_stream(&jetstream, topic, replicas).await?;
        Ok(Self {
            client,
            jetstream,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl TelemetryPublisher for NatsPublisher {
    async fn publish(&self, key: &str, payload: Vec<u8>) -> Result<Delivery, BusError> {
        let subject = subjects::for_key(&self.topic, key);
        let mut headers = HeaderMap::new();
        headers.insert(subjects::KEY_HEADER, key);

        // The second await resolves once the stream has persisted the message
        // on its replica quorum.
        let ack = self
            .jetstream
            .publish_with_headers(subject.clone(), headers, payload.into())
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;

        Ok(Delivery {
            partition: subject,
            offset: ack.sequence,
        })
    }

    async fn flush(&self, timeout: Duration) -> Result<(), BusError> {
        tokio::time::timeout(timeout, self.client.flush())
            .await
            .map_err(|_| BusError::Timeout(timeout))?
            .map_err(|e| BusError::Publish(e.to_string()))
    }
}

/// Member of a consumer group, backed by a durable pull consumer.
/// Acknowledgements are held until [`TelemetryReceiver::commit`].
pub struct NatsReceiver {
    client: async_nats::Client,
    consumer: jetstream::consumer::PullConsumer,
    uncommitted: Vec<jetstream::Message>,
}

impl NatsReceiver {
    pub async fn join(
        client: async_nats::Client,
        bus: &BusConfig,
        consumer: &ConsumerConfig,
        group: &str,
    ) -> Result<Self, BusError> {
        let jetstream = jetstream::new(client.clone());
        let stream = ensure_stream(&jetstream, &bus.topic, bus.replicas).await?;

        let durable = subjects::durable_name(group);
        let deliver_policy = match consumer.deliver_from {
            DeliverFrom::Earliest => jetstream::consumer::DeliverPolicy::All,
            DeliverFrom::Latest => jetstream::consumer::DeliverPolicy::New,
        };
        let pull_consumer = stream
            .create_consumer(pull::Config {
                durable_name: Some(durable.clone()),
                filter_subject: subjects::wildcard(&bus.topic),
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                // Un-acked messages come back only after several missed commits.
                ack_wait: consumer.commit_interval() * 6,
                deliver_policy,
                ..Default::default()
            })
            .await
            .map_err(|e| {
                error!("❌ Failed to create JetStream consumer {}: {}", durable, e);
                BusError::Connect(e.to_string())
            })?;

        info!(group = %durable, topic = %bus.topic, "🚀 Joined consumer group");
        Ok(Self {
            client,
            consumer: pull_consumer,
            uncommitted: Vec::new(),
        })
    }
}

fn to_record(message: &jetstream::Message) -> BusRecord {
    let inner = &message.message;
    let offset = message
        .info()
        .map(|info| info.stream_sequence)
        .unwrap_or_default();
    let key = inner
        .headers
        .as_ref()
        .and_then(|headers| headers.get(subjects::KEY_HEADER))
        .map(|value| value.as_str().to_string())
        .or_else(|| subjects::key_token(&inner.subject).map(str::to_string));

    BusRecord {
        key,
        partition: inner.subject.to_string(),
        offset,
        payload: inner.payload.to_vec(),
    }
}

#[async_trait]
impl TelemetryReceiver for NatsReceiver {
    async fn poll(&mut self, max: usize, wait: Duration) -> Result<Vec<BusRecord>, BusError> {
        let mut batch = self
            .consumer
            .batch()
            .max_messages(max)
            .expires(wait)
            .messages()
            .await
            .map_err(|e| BusError::Receive(e.to_string()))?;

        // Messages only join the commit set once the whole batch is handed
        // out; if this future is dropped they stay un-acked and are redelivered.
        let mut received = Vec::new();
        while let Some(message) = batch.next().await {
            match message {
                Ok(message) => received.push(message),
                Err(e) => {
                    warn!(error = %e, delivered = received.len(), "Batch ended early");
                    break;
                }
            }
        }

        let records = received.iter().map(to_record).collect();
        self.uncommitted.extend(received);
        Ok(records)
    }

    async fn commit(&mut self) -> Result<(), BusError> {
        let pending = std::mem::take(&mut self.uncommitted);
        let mut failed = 0usize;
        for message in &pending {
            if let Err(e) = message.ack().await {
                failed += 1;
                warn!(subject = %message.message.subject, error = %e, "Failed to ACK message");
            }
        }
        if failed > 0 {
            return Err(BusError::Commit(format!(
                "{} of {} acknowledgements failed",
                failed,
                pending.len()
            )));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BusError> {
        let committed = self.commit().await;
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Commit(e.to_string()))?;
        committed
    }
}
