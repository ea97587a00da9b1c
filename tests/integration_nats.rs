//! Round trip through a live JetStream server.
//!
//! Run with a local server (`nats-server -js`) and
//! `cargo test --test integration_nats -- --ignored`.

use std::time::Duration;

use haul_telemetry::bus::nats::{self, NatsPublisher, NatsReceiver};
use haul_telemetry::bus::{TelemetryPublisher, TelemetryReceiver};
use haul_telemetry::codec;
use haul_telemetry::config::{BusConfig, ConsumerConfig};
use haul_telemetry::envelope::Envelope;
use haul_telemetry::model::TruckTelemetry;

fn bus_config(topic: &str) -> BusConfig {
    let mut config = BusConfig::default();
    if let Ok(url) = std::env::var("NATS_URL") {
        config.servers = vec![url];
    }
    config.topic = topic.to_string();
    config
}

#[tokio::test]
#[ignore = "needs a JetStream-enabled NATS server"]
async fn test_publish_then_consume_over_jetstream() {
    let topic = format!("truck-telemetry-it-{}", uuid::Uuid::new_v4().simple());
    let bus = bus_config(&topic);
    let client = nats::connect(&bus, "haul-telemetry-it").await.expect("Failed to connect to NATS");

    let publisher = NatsPublisher::new(client.clone(), &topic, 1).await.unwrap();
    let mut deliveries = Vec::new();
    for i in 0..3 {
        let mut truck = TruckTelemetry::with_defaults("TRK-001", "A-1");
        truck.operations.odometer = f64::from(i);
        let payload = codec::encode(&Envelope::new("it", "http://localhost", truck)).unwrap();
        deliveries.push(publisher.publish("TRK-001", payload).await.unwrap());
    }
    publisher.flush(Duration::from_secs(5)).await.unwrap();
    assert!(deliveries.windows(2).all(|w| w[0].offset < w[1].offset));
    assert!(deliveries.iter().all(|d| d.partition == deliveries[0].partition));

    let consumer = ConsumerConfig::default();
    let mut receiver = NatsReceiver::join(client.clone(), &bus, &consumer, "it-group").await.unwrap();
    let records = receiver.poll(10, Duration::from_secs(2)).await.unwrap();
    assert_eq!(records.len(), 3);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.key.as_deref(), Some("TRK-001"));
        let envelope = codec::decode(&record.payload).unwrap();
        assert_eq!(envelope.data.operations.odometer, i as f64);
    }
    receiver.close().await.unwrap();

    // Committed: a new member of the same group sees nothing.
    let mut again = NatsReceiver::join(client, &bus, &consumer, "it-group").await.unwrap();
    let records = again.poll(10, Duration::from_millis(500)).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
#[ignore = "needs a JetStream-enabled NATS server"]
async fn test_unreachable_bus_fails_fast() {
    let mut bus = bus_config("truck-telemetry");
    bus.servers = vec!["nats://127.0.0.1:1".to_string()];
    bus.connect_timeout_ms = 500;
    assert!(nats::connect(&bus, "haul-telemetry-it").await.is_err());
}
