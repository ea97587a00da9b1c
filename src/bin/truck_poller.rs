use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use haul_telemetry::api;
use haul_telemetry::bus::nats::{self, NatsPublisher};
use haul_telemetry::config::Settings;
use haul_telemetry::logging;
use haul_telemetry::producer::{ProducerLoop, ProducerOptions};
use haul_telemetry::shutdown::Shutdown;
use haul_telemetry::source::HttpTruckSource;

const CLIENT_NAME: &str = "truck-poller";

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    let settings = match Settings::new() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(settings.log.format);

    info!("╔═══════════════════════════════════════════════════════════════╗");
    info!("║               HAUL TELEMETRY - Truck Poller                   ║");
    info!("╚═══════════════════════════════════════════════════════════════╝");
    info!(bus = ?settings.bus, api_url = %settings.producer.api_url, "Configuration loaded");

    let shutdown = Shutdown::new();
    if let Err(e) = shutdown.install_signal_handlers() {
        error!("❌ Failed to install signal handlers: {}", e);
        return ExitCode::FAILURE;
    }

    let client = match nats::connect(&settings.bus, settings.bus.client_name(CLIENT_NAME)).await {
        Ok(c) => {
            info!("✅ Connected to NATS");
            c
        }
        Err(e) => {
            error!("❌ Failed to connect to NATS: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let publisher = match NatsPublisher::new(client, &settings.bus.topic, settings.bus.replicas).await {
        Ok(p) => p,
        Err(e) => {
            error!("❌ Failed to prepare topic {}: {}", settings.bus.topic, e);
            return ExitCode::FAILURE;
        }
    };
    let source = match HttpTruckSource::new(&settings.producer.api_url, settings.producer.fetch_timeout()) {
        Ok(s) => s,
        Err(e) => {
            error!("❌ Failed to build HTTP client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let api_handle = match settings.http.port.map(|port| api::serve(port, shutdown.clone())) {
        Some(Ok(handle)) => Some(handle),
        Some(Err(e)) => {
            error!("❌ Failed to start API server: {}", e);
            return ExitCode::FAILURE;
        }
        None => None,
    };

    let stats = ProducerLoop::new(
        Arc::new(source),
        Arc::new(publisher),
        ProducerOptions::from(&settings.producer),
        shutdown.clone(),
    )
    .run()
    .await;

    shutdown.complete("producer finished");
    if let Some(handle) = api_handle {
        let _ = handle.await;
    }
    info!(succeeded = stats.succeeded, failed = stats.failed, "Truck poller shutdown complete");
    ExitCode::SUCCESS
}
