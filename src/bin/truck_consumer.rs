use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

use haul_telemetry::api;
use haul_telemetry::bus::nats::{self, NatsReceiver};
use haul_telemetry::config::Settings;
use haul_telemetry::consumer::{ConsumerLoop, ConsumerOptions, LoggingHandler};
use haul_telemetry::logging;
use haul_telemetry::shutdown::Shutdown;

const CLIENT_NAME: &str = "truck-consumer";
const DEFAULT_GROUP: &str = "truck-consumer-group";

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
    info!("║               HAUL TELEMETRY - Truck Consumer                 ║");
    info!("╚═══════════════════════════════════════════════════════════════╝");
    info!(bus = ?settings.bus, consumer = ?settings.consumer, "Configuration loaded");

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
    let group = settings.consumer.group(DEFAULT_GROUP);
    let receiver = match NatsReceiver::join(client, &settings.bus, &settings.consumer, group).await {
        Ok(r) => r,
        Err(e) => {
            error!("❌ Failed to join consumer group {}: {}", group, e);
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

    let stats = ConsumerLoop::new(
        Box::new(receiver),
        Arc::new(LoggingHandler::new()),
        ConsumerOptions::from(&settings.consumer),
        shutdown.clone(),
    )
    .run()
    .await;

    shutdown.complete("consumer finished");
    if let Some(handle) = api_handle {
        let _ = handle.await;
    }
    info!(processed = stats.processed, failed = stats.failed(), "Truck consumer shutdown complete");
    ExitCode::SUCCESS
}
