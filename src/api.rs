use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::shutdown::Shutdown;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    shutting_down: bool,
}

pub async fn health_check(shutdown: web::Data<Shutdown>) -> impl Responder {
    let shutting_down = shutdown.is_triggered();
    let body = HealthResponse {
        status: if shutting_down { "draining" } else { "ok" },
        version: env!("CARGO_PKG_VERSION"),
        shutting_down,
    };
    if shutting_down {
        HttpResponse::ServiceUnavailable().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

pub async fn metrics() -> impl Responder {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health_check)))
        .service(web::resource("/metrics").route(web::get().to(metrics)));
}

/// Serves `/health` and `/metrics` on `port` until shutdown is raised.
pub fn serve(port: u16, shutdown: Shutdown) -> std::io::Result<JoinHandle<std::io::Result<()>>> {
    let bind_address = format!("0.0.0.0:{}", port);
    info!("🚀 Starting API Server on {}", bind_address);

    let data = web::Data::new(shutdown.clone());
    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(config))
        .bind(&bind_address)?
        .disable_signals()
        .workers(1)
        .run();

    let handle = server.handle();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        handle.stop(true).await;
    });
    Ok(tokio::spawn(server))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};

    #[actix_web::test]
    async fn test_health_reflects_shutdown() {
        let shutdown = Shutdown::new();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(shutdown.clone()))
                .configure(config),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        shutdown.trigger("test");
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["shutting_down"], true);
    }

    #[actix_web::test]
    async fn test_metrics_exposes_counters() {
        crate::metrics::POLLS.inc();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Shutdown::new()))
                .configure(config),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("haul_producer_polls_total"));
    }
}
