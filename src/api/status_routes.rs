/// Status API routes
/// Liveness, readiness and ingestion telemetry endpoints
use actix_web::{get, web, HttpResponse};
use serde_json::json;

use super::server::{error_response, ApiState};
use crate::health;
use crate::metrics;

#[get("/health")]
async fn health_check(state: web::Data<ApiState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "graph_ready": state.graph.ready(),
        "graph_error": state.graph.error(),
        "tx_source": state.config.tx_source.as_str(),
    }))
}

#[get("/ready")]
async fn ready(state: web::Data<ApiState>) -> HttpResponse {
    match health::ingestion_report(&state.store, &state.graph, &state.config).await {
        Ok(report) if report.status == health::Status::Ok => {
            HttpResponse::Ok().json(json!({ "status": "ready" }))
        }
        Ok(report) => HttpResponse::ServiceUnavailable().json(json!({ "detail": report })),
        Err(e) => error_response(&e),
    }
}

#[get("/ingestion/status")]
async fn ingestion_status(state: web::Data<ApiState>) -> HttpResponse {
    match health::ingestion_report(&state.store, &state.graph, &state.config).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => error_response(&e),
    }
}

#[get("/metrics")]
async fn prometheus_metrics() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(metrics::gather_metrics())
}

/// Configure status routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(ready)
        .service(ingestion_status)
        .service(prometheus_metrics);
}
