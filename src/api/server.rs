/// REST API server for the risk platform read surface.
use std::sync::Arc;

use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use serde_json::json;

use crate::api::{graph_routes, score_routes, status_routes};
use crate::core::{Config, RiskError};
use crate::engine::{RiskConfig, ScoringEngine};
use crate::graph::GraphHandle;
use crate::storage::Store;

/// Shared server state.
pub struct ApiState {
    pub config: Config,
    pub store: Arc<Store>,
    pub graph: Arc<GraphHandle>,
    pub scoring: Arc<ScoringEngine>,
    pub risk_config: RiskConfig,
}

/// Map engine errors to the structured status codes of the read surface.
/// Internal traces never reach the client beyond the error message itself.
pub fn error_response(e: &RiskError) -> HttpResponse {
    let body = json!({ "detail": e.to_string() });
    match e {
        RiskError::InvalidInput(_) => HttpResponse::BadRequest().json(body),
        RiskError::NotFound(_) => HttpResponse::NotFound().json(body),
        RiskError::NotReady(_) | RiskError::Storage(_) | RiskError::Bus(_) => {
            HttpResponse::ServiceUnavailable().json(body)
        }
        RiskError::Busy => HttpResponse::Conflict().json(body),
        RiskError::Unknown(_) => HttpResponse::InternalServerError().json(body),
    }
}

pub async fn start_server(state: ApiState, host: &str, port: u16) -> std::io::Result<()> {
    let state = web::Data::new(state);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .route("/", web::get().to(index))
            .configure(status_routes::configure)
            .configure(score_routes::configure)
            .configure(graph_routes::configure)
    })
    .bind((host, port))?
    .run()
    .await
}

async fn index() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "service": "riskgraph",
        "feature": "wallet risk scoring",
        "endpoints": {
            "health": "/health",
            "ready": "/ready",
            "reload_graph": "/reload-graph",
            "run_score": "/run-score",
            "top_scores": "/scores/top",
            "wallet_score": "/scores/{wallet}",
            "explain_score": "/scores/explain/{wallet}",
            "ingestion_status": "/ingestion/status",
            "wallet_subgraph": "/graph/wallet/{wallet}",
            "metrics": "/metrics"
        }
    }))
}
