/// Scoring API routes
/// Run creation plus stored-score reads and explainability
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::server::{error_response, ApiState};
use crate::core::RiskError;
use crate::engine::{explain_wallet_risk, RiskConfig};

#[derive(Debug, Deserialize)]
pub struct TopScoresQuery {
    pub limit: Option<i64>,
    /// Legacy alias still accepted by older dashboards.
    pub n: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub max_hops: Option<usize>,
    pub per_hop_limit: Option<usize>,
    pub total_limit: Option<usize>,
}

#[post("/run-score")]
async fn run_score(state: web::Data<ApiState>) -> HttpResponse {
    let snapshot = match state.graph.ready_snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => return error_response(&e),
    };

    match state
        .scoring
        .run_score(
            &state.store,
            &snapshot,
            &state.risk_config,
            &snapshot.source,
        )
        .await
    {
        Ok(outcome) => HttpResponse::Ok().json(outcome),
        Err(e) => error_response(&e),
    }
}

#[get("/scores/top")]
async fn top_scores(state: web::Data<ApiState>, query: web::Query<TopScoresQuery>) -> HttpResponse {
    let limit = query.limit.or(query.n).unwrap_or(20).clamp(1, 500);

    match state.store.get_top_scores_latest(limit).await {
        Ok(scores) => {
            let rows: Vec<_> = scores
                .iter()
                .map(|s| {
                    json!({
                        "wallet": s.wallet,
                        "risk_score": s.risk_score,
                        "run_id": s.run_id,
                        "created_at": s.created_at,
                    })
                })
                .collect();
            HttpResponse::Ok().json(rows)
        }
        Err(e) => error_response(&e),
    }
}

#[get("/scores/{wallet}")]
async fn latest_score(state: web::Data<ApiState>, wallet: web::Path<String>) -> HttpResponse {
    match state.store.get_latest_score_for_wallet(&wallet).await {
        Ok(Some(s)) => HttpResponse::Ok().json(json!({
            "wallet": s.wallet,
            "risk_score": s.risk_score,
            "exposures": s.exposures_json,
            "in_degree": s.in_degree,
            "out_degree": s.out_degree,
            "run_id": s.run_id,
            "created_at": s.created_at,
        })),
        Ok(None) => error_response(&RiskError::NotFound(format!(
            "No stored score found for wallet {}",
            wallet
        ))),
        Err(e) => error_response(&e),
    }
}

#[get("/scores/explain/{wallet}")]
async fn explain_score(
    state: web::Data<ApiState>,
    wallet: web::Path<String>,
    query: web::Query<ExplainQuery>,
) -> HttpResponse {
    // anchor to a stored score so the explanation refers to something persisted
    let stored = match state.store.get_latest_score_for_wallet(&wallet).await {
        Ok(Some(s)) => s,
        Ok(None) => {
            return error_response(&RiskError::NotFound(format!(
                "No stored score for wallet {}",
                wallet
            )))
        }
        Err(e) => return error_response(&e),
    };

    let run = match state.store.get_run(stored.run_id).await {
        Ok(run) => run,
        Err(e) => return error_response(&e),
    };

    let snapshot = match state.graph.ready_snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => return error_response(&e),
    };

    // score with the configuration captured by the run when it parses
    let cfg: RiskConfig = run
        .as_ref()
        .and_then(|r| serde_json::from_value(r.config_json.clone()).ok())
        .unwrap_or_else(|| state.risk_config.clone());

    let per_hop_limit = query.per_hop_limit.unwrap_or(15).clamp(1, 100);
    let total_limit = query.total_limit.unwrap_or(50).clamp(1, 200);

    let explanation = explain_wallet_risk(
        &snapshot.graph,
        &wallet,
        &snapshot.illicit,
        &cfg,
        query.max_hops,
        per_hop_limit,
        total_limit,
    );

    let explanation = match explanation {
        Some(explanation) => explanation,
        None => {
            return error_response(&RiskError::NotFound(format!(
                "Wallet {} not found in graph",
                wallet
            )))
        }
    };

    HttpResponse::Ok().json(json!({
        "wallet": wallet.as_str(),
        "stored_score": {
            "risk_score": stored.risk_score,
            "exposures_cumulative": stored.exposures_json,
            "in_degree": stored.in_degree,
            "out_degree": stored.out_degree,
            "run_id": stored.run_id,
            "created_at": stored.created_at,
        },
        "run": run.map(|r| json!({
            "run_id": r.id,
            "created_at": r.created_at,
            "tx_source": r.tx_source,
            "config_json": r.config_json,
        })),
        "explainability": explanation,
        "notes": {
            "exposures_in_db_are_cumulative": true,
            "explainability_uses_exact_hops": true,
        },
    }))
}

/// Configure scoring routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(run_score)
        .service(top_scores)
        .service(explain_score)
        .service(latest_score);
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_top_scores_limit_clamping() {
        let clamp = |limit: Option<i64>, n: Option<i64>| limit.or(n).unwrap_or(20).clamp(1, 500);
        assert_eq!(clamp(None, None), 20);
        assert_eq!(clamp(Some(9999), None), 500);
        assert_eq!(clamp(Some(-3), None), 1);
        assert_eq!(clamp(None, Some(7)), 7);
        // explicit limit wins over the legacy alias
        assert_eq!(clamp(Some(5), Some(100)), 5);
    }
}
