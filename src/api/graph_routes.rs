/// Graph API routes
/// Snapshot reload and the analyst-facing wallet subgraph view
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use super::server::{error_response, ApiState};
use crate::core::RiskError;
use crate::engine::{subgraph, SubgraphParams};
use crate::graph;

#[derive(Debug, Deserialize)]
pub struct SubgraphQuery {
    pub hops: Option<usize>,
    pub edge_limit: Option<usize>,
    pub node_limit: Option<usize>,
    pub min_amount: Option<f64>,
    pub only_connected: Option<bool>,
}

impl SubgraphQuery {
    fn params(&self) -> SubgraphParams {
        SubgraphParams {
            hops: self.hops.unwrap_or(2),
            edge_limit: self.edge_limit.unwrap_or(600),
            node_limit: self.node_limit.unwrap_or(100),
            min_amount: self.min_amount.unwrap_or(0.0),
            only_connected: self.only_connected.unwrap_or(false),
        }
        .clamped()
    }
}

#[post("/reload-graph")]
async fn reload_graph(state: web::Data<ApiState>) -> HttpResponse {
    match graph::rebuild(&state.store, &state.config, &state.graph).await {
        Ok(stats) => HttpResponse::Ok().json(json!({
            "ok": true,
            "tx_count": stats.tx_count,
            "tx_source": state.config.tx_source.as_str(),
            "nodes": stats.nodes,
            "edges": stats.edges,
        })),
        Err(e) => error_response(&e),
    }
}

/// Induced subgraph around a center wallet, nodes picked hop-stratified by
/// importance so limited views stay representative.
#[get("/graph/wallet/{wallet}")]
async fn wallet_subgraph(
    state: web::Data<ApiState>,
    wallet: web::Path<String>,
    query: web::Query<SubgraphQuery>,
) -> HttpResponse {
    let snapshot = match state.graph.ready_snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => return error_response(&e),
    };

    if !snapshot.graph.contains(&wallet) {
        return error_response(&RiskError::NotFound(format!(
            "Wallet {} not found in graph",
            wallet
        )));
    }

    let params = query.params();

    // enrich candidates with the latest run's stored scores in one lookup
    let score_map = match state.store.get_latest_run().await {
        Ok(Some(run)) => {
            let layers = crate::engine::k_hop_layers(&snapshot.graph, &wallet, params.hops);
            let wallets: Vec<&str> = layers
                .iter()
                .flatten()
                .map(String::as_str)
                .collect();
            match state.store.scores_for_wallets(run.id, &wallets).await {
                Ok(map) => map,
                Err(e) => return error_response(&e),
            }
        }
        Ok(None) => Default::default(),
        Err(e) => return error_response(&e),
    };

    match subgraph::extract(&snapshot, &wallet, &score_map, &params) {
        Some(view) => HttpResponse::Ok().json(view),
        None => error_response(&RiskError::NotFound(format!(
            "Wallet {} not found in graph",
            wallet
        ))),
    }
}

/// Configure graph routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(reload_graph).service(wallet_subgraph);
}
