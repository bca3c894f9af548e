/// Ready/health model
///
/// Derives a tri-state service status from graph-load state and ingestion
/// telemetry, precedence `degraded > starting > ok`, and assembles the full
/// ingestion report served by the status endpoints.
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::consumer::CONSUMER_NAME;
use crate::core::{Config, RiskResult, TxSource};
use crate::graph::GraphHandle;
use crate::storage::{IngestionState, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Starting,
    Degraded,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::Starting => "starting",
            Status::Degraded => "degraded",
        }
    }
}

/// Pure status derivation; the report assembly feeds it from live state.
pub fn derive_status(
    tx_source: TxSource,
    graph_ready: bool,
    graph_error: Option<&str>,
    tx_count: i64,
    ingestion: Option<&IngestionState>,
) -> Status {
    let mut status = Status::Ok;

    match tx_source {
        TxSource::Csv => {
            if !graph_ready {
                status = Status::Starting;
            }
        }
        TxSource::Db => {
            if tx_count == 0 || !graph_ready || ingestion.is_none() {
                status = Status::Starting;
            }
        }
    }

    if ingestion.and_then(|i| i.last_error.as_deref()).is_some() {
        status = Status::Degraded;
    }

    if let Some(error) = graph_error {
        // the "no transactions found" message is a startup hint, not a
        // degradation: with an empty table the service is still starting,
        // and once transactions exist the message is stale
        let empty_source_hint = error.to_lowercase().contains("no transactions found");
        if !empty_source_hint {
            status = Status::Degraded;
        }
    }

    status
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionMetrics {
    pub name: String,
    pub last_tx_id: Option<String>,
    pub last_processed_at: Option<chrono::DateTime<Utc>>,
    pub total_inserted: i64,
    pub last_error: Option<String>,
    pub seconds_since_last_processed: Option<f64>,
    pub ingested_last_5m: Option<i64>,
    pub tx_per_min_5m: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub created_at: chrono::DateTime<Utc>,
    pub tx_source: String,
    pub wallets_scored: i64,
    pub config_json: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub status: Status,
    pub tx_count: i64,
    pub metrics: Option<IngestionMetrics>,
    pub latest_scoring_run: Option<RunSummary>,
    pub graph_ready: bool,
    pub graph_error: Option<String>,
    pub graph_stats: Option<GraphStats>,
    pub tx_source: &'static str,
}

pub async fn ingestion_report(
    store: &Store,
    graph: &GraphHandle,
    config: &Config,
) -> RiskResult<IngestionReport> {
    let tx_count = store.count_transactions().await?;
    let ingestion = store.get_ingestion_state(CONSUMER_NAME).await?;
    let latest_run = store.get_latest_run().await?;

    let metrics = match &ingestion {
        Some(state) => {
            let seconds_since_last_processed = state
                .last_processed_at
                .map(|last| (Utc::now() - last).num_milliseconds() as f64 / 1000.0);
            let ingested_last_5m = store.count_ingested_since(5).await?;
            Some(IngestionMetrics {
                name: state.name.clone(),
                last_tx_id: state.last_tx_id.clone(),
                last_processed_at: state.last_processed_at,
                total_inserted: state.total_inserted,
                last_error: state.last_error.clone(),
                seconds_since_last_processed,
                ingested_last_5m: Some(ingested_last_5m),
                tx_per_min_5m: Some(ingested_last_5m as f64 / 5.0),
            })
        }
        None => None,
    };

    let latest_scoring_run = match latest_run {
        Some(run) => {
            let wallets_scored = store.count_scores_for_run(run.id).await?;
            Some(RunSummary {
                run_id: run.id,
                created_at: run.created_at,
                tx_source: run.tx_source,
                wallets_scored,
                config_json: run.config_json,
            })
        }
        None => None,
    };

    let graph_ready = graph.ready();
    let graph_error = graph.error();
    let graph_stats = if graph_ready {
        graph.snapshot().map(|snapshot| GraphStats {
            nodes: snapshot.graph.node_count(),
            edges: snapshot.graph.edge_count(),
        })
    } else {
        None
    };

    let status = derive_status(
        config.tx_source,
        graph_ready,
        graph_error.as_deref(),
        tx_count,
        ingestion.as_ref(),
    );

    Ok(IngestionReport {
        status,
        tx_count,
        metrics,
        latest_scoring_run,
        graph_ready,
        graph_error,
        graph_stats,
        tx_source: config.tx_source.as_str(),
    })
}
