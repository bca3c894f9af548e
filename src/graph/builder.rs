/// Graph builder - one linear scan over a transaction snapshot
///
/// Sources: the transactions table (TX_SOURCE=db) or a delimited file with
/// `src`, `dst` and optional `amount` columns (TX_SOURCE=csv). The built
/// graph only replaces the published snapshot after the full pass succeeds.
use std::path::Path;

use tracing::info;

use super::illicit::pick_seed_illicit_wallets;
use super::snapshot::{GraphHandle, GraphSnapshot};
use super::tx_graph::TxGraph;
use crate::core::{Config, RiskError, RiskResult, TxSource};
use crate::metrics;
use crate::storage::Store;

/// One transaction edge as fed into the builder, already source-agnostic.
#[derive(Debug, Clone)]
pub struct TxEdge {
    pub src: String,
    pub dst: String,
    pub amount: f64,
}

/// Summary of a completed rebuild, returned by the reload endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReloadStats {
    pub tx_count: usize,
    pub nodes: usize,
    pub edges: usize,
}

pub fn build_tx_graph<I>(rows: I) -> (TxGraph, usize)
where
    I: IntoIterator<Item = TxEdge>,
{
    let mut graph = TxGraph::new();
    let mut count = 0usize;
    for row in rows {
        graph.add_tx(&row.src, &row.dst, row.amount);
        count += 1;
    }
    (graph, count)
}

/// Load transaction edges from a delimited file.
///
/// The header row must contain `src` and `dst`; `amount` is optional and
/// defaults to 0.0 when absent or unparsable.
pub fn load_csv(path: &Path) -> RiskResult<Vec<TxEdge>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| RiskError::InvalidInput(format!("Failed to open {}: {}", path.display(), e)))?;

    let headers = reader
        .headers()
        .map_err(|e| RiskError::InvalidInput(format!("Failed to read CSV header: {}", e)))?
        .clone();

    let col = |name: &str| headers.iter().position(|h| h == name);
    let src_idx = col("src");
    let dst_idx = col("dst");
    let amount_idx = col("amount");

    let (src_idx, dst_idx) = match (src_idx, dst_idx) {
        (Some(s), Some(d)) => (s, d),
        _ => {
            let mut missing = Vec::new();
            if src_idx.is_none() {
                missing.push("src");
            }
            if dst_idx.is_none() {
                missing.push("dst");
            }
            return Err(RiskError::InvalidInput(format!(
                "Missing columns: {}",
                missing.join(", ")
            )));
        }
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| RiskError::InvalidInput(format!("Failed to read CSV row: {}", e)))?;
        let src = record.get(src_idx).unwrap_or_default();
        let dst = record.get(dst_idx).unwrap_or_default();
        if src.is_empty() || dst.is_empty() {
            continue;
        }
        let amount = amount_idx
            .and_then(|i| record.get(i))
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);
        rows.push(TxEdge {
            src: src.to_string(),
            dst: dst.to_string(),
            amount,
        });
    }

    Ok(rows)
}

/// Rebuild the graph from the configured source and publish it atomically.
///
/// On failure the previous snapshot stays in place and the handle records the
/// error; readiness is only restored by a later successful rebuild.
pub async fn rebuild(store: &Store, config: &Config, handle: &GraphHandle) -> RiskResult<ReloadStats> {
    let rows = match config.tx_source {
        TxSource::Db => {
            let rows = match store.fetch_all_transactions().await {
                Ok(rows) => rows,
                Err(e) => {
                    let msg = format!("DB not ready/migrated: {}", e);
                    handle.fail(&msg);
                    return Err(RiskError::Storage(msg));
                }
            };
            if rows.is_empty() {
                let msg =
                    "No transactions found in DB. Ingest first, then POST /reload-graph.".to_string();
                handle.fail(&msg);
                return Err(RiskError::InvalidInput(msg));
            }
            rows.into_iter()
                .map(|r| TxEdge {
                    src: r.sender,
                    dst: r.receiver,
                    amount: r.amount,
                })
                .collect()
        }
        TxSource::Csv => match load_csv(Path::new(&config.tx_path)) {
            Ok(rows) => rows,
            Err(e) => {
                handle.fail(&e.to_string());
                return Err(e);
            }
        },
    };

    let (graph, tx_count) = build_tx_graph(rows);
    let illicit = pick_seed_illicit_wallets(&graph, config.illicit_seed_pct, config.illicit_seed);

    let stats = ReloadStats {
        tx_count,
        nodes: graph.node_count(),
        edges: graph.edge_count(),
    };

    metrics::GRAPH_REBUILDS.inc();
    metrics::GRAPH_NODES.set(stats.nodes as f64);
    metrics::GRAPH_EDGES.set(stats.edges as f64);

    info!(
        "graph rebuilt: source={} txs={} nodes={} edges={} illicit={}",
        config.tx_source, tx_count, stats.nodes, stats.edges, illicit.len()
    );

    handle.install(GraphSnapshot {
        graph,
        illicit,
        tx_count,
        source: config.tx_source_descriptor(),
    });

    Ok(stats)
}
