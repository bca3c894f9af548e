/// Scoring run driver
///
/// One call scores every wallet in the captured snapshot and persists the
/// run atomically. A second concurrent request fails fast with `Busy`; the
/// guard is released when the run finishes either way.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::info;

use super::risk::{risk_score_wallet, RiskConfig};
use crate::core::{RiskError, RiskResult};
use crate::graph::GraphSnapshot;
use crate::metrics;
use crate::storage::{ScoreRow, Store};

#[derive(Debug, Clone, serde::Serialize)]
pub struct RunOutcome {
    pub run_id: i64,
    pub wallets_scored: usize,
}

#[derive(Debug, Default)]
pub struct ScoringEngine {
    busy: AtomicBool,
}

impl ScoringEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run_score(
        &self,
        store: &Store,
        snapshot: &GraphSnapshot,
        cfg: &RiskConfig,
        tx_source: &str,
    ) -> RiskResult<RunOutcome> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(RiskError::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let started = Instant::now();
        let mut rows = Vec::with_capacity(snapshot.graph.node_count());

        for wallet in snapshot.graph.nodes() {
            // every iterated wallet is a graph node, so scoring cannot miss
            let Some(scored) = risk_score_wallet(&snapshot.graph, wallet, &snapshot.illicit, cfg)
            else {
                continue;
            };
            let exposures_json = serde_json::to_string(&scored.exposures)
                .map_err(|e| RiskError::Unknown(format!("Failed to serialize exposures: {}", e)))?;
            rows.push(ScoreRow {
                wallet: scored.wallet,
                risk_score: scored.risk_score,
                exposures_json,
                in_degree: scored.in_degree as i32,
                out_degree: scored.out_degree as i32,
            });
        }

        let config_json = serde_json::to_value(cfg)
            .map_err(|e| RiskError::Unknown(format!("Failed to serialize config: {}", e)))?;

        let run_id = store
            .insert_run_with_scores(tx_source, &config_json, &rows)
            .await?;

        metrics::SCORING_RUNS.inc();
        metrics::SCORING_DURATION.observe(started.elapsed().as_secs_f64());
        metrics::WALLETS_SCORED.set(rows.len() as f64);

        info!(
            "scoring run {} complete: {} wallets in {:.2}s",
            run_id,
            rows.len(),
            started.elapsed().as_secs_f64()
        );

        Ok(RunOutcome {
            run_id,
            wallets_scored: rows.len(),
        })
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_guard_releases_flag() {
        let engine = ScoringEngine::new();
        assert!(!engine.busy.swap(true, Ordering::SeqCst));
        {
            let _guard = BusyGuard(&engine.busy);
        }
        assert!(!engine.busy.load(Ordering::SeqCst));
    }

    #[test]
    fn test_second_claim_fails_until_released() {
        let engine = ScoringEngine::new();
        assert!(!engine.busy.swap(true, Ordering::SeqCst));
        // a second run_score would observe the flag and bail with Busy
        assert!(engine.busy.swap(true, Ordering::SeqCst));
        engine.busy.store(false, Ordering::SeqCst);
        assert!(!engine.busy.swap(true, Ordering::SeqCst));
    }
}
