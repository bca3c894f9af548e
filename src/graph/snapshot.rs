/// Graph snapshot publication
///
/// The graph and illicit set are published together as one immutable
/// snapshot behind an atomically-swappable handle. Readers capture the
/// current `Arc<GraphSnapshot>` at call entry and keep using it even if a
/// rebuild swaps in a new one mid-request; the old snapshot is dropped when
/// the last reader releases it.
use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::core::{RiskError, RiskResult};

use super::tx_graph::TxGraph;

#[derive(Debug)]
pub struct GraphSnapshot {
    pub graph: TxGraph,
    pub illicit: HashSet<String>,
    pub tx_count: usize,
    /// Descriptor of where the transactions came from, e.g. "db:transactions".
    pub source: String,
}

#[derive(Debug, Default)]
struct GraphState {
    snapshot: Option<Arc<GraphSnapshot>>,
    error: Option<String>,
    ready: bool,
}

/// Process-wide handle to the current snapshot. Only the rebuild path writes;
/// a failed rebuild keeps the previous snapshot but clears readiness until a
/// later rebuild succeeds.
#[derive(Debug, Default)]
pub struct GraphHandle {
    state: ArcSwap<GraphState>,
}

impl GraphHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, snapshot: GraphSnapshot) {
        self.state.store(Arc::new(GraphState {
            snapshot: Some(Arc::new(snapshot)),
            error: None,
            ready: true,
        }));
    }

    pub fn fail(&self, message: &str) {
        let prev = self.state.load();
        self.state.store(Arc::new(GraphState {
            snapshot: prev.snapshot.clone(),
            error: Some(message.to_string()),
            ready: false,
        }));
    }

    pub fn ready(&self) -> bool {
        self.state.load().ready
    }

    pub fn error(&self) -> Option<String> {
        self.state.load().error.clone()
    }

    /// Current snapshot regardless of readiness (may be a stale one kept
    /// after a failed rebuild).
    pub fn snapshot(&self) -> Option<Arc<GraphSnapshot>> {
        self.state.load().snapshot.clone()
    }

    /// Snapshot for serving: fails with `NotReady` unless the last rebuild
    /// succeeded.
    pub fn ready_snapshot(&self) -> RiskResult<Arc<GraphSnapshot>> {
        let state = self.state.load();
        match (&state.snapshot, state.ready) {
            (Some(snapshot), true) => Ok(Arc::clone(snapshot)),
            _ => Err(RiskError::NotReady(format!(
                "Graph not ready: {}",
                state.error.as_deref().unwrap_or("graph not loaded")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_nodes() -> GraphSnapshot {
        let mut graph = TxGraph::new();
        graph.add_tx("A", "B", 1.0);
        GraphSnapshot {
            graph,
            illicit: HashSet::new(),
            tx_count: 1,
            source: "csv:test".to_string(),
        }
    }

    #[test]
    fn test_handle_starts_not_ready() {
        let handle = GraphHandle::new();
        assert!(!handle.ready());
        assert!(handle.snapshot().is_none());
        assert!(handle.ready_snapshot().is_err());
    }

    #[test]
    fn test_install_publishes_and_clears_error() {
        let handle = GraphHandle::new();
        handle.fail("no transactions found");
        assert_eq!(handle.error().as_deref(), Some("no transactions found"));

        handle.install(snapshot_with_nodes());
        assert!(handle.ready());
        assert!(handle.error().is_none());
        assert_eq!(handle.ready_snapshot().unwrap().tx_count, 1);
    }

    #[test]
    fn test_failed_rebuild_keeps_old_snapshot() {
        let handle = GraphHandle::new();
        handle.install(snapshot_with_nodes());

        // readers holding the old Arc keep it across the swap
        let captured = handle.snapshot().unwrap();

        handle.fail("DB went away");
        assert!(!handle.ready());
        assert!(handle.ready_snapshot().is_err());
        // the stale snapshot is still reachable for in-flight work
        assert!(handle.snapshot().is_some());
        assert_eq!(captured.tx_count, 1);
    }
}
