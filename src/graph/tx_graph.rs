/// Transaction Graph - a directed multigraph over wallet identifiers
///
/// Each distinct ordered wallet pair (u, v) is a single edge carrying the
/// aggregated transaction count and total transferred amount. The graph is
/// built once from a transaction snapshot and never mutated afterwards;
/// readers share it through `GraphSnapshot`.
use std::collections::{HashMap, HashSet};

use serde::Serialize;

/// Aggregated attributes of one directed edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EdgeStats {
    pub tx_count: u64,
    pub amount: f64,
}

/// Directed wallet graph using adjacency-map representation.
#[derive(Debug, Clone, Default)]
pub struct TxGraph {
    nodes: HashSet<String>,
    out_edges: HashMap<String, HashMap<String, EdgeStats>>, // src -> dst -> stats
    in_edges: HashMap<String, HashMap<String, EdgeStats>>,  // dst -> src -> stats
}

impl TxGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one transaction, aggregating into the (src, dst) edge.
    pub fn add_tx(&mut self, src: &str, dst: &str, amount: f64) {
        self.nodes.insert(src.to_string());
        self.nodes.insert(dst.to_string());

        let fwd = self
            .out_edges
            .entry(src.to_string())
            .or_default()
            .entry(dst.to_string())
            .or_default();
        fwd.tx_count += 1;
        fwd.amount += amount;

        let rev = self
            .in_edges
            .entry(dst.to_string())
            .or_default()
            .entry(src.to_string())
            .or_default();
        rev.tx_count += 1;
        rev.amount += amount;
    }

    pub fn contains(&self, wallet: &str) -> bool {
        self.nodes.contains(wallet)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of distinct (src, dst) pairs.
    pub fn edge_count(&self) -> usize {
        self.out_edges.values().map(|m| m.len()).sum()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &String> {
        self.nodes.iter()
    }

    /// Node identifiers in lexicographic order. This is the stable ordering
    /// the illicit-seed sampler relies on for reproducibility.
    pub fn sorted_nodes(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.nodes.iter().map(String::as_str).collect();
        out.sort_unstable();
        out
    }

    pub fn out_degree(&self, wallet: &str) -> usize {
        self.out_edges.get(wallet).map(|m| m.len()).unwrap_or(0)
    }

    pub fn in_degree(&self, wallet: &str) -> usize {
        self.in_edges.get(wallet).map(|m| m.len()).unwrap_or(0)
    }

    pub fn degree(&self, wallet: &str) -> usize {
        self.in_degree(wallet) + self.out_degree(wallet)
    }

    pub fn has_edge(&self, src: &str, dst: &str) -> bool {
        self.out_edges
            .get(src)
            .map(|m| m.contains_key(dst))
            .unwrap_or(false)
    }

    pub fn edge(&self, src: &str, dst: &str) -> Option<EdgeStats> {
        self.out_edges.get(src).and_then(|m| m.get(dst)).copied()
    }

    /// Wallets this wallet sent to, with edge attributes.
    pub fn successors(&self, wallet: &str) -> impl Iterator<Item = (&String, &EdgeStats)> {
        self.out_edges.get(wallet).into_iter().flatten()
    }

    /// Wallets that sent to this wallet, with edge attributes.
    pub fn predecessors(&self, wallet: &str) -> impl Iterator<Item = (&String, &EdgeStats)> {
        self.in_edges.get(wallet).into_iter().flatten()
    }

    /// Exposure can arrive through in- or out-flows, so hop traversal treats
    /// the neighborhood as undirected: predecessors ∪ successors.
    pub fn undirected_neighbors<'a>(&'a self, wallet: &str) -> HashSet<&'a str> {
        let mut out: HashSet<&str> = HashSet::new();
        if let Some(succ) = self.out_edges.get(wallet) {
            out.extend(succ.keys().map(String::as_str));
        }
        if let Some(pred) = self.in_edges.get(wallet) {
            out.extend(pred.keys().map(String::as_str));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_aggregation() {
        let mut g = TxGraph::new();
        g.add_tx("W1", "W2", 10.0);
        g.add_tx("W1", "W2", 5.0);
        g.add_tx("W2", "W1", 1.0);

        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 2);

        let e = g.edge("W1", "W2").unwrap();
        assert_eq!(e.tx_count, 2);
        assert!((e.amount - 15.0).abs() < 1e-9);

        assert_eq!(g.in_degree("W1"), 1);
        assert_eq!(g.out_degree("W1"), 1);
    }

    #[test]
    fn test_undirected_neighbors() {
        let mut g = TxGraph::new();
        g.add_tx("A", "B", 1.0);
        g.add_tx("C", "A", 1.0);

        let n = g.undirected_neighbors("A");
        assert_eq!(n.len(), 2);
        assert!(n.contains("B"));
        assert!(n.contains("C"));
    }

    #[test]
    fn test_sorted_nodes_is_stable() {
        let mut g = TxGraph::new();
        g.add_tx("W3", "W1", 1.0);
        g.add_tx("W2", "W3", 1.0);
        assert_eq!(g.sorted_nodes(), vec!["W1", "W2", "W3"]);
    }
}
