/// Wallet subgraph extraction for analyst views
///
/// Selection works hop by hop: the node budget (minus the center) is split
/// equally across non-empty hops, capped at each layer's size, with one
/// redistribution pass for leftover budget. Within a hop, candidates are
/// ranked by an importance score and picked with stratified sampling (top,
/// middle, tail) so the view is not just the highest-ranked wallets.
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::risk::k_hop_layers;
use crate::graph::GraphSnapshot;

#[derive(Debug, Clone)]
pub struct SubgraphParams {
    pub hops: usize,
    pub node_limit: usize,
    pub edge_limit: usize,
    pub min_amount: f64,
    pub only_connected: bool,
}

impl Default for SubgraphParams {
    fn default() -> Self {
        Self {
            hops: 2,
            node_limit: 100,
            edge_limit: 600,
            min_amount: 0.0,
            only_connected: false,
        }
    }
}

impl SubgraphParams {
    /// Clamp every parameter into its documented range.
    pub fn clamped(mut self) -> Self {
        self.hops = self.hops.clamp(1, 4);
        self.node_limit = self.node_limit.clamp(10, 500);
        self.edge_limit = self.edge_limit.clamp(50, 3000);
        self.min_amount = self.min_amount.max(0.0);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubgraphNode {
    pub id: String,
    pub label: String,
    pub hop: usize,
    pub tag: &'static str,
    pub is_illicit: bool,
    pub risk_score: Option<f64>,
    pub in_degree: usize,
    pub out_degree: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubgraphEdge {
    pub source: String,
    pub target: String,
    pub tx_count: u64,
    pub total_amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subgraph {
    pub center: String,
    pub nodes: Vec<SubgraphNode>,
    pub edges: Vec<SubgraphEdge>,
}

/// Importance of a candidate node when the view must be limited. Degree is
/// the primary signal, then risk score, then direct connectivity to the
/// center, with a small bump for known-illicit wallets.
fn node_importance(
    snapshot: &GraphSnapshot,
    node: &str,
    center: &str,
    score_map: &HashMap<String, f64>,
) -> f64 {
    let graph = &snapshot.graph;
    let risk_score = score_map.get(node).copied().unwrap_or(0.0);
    let degree = graph.degree(node) as f64;
    let is_illicit = if snapshot.illicit.contains(node) { 1.0 } else { 0.0 };

    let mut connected_to_center = 0.0;
    if graph.has_edge(node, center) {
        connected_to_center += 2.0;
    }
    if graph.has_edge(center, node) {
        connected_to_center += 2.0;
    }

    (degree / 10.0).min(5.0) * 4.0 + risk_score * 2.0 + connected_to_center + is_illicit * 0.2
}

/// Split the node budget across hops: equal shares capped at layer size,
/// then one pass handing leftover budget to hops with spare capacity.
fn allocate_budget(hop_sizes: &[usize], budget: usize) -> Vec<usize> {
    let mut allocations = vec![0usize; hop_sizes.len()];
    let non_empty = hop_sizes.iter().filter(|&&s| s > 0).count();
    if non_empty == 0 || budget == 0 {
        return allocations;
    }

    let equal_share = budget / non_empty;
    let mut remaining = budget;

    for (alloc, &size) in allocations.iter_mut().zip(hop_sizes) {
        if size == 0 {
            continue;
        }
        *alloc = equal_share.min(size).min(remaining);
        remaining -= *alloc;
    }

    if remaining > 0 {
        for (alloc, &size) in allocations.iter_mut().zip(hop_sizes) {
            if size == 0 || *alloc >= size {
                continue;
            }
            let extra = (size - *alloc).min(remaining);
            *alloc += extra;
            remaining -= extra;
            if remaining == 0 {
                break;
            }
        }
    }

    allocations
}

/// Stratified pick within one ranked hop: top 40%, a 40% window starting a
/// third of the way down, and the remainder from the tail.
fn stratified_pick<'a>(ranked: &[&'a String], allocation: usize) -> Vec<&'a String> {
    if ranked.len() <= allocation {
        return ranked.to_vec();
    }

    let top = (allocation as f64 * 0.4) as usize;
    let mid = (allocation as f64 * 0.4) as usize;
    let bottom = allocation - top - mid;

    let mut picked = Vec::with_capacity(allocation);
    picked.extend(ranked.iter().take(top).copied());

    let mid_start = ranked.len() / 3;
    picked.extend(ranked.iter().skip(mid_start).take(mid).copied());

    if bottom > 0 {
        picked.extend(ranked.iter().skip(ranked.len() - bottom).copied());
    }

    picked
}

/// Extract the analyst view around `center`. Returns `None` when the center
/// wallet is not in the graph. `score_map` carries the latest run's scores
/// for the candidate nodes.
pub fn extract(
    snapshot: &GraphSnapshot,
    center: &str,
    score_map: &HashMap<String, f64>,
    params: &SubgraphParams,
) -> Option<Subgraph> {
    let graph = &snapshot.graph;
    if !graph.contains(center) {
        return None;
    }

    let layers = k_hop_layers(graph, center, params.hops);

    // center is always kept at hop 0
    let mut node_set: HashSet<String> = HashSet::from([center.to_string()]);
    let mut hop_map: HashMap<String, usize> = HashMap::from([(center.to_string(), 0)]);

    let budget = params.node_limit.saturating_sub(1);
    let hop_sizes: Vec<usize> = layers.iter().skip(1).map(HashSet::len).collect();
    let allocations = allocate_budget(&hop_sizes, budget);

    for (idx, &allocation) in allocations.iter().enumerate() {
        if allocation == 0 {
            continue;
        }
        let hop = idx + 1;
        let layer = &layers[hop];

        let mut ranked: Vec<&String> = layer.iter().collect();
        ranked.sort_by(|a, b| {
            let ia = node_importance(snapshot, a, center, score_map);
            let ib = node_importance(snapshot, b, center, score_map);
            ib.total_cmp(&ia).then(a.cmp(b))
        });

        for node in stratified_pick(&ranked, allocation) {
            if node_set.insert(node.clone()) {
                hop_map.insert(node.clone(), hop);
            }
        }
    }

    // induced edges over the chosen node set, aggregated attributes
    let mut edges: Vec<SubgraphEdge> = Vec::new();
    for source in &node_set {
        for (target, stats) in graph.successors(source) {
            if !node_set.contains(target) || stats.amount < params.min_amount {
                continue;
            }
            edges.push(SubgraphEdge {
                source: source.clone(),
                target: target.clone(),
                tx_count: stats.tx_count,
                total_amount: stats.amount,
            });
        }
    }

    // merge any duplicate (source, target) pairs before limiting
    let mut merged: HashMap<(String, String), SubgraphEdge> = HashMap::new();
    for edge in edges {
        merged
            .entry((edge.source.clone(), edge.target.clone()))
            .and_modify(|e| {
                e.tx_count += edge.tx_count;
                e.total_amount += edge.total_amount;
            })
            .or_insert(edge);
    }
    let mut edges: Vec<SubgraphEdge> = merged.into_values().collect();
    edges.sort_by(|a, b| {
        b.total_amount
            .total_cmp(&a.total_amount)
            .then_with(|| (a.source.as_str(), a.target.as_str()).cmp(&(b.source.as_str(), b.target.as_str())))
    });
    edges.truncate(params.edge_limit);

    if params.only_connected {
        let mut touched: HashSet<&str> = HashSet::new();
        for edge in &edges {
            touched.insert(&edge.source);
            touched.insert(&edge.target);
        }
        node_set.retain(|n| n == center || touched.contains(n.as_str()));
    }

    let mut nodes: Vec<SubgraphNode> = node_set
        .iter()
        .map(|n| {
            let tag = if n == center {
                "center"
            } else if snapshot.illicit.contains(n) {
                "illicit"
            } else {
                "neighbor"
            };
            SubgraphNode {
                id: n.clone(),
                label: n.clone(),
                hop: hop_map.get(n).copied().unwrap_or(usize::MAX),
                tag,
                is_illicit: snapshot.illicit.contains(n),
                risk_score: score_map.get(n).copied(),
                in_degree: graph.in_degree(n),
                out_degree: graph.out_degree(n),
            }
        })
        .collect();
    nodes.sort_by(|a, b| a.hop.cmp(&b.hop).then_with(|| a.id.cmp(&b.id)));

    Some(Subgraph {
        center: center.to_string(),
        nodes,
        edges,
    })
}
