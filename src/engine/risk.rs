/// Risk engine - k-hop exposure scoring and explainability
///
/// A wallet's exposure at hop k is the number of known-illicit wallets
/// within k undirected hops (cumulative). The stored score weights those
/// cumulative counts per hop; the explainability decomposition re-walks the
/// same neighborhood but attributes weight to the hop where each illicit
/// wallet is first reached (exact-hop). The two therefore differ and both
/// are surfaced to callers.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::graph::TxGraph;

fn default_seed_pct() -> f64 {
    0.05
}

/// Scoring parameters captured in each run's `config_json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Weight applied to the cumulative exposure at each hop, index = hop.
    pub hop_weights: Vec<f64>,
    /// Divide by sqrt(total degree) to damp huge-wallet bias.
    pub degree_normalize: bool,
    #[serde(default = "default_seed_pct")]
    pub illicit_seed_pct: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            hop_weights: vec![1.0, 0.6, 0.3],
            degree_normalize: true,
            illicit_seed_pct: 0.05,
        }
    }
}

/// Cumulative exposure at one hop, persisted in `exposures_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopExposure {
    pub hop: usize,
    pub weight: f64,
    pub illicit_count: usize,
}

/// Scored wallet as produced by `risk_score_wallet`.
#[derive(Debug, Clone, Serialize)]
pub struct WalletRisk {
    pub wallet: String,
    pub risk_score: f64,
    pub exposures: Vec<HopExposure>,
    pub in_degree: usize,
    pub out_degree: usize,
}

/// One hop row of the explainability breakdown (exact-hop semantics).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HopBreakdown {
    pub hop: usize,
    pub weight: f64,
    pub illicit_count_exact: usize,
    pub contribution: f64,
    pub illicit_wallets_sample: Vec<String>,
    pub sample_truncated: bool,
}

/// One illicit wallet's contribution at its exact hop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contributor {
    pub wallet: String,
    pub hop: usize,
    pub weight: f64,
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RiskExplanation {
    pub wallet: String,
    pub in_degree: usize,
    pub out_degree: usize,
    pub degree_normalize: bool,
    pub normalization_factor: f64,
    pub hop_breakdown: Vec<HopBreakdown>,
    pub top_contributors: Vec<Contributor>,
    pub explain_score: f64,
}

/// Round at a result boundary; internal sums stay unrounded.
pub fn round6(x: f64) -> f64 {
    (x * 1_000_000.0).round() / 1_000_000.0
}

/// Count illicit wallets reachable within k undirected hops of `node`,
/// including the node itself. `k = 0` is membership of the node alone.
pub fn k_hop_exposure(graph: &TxGraph, node: &str, illicit: &HashSet<String>, k: usize) -> usize {
    if k == 0 {
        return usize::from(illicit.contains(node));
    }

    let mut visited: HashSet<&str> = HashSet::from([node]);
    let mut frontier: HashSet<&str> = HashSet::from([node]);

    for _ in 0..k {
        let mut next: HashSet<&str> = HashSet::new();
        for n in &frontier {
            next.extend(graph.undirected_neighbors(n));
        }
        next.retain(|n| !visited.contains(n));
        visited.extend(next.iter().copied());
        frontier = next;
        if frontier.is_empty() {
            break;
        }
    }

    visited.iter().filter(|n| illicit.contains(**n)).count()
}

/// Exact-hop layers around `start`: `layers[h]` holds the nodes first
/// reached at undirected hop h, `layers[0] = {start}`. Returns an empty
/// vector when the wallet is not in the graph; always `max_hops + 1` layers
/// otherwise (trailing layers may be empty).
pub fn k_hop_layers(graph: &TxGraph, start: &str, max_hops: usize) -> Vec<HashSet<String>> {
    if !graph.contains(start) {
        return Vec::new();
    }

    let mut layers: Vec<HashSet<String>> = vec![HashSet::from([start.to_string()])];
    let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
    let mut frontier: HashSet<String> = HashSet::from([start.to_string()]);

    for _ in 1..=max_hops {
        let mut next: HashSet<String> = HashSet::new();
        for n in &frontier {
            for neighbor in graph.undirected_neighbors(n) {
                if !visited.contains(neighbor) {
                    next.insert(neighbor.to_string());
                }
            }
        }
        visited.extend(next.iter().cloned());
        layers.push(next.clone());
        frontier = next;
    }

    layers
}

/// Score one wallet. Returns `None` when the wallet is not in the graph;
/// callers surface that as `{risk_score: 0.0, reason: "wallet_not_in_graph"}`.
pub fn risk_score_wallet(
    graph: &TxGraph,
    wallet: &str,
    illicit: &HashSet<String>,
    cfg: &RiskConfig,
) -> Option<WalletRisk> {
    if !graph.contains(wallet) {
        return None;
    }

    let exposures: Vec<HopExposure> = cfg
        .hop_weights
        .iter()
        .enumerate()
        .map(|(hop, &weight)| HopExposure {
            hop,
            weight,
            illicit_count: k_hop_exposure(graph, wallet, illicit, hop),
        })
        .collect();

    let mut raw: f64 = exposures
        .iter()
        .map(|e| e.weight * e.illicit_count as f64)
        .sum();

    let in_degree = graph.in_degree(wallet);
    let out_degree = graph.out_degree(wallet);

    if cfg.degree_normalize {
        let deg = (in_degree + out_degree).max(1);
        raw /= (deg as f64).sqrt();
    }

    Some(WalletRisk {
        wallet: wallet.to_string(),
        risk_score: round6(raw),
        exposures,
        in_degree,
        out_degree,
    })
}

/// Explain a wallet's score with exact-hop attribution.
///
/// `max_hops` defaults to the last configured hop and is clamped into the
/// configured weight range. Returns `None` when the wallet is not in the
/// graph.
pub fn explain_wallet_risk(
    graph: &TxGraph,
    wallet: &str,
    illicit: &HashSet<String>,
    cfg: &RiskConfig,
    max_hops: Option<usize>,
    per_hop_limit: usize,
    total_limit: usize,
) -> Option<RiskExplanation> {
    if !graph.contains(wallet) || cfg.hop_weights.is_empty() {
        return None;
    }

    let last_hop = cfg.hop_weights.len() - 1;
    let max_hops = max_hops.unwrap_or(last_hop).min(last_hop);

    let layers = k_hop_layers(graph, wallet, max_hops);

    let in_degree = graph.in_degree(wallet);
    let out_degree = graph.out_degree(wallet);
    let deg = (in_degree + out_degree).max(1);
    let norm = if cfg.degree_normalize {
        (deg as f64).sqrt()
    } else {
        1.0
    };

    let mut hop_breakdown = Vec::with_capacity(max_hops + 1);
    let mut contributors = Vec::new();

    for hop in 0..=max_hops {
        let empty = HashSet::new();
        let layer = layers.get(hop).unwrap_or(&empty);
        let mut illicit_here: Vec<&String> = layer.iter().filter(|n| illicit.contains(*n)).collect();
        illicit_here.sort();

        let weight = cfg.hop_weights[hop];
        let hop_contribution = (weight * illicit_here.len() as f64) / norm;
        let per_wallet = weight / norm;

        hop_breakdown.push(HopBreakdown {
            hop,
            weight,
            illicit_count_exact: illicit_here.len(),
            contribution: round6(hop_contribution),
            illicit_wallets_sample: illicit_here
                .iter()
                .take(per_hop_limit)
                .map(|s| s.to_string())
                .collect(),
            sample_truncated: illicit_here.len() > per_hop_limit,
        });

        for n in &illicit_here {
            contributors.push(Contributor {
                wallet: (*n).clone(),
                hop,
                weight,
                contribution: round6(per_wallet),
            });
        }
    }

    contributors.sort_by(|a, b| {
        b.contribution
            .total_cmp(&a.contribution)
            .then(a.hop.cmp(&b.hop))
            .then(a.wallet.cmp(&b.wallet))
    });
    contributors.truncate(total_limit);

    let explain_score: f64 = hop_breakdown.iter().map(|h| h.contribution).sum();

    Some(RiskExplanation {
        wallet: wallet.to_string(),
        in_degree,
        out_degree,
        degree_normalize: cfg.degree_normalize,
        normalization_factor: round6(norm),
        hop_breakdown,
        top_contributors: contributors,
        explain_score: round6(explain_score),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    /// W1 -> W2 -> W3 with W3 illicit.
    fn chain() -> (TxGraph, HashSet<String>) {
        let mut g = TxGraph::new();
        g.add_tx("W1", "W2", 10.0);
        g.add_tx("W2", "W3", 5.0);
        (g, HashSet::from(["W3".to_string()]))
    }

    fn flat_cfg() -> RiskConfig {
        RiskConfig {
            hop_weights: vec![1.0, 0.6, 0.3],
            degree_normalize: false,
            illicit_seed_pct: 0.05,
        }
    }

    #[test]
    fn test_zero_hop_exposure_is_membership() {
        let (g, illicit) = chain();
        assert_eq!(k_hop_exposure(&g, "W3", &illicit, 0), 1);
        assert_eq!(k_hop_exposure(&g, "W1", &illicit, 0), 0);
    }

    #[test]
    fn test_exposure_is_monotone_in_k() {
        let (g, illicit) = chain();
        let mut prev = 0;
        for k in 0..5 {
            let e = k_hop_exposure(&g, "W1", &illicit, k);
            assert!(e >= prev, "exposure must not decrease with k");
            prev = e;
        }
        // W3 first becomes visible 2 undirected hops from W1
        assert_eq!(k_hop_exposure(&g, "W1", &illicit, 1), 0);
        assert_eq!(k_hop_exposure(&g, "W1", &illicit, 2), 1);
    }

    #[test]
    fn test_chain_scores() {
        let (g, illicit) = chain();
        let cfg = flat_cfg();

        // adjacent wallet: cumulative exposures (0, 1, 1)
        let r = risk_score_wallet(&g, "W2", &illicit, &cfg).unwrap();
        assert!((r.risk_score - 0.9).abs() < EPS);
        assert_eq!(
            r.exposures.iter().map(|e| e.illicit_count).collect::<Vec<_>>(),
            vec![0, 1, 1]
        );

        // two hops out: cumulative exposures (0, 0, 1)
        let r = risk_score_wallet(&g, "W1", &illicit, &cfg).unwrap();
        assert!((r.risk_score - 0.3).abs() < EPS);
    }

    #[test]
    fn test_degree_normalization() {
        let (g, illicit) = chain();
        let mut cfg = flat_cfg();
        cfg.degree_normalize = true;

        // W2 has degree 2 (one in, one out)
        let r = risk_score_wallet(&g, "W2", &illicit, &cfg).unwrap();
        assert!((r.risk_score - round6(0.9 / 2f64.sqrt())).abs() < EPS);
        assert_eq!(r.in_degree, 1);
        assert_eq!(r.out_degree, 1);
    }

    #[test]
    fn test_wallet_not_in_graph() {
        let (g, illicit) = chain();
        assert!(risk_score_wallet(&g, "W999", &illicit, &flat_cfg()).is_none());
        assert!(explain_wallet_risk(&g, "W999", &illicit, &flat_cfg(), None, 15, 50).is_none());
    }

    #[test]
    fn test_layers_are_disjoint_and_cover_reachable() {
        let mut g = TxGraph::new();
        // diamond plus a tail: A->B, A->C, B->D, C->D, D->E
        for (s, d) in [("A", "B"), ("A", "C"), ("B", "D"), ("C", "D"), ("D", "E")] {
            g.add_tx(s, d, 1.0);
        }

        let layers = k_hop_layers(&g, "A", 3);
        assert_eq!(layers.len(), 4);
        assert_eq!(layers[0], HashSet::from(["A".to_string()]));
        assert_eq!(layers[1].len(), 2); // B, C
        assert_eq!(layers[2], HashSet::from(["D".to_string()]));
        assert_eq!(layers[3], HashSet::from(["E".to_string()]));

        // pairwise disjoint, union = reachable set
        let mut seen = HashSet::new();
        for layer in &layers {
            for n in layer {
                assert!(seen.insert(n.clone()), "node {n} appears in two layers");
            }
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_layers_pad_after_frontier_empties() {
        let (g, _) = chain();
        let layers = k_hop_layers(&g, "W1", 4);
        assert_eq!(layers.len(), 5);
        assert!(layers[3].is_empty());
        assert!(layers[4].is_empty());
    }

    #[test]
    fn test_explain_exact_hop_attribution() {
        let (g, illicit) = chain();
        let explanation =
            explain_wallet_risk(&g, "W1", &illicit, &flat_cfg(), None, 15, 50).unwrap();

        // W3 sits at exactly hop 2 from W1; hops 0 and 1 contribute nothing
        assert!((explanation.hop_breakdown[0].contribution).abs() < EPS);
        assert!((explanation.hop_breakdown[1].contribution).abs() < EPS);
        assert!((explanation.hop_breakdown[2].contribution - 0.3).abs() < EPS);
        assert!((explanation.explain_score - 0.3).abs() < EPS);

        assert_eq!(explanation.top_contributors.len(), 1);
        let top = &explanation.top_contributors[0];
        assert_eq!(top.wallet, "W3");
        assert_eq!(top.hop, 2);
        assert!((top.contribution - 0.3).abs() < EPS);
    }

    #[test]
    fn test_explain_score_never_exceeds_cumulative_score() {
        let mut g = TxGraph::new();
        for (s, d) in [("A", "B"), ("B", "C"), ("C", "A"), ("B", "D"), ("D", "E")] {
            g.add_tx(s, d, 1.0);
        }
        let illicit: HashSet<String> = ["B", "E"].iter().map(|s| s.to_string()).collect();

        for normalize in [false, true] {
            let cfg = RiskConfig {
                degree_normalize: normalize,
                ..RiskConfig::default()
            };
            for wallet in ["A", "B", "C", "D", "E"] {
                let stored = risk_score_wallet(&g, wallet, &illicit, &cfg).unwrap();
                let explained =
                    explain_wallet_risk(&g, wallet, &illicit, &cfg, None, 15, 50).unwrap();
                assert!(
                    explained.explain_score <= stored.risk_score + EPS,
                    "exact-hop sum exceeded cumulative score for {wallet}"
                );
            }
        }
    }

    #[test]
    fn test_explain_is_deterministic() {
        let mut g = TxGraph::new();
        for i in 0..40 {
            g.add_tx(&format!("W{:02}", i % 10), &format!("W{:02}", (i + 3) % 10), 1.0);
        }
        let illicit: HashSet<String> =
            ["W01", "W04", "W07"].iter().map(|s| s.to_string()).collect();
        let cfg = RiskConfig::default();

        let a = explain_wallet_risk(&g, "W00", &illicit, &cfg, Some(2), 15, 50).unwrap();
        let b = explain_wallet_risk(&g, "W00", &illicit, &cfg, Some(2), 15, 50).unwrap();

        assert_eq!(
            serde_json::to_string(&a.hop_breakdown).unwrap(),
            serde_json::to_string(&b.hop_breakdown).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&a.top_contributors).unwrap(),
            serde_json::to_string(&b.top_contributors).unwrap()
        );
    }

    #[test]
    fn test_explain_clamps_max_hops() {
        let (g, illicit) = chain();
        let explanation =
            explain_wallet_risk(&g, "W1", &illicit, &flat_cfg(), Some(99), 15, 50).unwrap();
        // clamped to the configured weights: hops 0..=2
        assert_eq!(explanation.hop_breakdown.len(), 3);
    }

    #[test]
    fn test_explain_sample_truncation() {
        let mut g = TxGraph::new();
        let mut illicit = HashSet::new();
        for i in 0..10 {
            let n = format!("X{i}");
            g.add_tx("C", &n, 1.0);
            illicit.insert(n);
        }

        let explanation =
            explain_wallet_risk(&g, "C", &illicit, &flat_cfg(), Some(1), 3, 50).unwrap();
        let hop1 = &explanation.hop_breakdown[1];
        assert_eq!(hop1.illicit_count_exact, 10);
        assert_eq!(hop1.illicit_wallets_sample.len(), 3);
        assert!(hop1.sample_truncated);
        // sample is the sorted head of the layer
        assert_eq!(hop1.illicit_wallets_sample, vec!["X0", "X1", "X2"]);
    }
}
