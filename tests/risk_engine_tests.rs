//! End-to-end engine scenarios over the public library API: CSV source to
//! graph to scores to explainability, without a database in the loop.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use riskgraph::engine::{
    explain_wallet_risk, k_hop_exposure, k_hop_layers, risk_score_wallet, subgraph, RiskConfig,
    SubgraphParams,
};
use riskgraph::graph::{build_tx_graph, load_csv, pick_seed_illicit_wallets, GraphSnapshot, TxEdge};

const EPS: f64 = 1e-9;

fn edges(pairs: &[(&str, &str, f64)]) -> Vec<TxEdge> {
    pairs
        .iter()
        .map(|(s, d, a)| TxEdge {
            src: s.to_string(),
            dst: d.to_string(),
            amount: *a,
        })
        .collect()
}

#[test]
fn linear_chain_scoring_end_to_end() {
    // W1 -> W2 -> W3, W3 known illicit, no degree normalization
    let (graph, tx_count) = build_tx_graph(edges(&[("W1", "W2", 10.0), ("W2", "W3", 5.0)]));
    assert_eq!(tx_count, 2);

    let illicit: HashSet<String> = HashSet::from(["W3".to_string()]);
    let cfg = RiskConfig {
        hop_weights: vec![1.0, 0.6, 0.3],
        degree_normalize: false,
        illicit_seed_pct: 0.05,
    };

    // the wallet one hop from the seed accumulates 0.6 + 0.3
    let adjacent = risk_score_wallet(&graph, "W2", &illicit, &cfg).unwrap();
    assert!((adjacent.risk_score - 0.9).abs() < EPS);
    let counts: Vec<usize> = adjacent.exposures.iter().map(|e| e.illicit_count).collect();
    assert_eq!(counts, vec![0, 1, 1]);

    // two hops away only the last weight applies
    let distal = risk_score_wallet(&graph, "W1", &illicit, &cfg).unwrap();
    assert!((distal.risk_score - 0.3).abs() < EPS);

    // exact-hop explanation of the distal wallet: everything sits at hop 2
    let explanation = explain_wallet_risk(&graph, "W1", &illicit, &cfg, None, 15, 50).unwrap();
    assert!((explanation.hop_breakdown[0].contribution).abs() < EPS);
    assert!((explanation.hop_breakdown[1].contribution).abs() < EPS);
    assert!((explanation.hop_breakdown[2].contribution - 0.3).abs() < EPS);
    assert!((explanation.explain_score - 0.3).abs() < EPS);
}

#[test]
fn csv_to_subgraph_pipeline() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "tx_id,timestamp,src,dst,amount").unwrap();
    for i in 0..20 {
        let line = format!("T{i:04},2024-05-01T10:00:{:02},C,N{i:02},{}", i % 60, i + 1);
        writeln!(file, "{line}").unwrap();
    }
    writeln!(file, "T9999,2024-05-01T11:00:00,N00,X,7.5").unwrap();
    file.flush().unwrap();

    let rows = load_csv(file.path()).unwrap();
    let (graph, tx_count) = build_tx_graph(rows);
    assert_eq!(tx_count, 21);
    assert_eq!(graph.node_count(), 22); // C, N00..N19, X

    let illicit = pick_seed_illicit_wallets(&graph, 0.05, 42);
    assert_eq!(illicit.len(), 1);

    let snapshot = GraphSnapshot {
        graph,
        illicit,
        tx_count,
        source: "csv:test".to_string(),
    };

    let view = subgraph::extract(
        &snapshot,
        "C",
        &HashMap::new(),
        &SubgraphParams::default().clamped(),
    )
    .unwrap();

    assert_eq!(view.center, "C");
    let ids: HashSet<&str> = view.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &view.edges {
        assert!(ids.contains(edge.source.as_str()));
        assert!(ids.contains(edge.target.as_str()));
    }
    // X is 2 undirected hops from C (through N00)
    assert!(view.nodes.iter().any(|n| n.id == "X" && n.hop == 2));
}

#[test]
fn scoring_pipeline_is_deterministic() {
    let pairs: Vec<(String, String)> = (0..200)
        .map(|i| (format!("W{:03}", i % 50), format!("W{:03}", (i * 7 + 3) % 50)))
        .collect();

    let score_all = || {
        let (graph, _) = build_tx_graph(pairs.iter().map(|(s, d)| TxEdge {
            src: s.clone(),
            dst: d.clone(),
            amount: 1.0,
        }));
        let illicit = pick_seed_illicit_wallets(&graph, 0.05, 42);
        let cfg = RiskConfig::default();

        let mut scores: Vec<(String, f64)> = graph
            .nodes()
            .map(|w| {
                let r = risk_score_wallet(&graph, w, &illicit, &cfg).unwrap();
                (r.wallet, r.risk_score)
            })
            .collect();
        scores.sort_by(|a, b| a.0.cmp(&b.0));
        scores
    };

    assert_eq!(score_all(), score_all());
}

#[test]
fn cumulative_exposure_dominates_exact_hop_sum() {
    let (graph, _) = build_tx_graph(edges(&[
        ("A", "B", 1.0),
        ("B", "C", 1.0),
        ("C", "D", 1.0),
        ("D", "A", 1.0),
        ("B", "E", 2.0),
    ]));
    let illicit: HashSet<String> = ["C", "E"].iter().map(|s| s.to_string()).collect();
    let cfg = RiskConfig::default();

    for wallet in ["A", "B", "C", "D", "E"] {
        let stored = risk_score_wallet(&graph, wallet, &illicit, &cfg).unwrap();
        let explained = explain_wallet_risk(&graph, wallet, &illicit, &cfg, None, 15, 50).unwrap();
        assert!(explained.explain_score <= stored.risk_score + EPS);

        // stored exposures are cumulative: monotone non-decreasing per hop
        let mut prev = 0;
        for e in &stored.exposures {
            assert!(e.illicit_count >= prev);
            prev = e.illicit_count;
        }
    }
}

#[test]
fn layers_partition_the_reachable_set() {
    let (graph, _) = build_tx_graph(edges(&[
        ("A", "B", 1.0),
        ("B", "C", 1.0),
        ("C", "D", 1.0),
        ("Z1", "Z2", 1.0), // disconnected component
    ]));

    let layers = k_hop_layers(&graph, "A", 4);
    assert_eq!(layers.len(), 5);

    let mut seen: HashSet<String> = HashSet::new();
    for layer in &layers {
        for node in layer {
            assert!(seen.insert(node.clone()));
        }
    }
    // the disconnected component never shows up
    assert_eq!(
        seen,
        ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect()
    );

    // exposure within k hops equals illicit mass of the layer prefix
    let illicit: HashSet<String> = HashSet::from(["D".to_string()]);
    for k in 0..=4usize {
        let expected: usize = layers
            .iter()
            .take(k + 1)
            .flatten()
            .filter(|n| illicit.contains(*n))
            .count();
        assert_eq!(k_hop_exposure(&graph, "A", &illicit, k), expected);
    }
}
