use lazy_static::lazy_static;
/// Prometheus metrics
/// Ingestion, graph and scoring observability
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Registry, TextEncoder};

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // === Ingestion Metrics ===

    /// Records pulled off the bus
    pub static ref RECORDS_RECEIVED: Counter = Counter::new(
        "consumer_records_received_total",
        "Total bus records received"
    ).unwrap();

    /// Rows actually inserted (post-dedupe)
    pub static ref RECORDS_INSERTED: Counter = Counter::new(
        "consumer_records_inserted_total",
        "Total transactions inserted"
    ).unwrap();

    /// Poison records dropped during normalization
    pub static ref RECORDS_SKIPPED: Counter = Counter::new(
        "consumer_records_skipped_total",
        "Total records skipped as unnormalizable"
    ).unwrap();

    /// Failed flushes (offsets unadvanced, batch retried)
    pub static ref FLUSH_ERRORS: Counter = Counter::new(
        "consumer_flush_errors_total",
        "Total failed batch flushes"
    ).unwrap();

    // === Graph Metrics ===

    /// Graph rebuilds
    pub static ref GRAPH_REBUILDS: Counter = Counter::new(
        "graph_rebuilds_total",
        "Total graph rebuilds"
    ).unwrap();

    /// Nodes in the current graph snapshot
    pub static ref GRAPH_NODES: Gauge = Gauge::new(
        "graph_nodes",
        "Nodes in the current graph snapshot"
    ).unwrap();

    /// Edges in the current graph snapshot
    pub static ref GRAPH_EDGES: Gauge = Gauge::new(
        "graph_edges",
        "Edges in the current graph snapshot"
    ).unwrap();

    // === Scoring Metrics ===

    /// Completed scoring runs
    pub static ref SCORING_RUNS: Counter = Counter::new(
        "scoring_runs_total",
        "Total completed scoring runs"
    ).unwrap();

    /// Scoring run duration
    pub static ref SCORING_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("scoring_duration_seconds", "Scoring run duration")
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0])
    ).unwrap();

    /// Wallets scored in the latest run
    pub static ref WALLETS_SCORED: Gauge = Gauge::new(
        "wallets_scored",
        "Wallets scored in the latest run"
    ).unwrap();
}

/// Initialize metrics registry
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(RECORDS_RECEIVED.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(RECORDS_INSERTED.clone()))
        .unwrap();
    REGISTRY
        .register(Box::new(RECORDS_SKIPPED.clone()))
        .unwrap();
    REGISTRY.register(Box::new(FLUSH_ERRORS.clone())).unwrap();

    REGISTRY.register(Box::new(GRAPH_REBUILDS.clone())).unwrap();
    REGISTRY.register(Box::new(GRAPH_NODES.clone())).unwrap();
    REGISTRY.register(Box::new(GRAPH_EDGES.clone())).unwrap();

    REGISTRY.register(Box::new(SCORING_RUNS.clone())).unwrap();
    REGISTRY
        .register(Box::new(SCORING_DURATION.clone()))
        .unwrap();
    REGISTRY.register(Box::new(WALLETS_SCORED.clone())).unwrap();
}

/// Get metrics in Prometheus format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
