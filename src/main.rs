use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use riskgraph::api::{self, ApiState};
use riskgraph::consumer::{ConsumerSettings, TxConsumer};
use riskgraph::core::{Config, TxSource};
use riskgraph::engine::{RiskConfig, ScoringEngine};
use riskgraph::graph::{self, GraphHandle};
use riskgraph::metrics;
use riskgraph::storage::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("riskgraph - wallet risk scoring platform");

    metrics::init_metrics();

    let config = Config::from_env();
    info!(
        "tx_source={} database={} kafka={}",
        config.tx_source, config.database_url, config.kafka_bootstrap_servers
    );

    let store = match Store::connect(&config.database_url).await {
        Ok(store) => {
            if let Err(e) = store.init_schema().await {
                warn!("schema initialization warning: {}", e);
            }
            Arc::new(store)
        }
        Err(e) => {
            error!("failed to connect to PostgreSQL at {}: {}", config.database_url, e);
            return Err(anyhow::anyhow!("Database connection failed"));
        }
    };

    let graph_handle = Arc::new(GraphHandle::new());

    // first build; an empty DB source just leaves the handle not-ready until
    // ingestion catches up and someone calls POST /reload-graph
    match graph::rebuild(&store, &config, &graph_handle).await {
        Ok(stats) => info!(
            "graph loaded: {} nodes, {} edges from {} transactions",
            stats.nodes, stats.edges, stats.tx_count
        ),
        Err(e) => warn!("graph not loaded at startup: {}", e),
    }

    // the consumer gets its own connection so flushes never queue behind reads
    let (stop_tx, stop_rx) = watch::channel(false);
    let consumer_task = if config.tx_source == TxSource::Db {
        let consumer_store = Store::connect(&config.database_url)
            .await
            .map_err(|e| anyhow::anyhow!("consumer database connection failed: {e}"))?;
        let consumer = TxConsumer::new(consumer_store, ConsumerSettings::from(&config));
        Some(tokio::spawn(async move {
            if let Err(e) = consumer.run(stop_rx).await {
                error!("consumer exited with error: {}", e);
            }
        }))
    } else {
        info!("TX_SOURCE=csv; kafka consumer disabled");
        None
    };

    let state = ApiState {
        store: Arc::clone(&store),
        graph: Arc::clone(&graph_handle),
        scoring: Arc::new(ScoringEngine::new()),
        risk_config: RiskConfig {
            illicit_seed_pct: config.illicit_seed_pct,
            ..RiskConfig::default()
        },
        config: config.clone(),
    };

    info!("starting REST API server on {}:{}", config.api_host, config.api_port);
    api::start_server(state, &config.api_host, config.api_port).await?;

    // server exited (signal); stop the consumer and let an in-flight flush finish
    let _ = stop_tx.send(true);
    if let Some(task) = consumer_task {
        task.await.ok();
    }

    Ok(())
}
