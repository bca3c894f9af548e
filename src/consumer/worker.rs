/// Kafka consumer worker
/// Long-running task that batches bus records into the transaction store.
///
/// Offsets are committed only after the database flush succeeds, and the
/// tx_id primary key makes redelivery idempotent, so the pipeline is
/// at-least-once from the bus and exactly-once into the store.
use std::time::{Duration, Instant};

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use super::normalize::{normalize_record, RawBusRecord};
use crate::core::{Config, RiskError, RiskResult};
use crate::metrics;
use crate::storage::Store;

pub const CONSUMER_NAME: &str = "transactions_consumer";

/// Backoff after a failed flush so a down database is not hammered.
const FLUSH_RETRY_BACKOFF: Duration = Duration::from_secs(1);
const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub bootstrap_servers: String,
    pub topic: String,
    pub group_id: String,
    pub batch_size: usize,
    pub poll_ms: u64,
    pub flush_seconds: f64,
    pub connect_retry_seconds: f64,
    pub connect_max_attempts: u32,
}

impl From<&Config> for ConsumerSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            bootstrap_servers: cfg.kafka_bootstrap_servers.clone(),
            topic: cfg.kafka_topic.clone(),
            group_id: cfg.kafka_group_id.clone(),
            batch_size: cfg.consumer_batch_size,
            poll_ms: cfg.consumer_poll_ms,
            flush_seconds: cfg.consumer_flush_seconds,
            connect_retry_seconds: cfg.consumer_connect_retry_seconds,
            connect_max_attempts: cfg.consumer_connect_max_attempts,
        }
    }
}

#[derive(Debug, Default)]
struct FlushOutcome {
    received: usize,
    valid: usize,
    skipped: usize,
    inserted: usize,
    last_tx_id: Option<String>,
}

pub struct TxConsumer {
    store: Store,
    settings: ConsumerSettings,
}

impl TxConsumer {
    pub fn new(store: Store, settings: ConsumerSettings) -> Self {
        Self { store, settings }
    }

    /// Run until the stop signal flips. A connect or loop failure is
    /// recorded as `last_error` telemetry before it propagates; restart
    /// policy belongs to the supervisor.
    pub async fn run(&self, stop: watch::Receiver<bool>) -> RiskResult<()> {
        let result = self.run_inner(stop).await;
        if let Err(e) = &result {
            error!("consumer crashed: {}", e);
            if let Err(record_err) = self
                .store
                .record_ingestion(CONSUMER_NAME, None, 0, Some(&e.to_string()))
                .await
            {
                warn!("failed to record consumer crash: {}", record_err);
            }
        }
        result
    }

    async fn run_inner(&self, stop: watch::Receiver<bool>) -> RiskResult<()> {
        let consumer = self.connect(&stop).await?;
        info!(
            "consumer connected: {} topic='{}' group='{}'",
            self.settings.bootstrap_servers, self.settings.topic, self.settings.group_id
        );

        let mut buffer: Vec<RawBusRecord> = Vec::new();
        let mut last_flush = Instant::now();

        while !*stop.borrow() {
            self.poll_into(&consumer, &mut buffer).await;

            let time_due =
                last_flush.elapsed().as_secs_f64() >= self.settings.flush_seconds;
            let size_due = buffer.len() >= self.settings.batch_size;

            if !buffer.is_empty() && (time_due || size_due) {
                match self.flush(&consumer, &buffer).await {
                    Ok(outcome) => {
                        info!(
                            "flushed received={} valid={} skipped={} inserted={} last_tx_id={:?}",
                            outcome.received,
                            outcome.valid,
                            outcome.skipped,
                            outcome.inserted,
                            outcome.last_tx_id
                        );
                        buffer.clear();
                        last_flush = Instant::now();
                    }
                    Err(e) => {
                        // offsets stay uncommitted; the same records are
                        // retried on the next pass
                        error!("flush failed (will retry next poll): {}", e);
                        metrics::FLUSH_ERRORS.inc();
                        if let Err(record_err) = self
                            .store
                            .record_ingestion(CONSUMER_NAME, None, 0, Some(&e.to_string()))
                            .await
                        {
                            warn!("failed to record flush error: {}", record_err);
                        }
                        sleep(FLUSH_RETRY_BACKOFF).await;
                    }
                }
            }
        }

        // drain what we already pulled off the bus before shutting down
        if !buffer.is_empty() {
            match self.flush(&consumer, &buffer).await {
                Ok(outcome) => info!(
                    "final flush on shutdown: inserted={} skipped={}",
                    outcome.inserted, outcome.skipped
                ),
                Err(e) => warn!("final flush failed, records stay uncommitted: {}", e),
            }
        }

        info!("consumer stopped");
        Ok(())
    }

    /// Create the consumer and wait for the broker to answer a metadata
    /// probe, retrying on the configured schedule. Zero max attempts means
    /// retry until the stop signal.
    async fn connect(&self, stop: &watch::Receiver<bool>) -> RiskResult<StreamConsumer> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.settings.bootstrap_servers)
            .set("group.id", &self.settings.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| RiskError::Bus(format!("Failed to create consumer: {}", e)))?;

        consumer
            .subscribe(&[&self.settings.topic])
            .map_err(|e| RiskError::Bus(format!("Failed to subscribe: {}", e)))?;

        let mut attempt = 0u32;
        loop {
            if *stop.borrow() {
                return Err(RiskError::Bus("stopped before broker became reachable".into()));
            }
            attempt += 1;
            match consumer.fetch_metadata(Some(&self.settings.topic), METADATA_TIMEOUT) {
                Ok(_) => return Ok(consumer),
                Err(e) => {
                    if self.settings.connect_max_attempts > 0
                        && attempt >= self.settings.connect_max_attempts
                    {
                        return Err(RiskError::Bus(format!(
                            "Broker unreachable after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    warn!(
                        "kafka not ready (attempt {}); retrying in {:.1}s",
                        attempt, self.settings.connect_retry_seconds
                    );
                    sleep(Duration::from_secs_f64(self.settings.connect_retry_seconds)).await;
                }
            }
        }
    }

    /// Pull records for up to the poll window, or until the batch fills.
    async fn poll_into(&self, consumer: &StreamConsumer, buffer: &mut Vec<RawBusRecord>) {
        let deadline = Instant::now() + Duration::from_millis(self.settings.poll_ms);

        while buffer.len() < self.settings.batch_size {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            match timeout(remaining, consumer.recv()).await {
                Ok(Ok(message)) => {
                    let record = message
                        .payload()
                        .and_then(|payload| match serde_json::from_slice(payload) {
                            Ok(record) => Some(record),
                            Err(e) => {
                                debug!("undecodable bus payload: {}", e);
                                None
                            }
                        })
                        .unwrap_or_default();
                    metrics::RECORDS_RECEIVED.inc();
                    buffer.push(record);
                }
                Ok(Err(e)) => {
                    warn!("kafka receive error: {}", e);
                    break;
                }
                Err(_) => break, // poll window elapsed
            }
        }
    }

    /// Persist the buffered records and advance the consumer group.
    ///
    /// Order matters: bulk upsert, then offset commit, then telemetry. A
    /// failure before the commit leaves offsets unadvanced so the batch is
    /// redelivered; the tx_id key keeps the retry idempotent.
    async fn flush(
        &self,
        consumer: &StreamConsumer,
        buffer: &[RawBusRecord],
    ) -> RiskResult<FlushOutcome> {
        let received = buffer.len();
        if received == 0 {
            return Ok(FlushOutcome::default());
        }

        let last_tx_id = buffer
            .iter()
            .rev()
            .find_map(|r| r.tx_id())
            .map(|s| s.to_string());

        let rows: Vec<_> = buffer.iter().filter_map(normalize_record).collect();
        let skipped = received - rows.len();

        let inserted = self.store.upsert_transactions(&rows).await?.len();

        consumer
            .commit_consumer_state(CommitMode::Sync)
            .map_err(|e| RiskError::Bus(format!("Failed to commit offsets: {}", e)))?;

        self.store
            .record_ingestion(CONSUMER_NAME, last_tx_id.as_deref(), inserted as i64, None)
            .await?;

        metrics::RECORDS_INSERTED.inc_by(inserted as f64);
        metrics::RECORDS_SKIPPED.inc_by(skipped as f64);

        Ok(FlushOutcome {
            received,
            valid: rows.len(),
            skipped,
            inserted,
            last_tx_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> RawBusRecord {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_last_tx_id_ignores_trailing_invalid_records() {
        // last_tx_id tracks the last record that carried a tx_id at all,
        // even when that record is skipped for other reasons
        let buffer = vec![
            record(r#"{"tx_id":"T1","sender":"A","receiver":"B"}"#),
            record(r#"{"tx_id":"T2","sender":"A"}"#),
            record(r#"{"sender":"A","receiver":"B"}"#),
        ];

        let last = buffer.iter().rev().find_map(|r| r.tx_id());
        assert_eq!(last, Some("T2"));
    }

    #[test]
    fn test_partitioning_counts_poison_records() {
        let buffer = vec![
            record(r#"{"tx_id":"T1","sender":"A","receiver":"B"}"#),
            record(r#"{"tx_id":"T2","sender":"A"}"#),
            record(r#"{"tx_id":"T3","src":"A","dst":"B","amount":5}"#),
            RawBusRecord::default(),
        ];

        let rows: Vec<_> = buffer.iter().filter_map(normalize_record).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(buffer.len() - rows.len(), 2);
    }

    #[test]
    fn test_settings_from_config() {
        let cfg = Config::from_env();
        let settings = ConsumerSettings::from(&cfg);
        assert_eq!(settings.batch_size, cfg.consumer_batch_size);
        assert_eq!(settings.topic, cfg.kafka_topic);
    }
}
