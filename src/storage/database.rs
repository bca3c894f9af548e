/// PostgreSQL storage layer
/// Durable home of the transaction log, ingestion telemetry and scoring runs.
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_postgres::{Client, NoTls};

use crate::core::{RiskError, RiskResult};

/// One transaction as read back for graph building.
#[derive(Debug, Clone)]
pub struct TxRow {
    pub sender: String,
    pub receiver: String,
    pub amount: f64,
}

/// Normalized bus record ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidTx {
    pub tx_id: String,
    pub sender: String,
    pub receiver: String,
    pub amount: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Per-consumer ingestion telemetry row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestionState {
    pub name: String,
    pub last_tx_id: Option<String>,
    pub last_processed_at: Option<DateTime<Utc>>,
    pub total_inserted: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ScoringRun {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub tx_source: String,
    pub config_json: Value,
}

/// Stored per-wallet score row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredScore {
    pub wallet: String,
    pub risk_score: f64,
    pub exposures_json: Value,
    pub in_degree: i32,
    pub out_degree: i32,
    pub run_id: i64,
    pub created_at: DateTime<Utc>,
}

/// One row of a scoring run as handed to the bulk insert.
#[derive(Debug, Clone)]
pub struct ScoreRow {
    pub wallet: String,
    pub risk_score: f64,
    pub exposures_json: String,
    pub in_degree: i32,
    pub out_degree: i32,
}

fn db_err(context: &str, e: impl std::fmt::Display) -> RiskError {
    RiskError::Storage(format!("{}: {}", context, e))
}

/// Database access shared by the API workers. The consumer opens its own
/// `Store` so a slow flush never queues behind read traffic.
pub struct Store {
    client: Client,
    database_url: String,
}

impl Store {
    pub async fn connect(database_url: &str) -> RiskResult<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls)
            .await
            .map_err(|e| db_err("Failed to connect", e))?;

        // Drive the connection until the client is dropped
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("database connection error: {}", e);
            }
        });

        Ok(Self {
            client,
            database_url: database_url.to_string(),
        })
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn init_schema(&self) -> RiskResult<()> {
        self.client
            .execute(
                "CREATE TABLE IF NOT EXISTS transactions (
                    tx_id TEXT PRIMARY KEY,
                    sender TEXT NOT NULL,
                    receiver TEXT NOT NULL,
                    amount DOUBLE PRECISION NOT NULL DEFAULT 0,
                    timestamp TIMESTAMPTZ,
                    ingested_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
                &[],
            )
            .await
            .map_err(|e| db_err("Failed to create transactions table", e))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_transactions_sender ON transactions(sender)",
                &[],
            )
            .await
            .ok();
        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_transactions_receiver ON transactions(receiver)",
                &[],
            )
            .await
            .ok();
        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_transactions_ingested_at ON transactions(ingested_at)",
                &[],
            )
            .await
            .ok();

        self.client
            .execute(
                "CREATE TABLE IF NOT EXISTS ingestion_state (
                    name TEXT PRIMARY KEY,
                    last_tx_id TEXT,
                    last_processed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    total_inserted BIGINT NOT NULL DEFAULT 0,
                    last_error TEXT
                )",
                &[],
            )
            .await
            .map_err(|e| db_err("Failed to create ingestion_state table", e))?;

        self.client
            .execute(
                "CREATE TABLE IF NOT EXISTS scoring_runs (
                    id BIGSERIAL PRIMARY KEY,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    tx_source TEXT NOT NULL,
                    config_json JSONB NOT NULL
                )",
                &[],
            )
            .await
            .map_err(|e| db_err("Failed to create scoring_runs table", e))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_scoring_runs_created_at ON scoring_runs(created_at DESC)",
                &[],
            )
            .await
            .ok();

        self.client
            .execute(
                "CREATE TABLE IF NOT EXISTS risk_scores (
                    id BIGSERIAL PRIMARY KEY,
                    run_id BIGINT NOT NULL REFERENCES scoring_runs(id) ON DELETE CASCADE,
                    wallet TEXT NOT NULL,
                    risk_score DOUBLE PRECISION NOT NULL,
                    exposures_json JSONB NOT NULL,
                    in_degree INTEGER NOT NULL,
                    out_degree INTEGER NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                )",
                &[],
            )
            .await
            .map_err(|e| db_err("Failed to create risk_scores table", e))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_risk_scores_run_id ON risk_scores(run_id)",
                &[],
            )
            .await
            .ok();
        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_risk_scores_wallet ON risk_scores(wallet)",
                &[],
            )
            .await
            .ok();
        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_risk_scores_created_at ON risk_scores(created_at DESC)",
                &[],
            )
            .await
            .ok();

        Ok(())
    }

    /// Bulk-insert transactions, ignoring tx_ids that already exist.
    ///
    /// Returns the tx_ids actually inserted, so the count is exact even on
    /// redelivery (RETURNING only emits genuinely new rows).
    pub async fn upsert_transactions(&self, rows: &[ValidTx]) -> RiskResult<Vec<String>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let tx_ids: Vec<&str> = rows.iter().map(|r| r.tx_id.as_str()).collect();
        let senders: Vec<&str> = rows.iter().map(|r| r.sender.as_str()).collect();
        let receivers: Vec<&str> = rows.iter().map(|r| r.receiver.as_str()).collect();
        let amounts: Vec<f64> = rows.iter().map(|r| r.amount).collect();
        let timestamps: Vec<Option<DateTime<Utc>>> = rows.iter().map(|r| r.timestamp).collect();

        let inserted = self
            .client
            .query(
                "INSERT INTO transactions (tx_id, sender, receiver, amount, timestamp)
                 SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::float8[], $5::timestamptz[])
                 ON CONFLICT (tx_id) DO NOTHING
                 RETURNING tx_id",
                &[&tx_ids, &senders, &receivers, &amounts, &timestamps],
            )
            .await
            .map_err(|e| db_err("Failed to upsert transactions", e))?;

        Ok(inserted.iter().map(|row| row.get(0)).collect())
    }

    /// Upsert the consumer's telemetry row. `inserted` is added to the
    /// lifetime total; passing `last_error = None` clears a previous error.
    pub async fn record_ingestion(
        &self,
        name: &str,
        last_tx_id: Option<&str>,
        inserted: i64,
        last_error: Option<&str>,
    ) -> RiskResult<()> {
        self.client
            .execute(
                "INSERT INTO ingestion_state (name, last_tx_id, last_processed_at, total_inserted, last_error)
                 VALUES ($1, $2, NOW(), $3, $4)
                 ON CONFLICT (name) DO UPDATE SET
                    last_tx_id = EXCLUDED.last_tx_id,
                    last_processed_at = NOW(),
                    total_inserted = ingestion_state.total_inserted + EXCLUDED.total_inserted,
                    last_error = EXCLUDED.last_error",
                &[&name, &last_tx_id, &inserted, &last_error],
            )
            .await
            .map_err(|e| db_err("Failed to record ingestion state", e))?;

        Ok(())
    }

    pub async fn get_ingestion_state(&self, name: &str) -> RiskResult<Option<IngestionState>> {
        let row = self
            .client
            .query_opt(
                "SELECT name, last_tx_id, last_processed_at, total_inserted, last_error
                 FROM ingestion_state WHERE name = $1",
                &[&name],
            )
            .await
            .map_err(|e| db_err("Failed to get ingestion state", e))?;

        Ok(row.map(|row| IngestionState {
            name: row.get(0),
            last_tx_id: row.get(1),
            last_processed_at: row.get(2),
            total_inserted: row.get(3),
            last_error: row.get(4),
        }))
    }

    pub async fn fetch_all_transactions(&self) -> RiskResult<Vec<TxRow>> {
        let rows = self
            .client
            .query("SELECT sender, receiver, amount FROM transactions", &[])
            .await
            .map_err(|e| db_err("Failed to fetch transactions", e))?;

        Ok(rows
            .iter()
            .map(|row| TxRow {
                sender: row.get(0),
                receiver: row.get(1),
                amount: row.get(2),
            })
            .collect())
    }

    pub async fn count_transactions(&self) -> RiskResult<i64> {
        let row = self
            .client
            .query_one("SELECT COUNT(*) FROM transactions", &[])
            .await
            .map_err(|e| db_err("Failed to count transactions", e))?;
        Ok(row.get(0))
    }

    /// Transactions persisted within the trailing window, by ingestion time.
    pub async fn count_ingested_since(&self, minutes: i32) -> RiskResult<i64> {
        let row = self
            .client
            .query_one(
                "SELECT COUNT(*) FROM transactions
                 WHERE ingested_at >= NOW() - make_interval(mins => $1)",
                &[&minutes],
            )
            .await
            .map_err(|e| db_err("Failed to count recent transactions", e))?;
        Ok(row.get(0))
    }

    /// Persist a scoring run and all of its per-wallet rows in one
    /// transaction on a dedicated connection. A failure anywhere rolls the
    /// run row back too; readers never observe a partial run.
    pub async fn insert_run_with_scores(
        &self,
        tx_source: &str,
        config_json: &Value,
        rows: &[ScoreRow],
    ) -> RiskResult<i64> {
        let (mut client, connection) = tokio_postgres::connect(&self.database_url, NoTls)
            .await
            .map_err(|e| db_err("Failed to open scoring connection", e))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("scoring connection error: {}", e);
            }
        });

        let tx = client
            .transaction()
            .await
            .map_err(|e| db_err("Failed to begin scoring transaction", e))?;

        let run_id: i64 = tx
            .query_one(
                "INSERT INTO scoring_runs (tx_source, config_json)
                 VALUES ($1, ($2::text)::jsonb)
                 RETURNING id",
                &[&tx_source, &config_json.to_string()],
            )
            .await
            .map_err(|e| db_err("Failed to create scoring run", e))?
            .get(0);

        let wallets: Vec<&str> = rows.iter().map(|r| r.wallet.as_str()).collect();
        let scores: Vec<f64> = rows.iter().map(|r| r.risk_score).collect();
        let exposures: Vec<&str> = rows.iter().map(|r| r.exposures_json.as_str()).collect();
        let in_degrees: Vec<i32> = rows.iter().map(|r| r.in_degree).collect();
        let out_degrees: Vec<i32> = rows.iter().map(|r| r.out_degree).collect();

        tx.execute(
            "INSERT INTO risk_scores (run_id, wallet, risk_score, exposures_json, in_degree, out_degree)
             SELECT $1, t.wallet, t.risk_score, t.exposures::jsonb, t.in_degree, t.out_degree
             FROM UNNEST($2::text[], $3::float8[], $4::text[], $5::int[], $6::int[])
                  AS t(wallet, risk_score, exposures, in_degree, out_degree)",
            &[&run_id, &wallets, &scores, &exposures, &in_degrees, &out_degrees],
        )
        .await
        .map_err(|e| db_err("Failed to insert risk scores", e))?;

        tx.commit()
            .await
            .map_err(|e| db_err("Failed to commit scoring run", e))?;

        Ok(run_id)
    }

    pub async fn get_latest_run(&self) -> RiskResult<Option<ScoringRun>> {
        let row = self
            .client
            .query_opt(
                "SELECT id, created_at, tx_source, config_json::text
                 FROM scoring_runs ORDER BY created_at DESC LIMIT 1",
                &[],
            )
            .await
            .map_err(|e| db_err("Failed to get latest run", e))?;
        row.map(parse_run).transpose()
    }

    pub async fn get_run(&self, run_id: i64) -> RiskResult<Option<ScoringRun>> {
        let row = self
            .client
            .query_opt(
                "SELECT id, created_at, tx_source, config_json::text
                 FROM scoring_runs WHERE id = $1",
                &[&run_id],
            )
            .await
            .map_err(|e| db_err("Failed to get run", e))?;
        row.map(parse_run).transpose()
    }

    /// Top scores of the latest run, highest risk first.
    pub async fn get_top_scores_latest(&self, limit: i64) -> RiskResult<Vec<StoredScore>> {
        let latest = match self.get_latest_run().await? {
            Some(run) => run,
            None => return Ok(Vec::new()),
        };

        let rows = self
            .client
            .query(
                "SELECT wallet, risk_score, exposures_json::text, in_degree, out_degree, run_id, created_at
                 FROM risk_scores WHERE run_id = $1
                 ORDER BY risk_score DESC LIMIT $2",
                &[&latest.id, &limit],
            )
            .await
            .map_err(|e| db_err("Failed to get top scores", e))?;

        rows.iter().map(parse_score).collect()
    }

    /// Most recently stored score for a wallet, across runs.
    pub async fn get_latest_score_for_wallet(&self, wallet: &str) -> RiskResult<Option<StoredScore>> {
        let row = self
            .client
            .query_opt(
                "SELECT wallet, risk_score, exposures_json::text, in_degree, out_degree, run_id, created_at
                 FROM risk_scores WHERE wallet = $1
                 ORDER BY created_at DESC LIMIT 1",
                &[&wallet],
            )
            .await
            .map_err(|e| db_err("Failed to get score for wallet", e))?;
        row.as_ref().map(parse_score).transpose()
    }

    pub async fn count_scores_for_run(&self, run_id: i64) -> RiskResult<i64> {
        let row = self
            .client
            .query_one(
                "SELECT COUNT(*) FROM risk_scores WHERE run_id = $1",
                &[&run_id],
            )
            .await
            .map_err(|e| db_err("Failed to count scores for run", e))?;
        Ok(row.get(0))
    }

    /// Risk scores of one run for the given wallets, in a single lookup.
    pub async fn scores_for_wallets(
        &self,
        run_id: i64,
        wallets: &[&str],
    ) -> RiskResult<std::collections::HashMap<String, f64>> {
        if wallets.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let rows = self
            .client
            .query(
                "SELECT wallet, risk_score FROM risk_scores
                 WHERE run_id = $1 AND wallet = ANY($2)",
                &[&run_id, &wallets],
            )
            .await
            .map_err(|e| db_err("Failed to get scores for wallets", e))?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<_, String>(0), row.get::<_, f64>(1)))
            .collect())
    }

    pub async fn health_check(&self) -> RiskResult<()> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| db_err("Health check failed", e))?;
        Ok(())
    }
}

fn parse_run(row: tokio_postgres::Row) -> RiskResult<ScoringRun> {
    let config_raw: String = row.get(3);
    let config_json: Value = serde_json::from_str(&config_raw)
        .map_err(|e| db_err("Failed to parse run config JSON", e))?;
    Ok(ScoringRun {
        id: row.get(0),
        created_at: row.get(1),
        tx_source: row.get(2),
        config_json,
    })
}

fn parse_score(row: &tokio_postgres::Row) -> RiskResult<StoredScore> {
    let exposures_raw: String = row.get(2);
    let exposures_json: Value = serde_json::from_str(&exposures_raw)
        .map_err(|e| db_err("Failed to parse exposures JSON", e))?;
    Ok(StoredScore {
        wallet: row.get(0),
        risk_score: row.get(1),
        exposures_json,
        in_degree: row.get(3),
        out_degree: row.get(4),
        run_id: row.get(5),
        created_at: row.get(6),
    })
}
