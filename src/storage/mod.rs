/// Storage layer - PostgreSQL access
pub mod database;

pub use database::{
    IngestionState, ScoreRow, ScoringRun, Store, StoredScore, TxRow, ValidTx,
};
