/// Bus record normalization
///
/// Incoming records are loosely shaped JSON; producers disagree on field
/// names, so aliases are accepted for the wallet and timestamp fields.
/// Records without tx_id/sender/receiver are poison: dropped and counted,
/// never retried. A missing or unparsable amount degrades to 0.0.
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::storage::ValidTx;

/// Raw record as it arrives on the bus. Anything can be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBusRecord {
    #[serde(default)]
    pub tx_id: Option<String>,
    #[serde(default, alias = "src", alias = "from")]
    pub sender: Option<String>,
    #[serde(default, alias = "dst", alias = "to")]
    pub receiver: Option<String>,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default, alias = "time")]
    pub timestamp: Option<String>,
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

fn parse_amount(v: &serde_json::Value) -> f64 {
    match v {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    // producers without timezone info (e.g. bare isoformat) are taken as UTC
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl RawBusRecord {
    /// tx_id even of otherwise-invalid records, used for `last_tx_id`
    /// telemetry.
    pub fn tx_id(&self) -> Option<&str> {
        non_empty(&self.tx_id)
    }
}

/// Map a raw record to an insertable row. `None` means poison.
pub fn normalize_record(r: &RawBusRecord) -> Option<ValidTx> {
    let tx_id = non_empty(&r.tx_id)?;
    let sender = non_empty(&r.sender)?;
    let receiver = non_empty(&r.receiver)?;

    let amount = r.amount.as_ref().map(parse_amount).unwrap_or(0.0);
    let timestamp = r.timestamp.as_deref().and_then(parse_timestamp);

    Some(ValidTx {
        tx_id: tx_id.to_string(),
        sender: sender.to_string(),
        receiver: receiver.to_string(),
        amount,
        timestamp,
    })
}
