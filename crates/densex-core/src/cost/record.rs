//! Cost records and the log-line format
//!
//! One record per line: `timestamp,service,cost,total`, timestamp in UTC
//! ISO-8601 and both amounts fixed to 4 decimal places.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One accounting event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Service key the cost applies to
    pub service: String,
    /// Incremental cost of this event
    pub cost: f64,
    /// Running total for `service` after this event
    pub total: f64,
}

impl CostRecord {
    /// Create a record stamped with the current time
    #[must_use]
    pub fn now(service: impl Into<String>, cost: f64, total: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            service: service.into(),
            cost,
            total,
        }
    }

    /// Render as a log line (without trailing newline)
    #[must_use]
    pub fn to_log_line(&self) -> String {
        format!(
            "{},{},{:.4},{:.4}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            self.service,
            self.cost,
            self.total
        )
    }

    /// Parse a log line written by [`CostRecord::to_log_line`].
    ///
    /// Timestamps without an offset are read as UTC.
    pub fn parse_line(line: &str) -> Result<Self, String> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split(',').collect();
        let [timestamp, service, cost, total] = fields.as_slice() else {
            return Err(format!("expected 4 fields, found {}", fields.len()));
        };

        let timestamp = parse_timestamp(timestamp)?;
        if service.trim().is_empty() {
            return Err("empty service key".to_string());
        }
        let cost = parse_amount(cost, "cost")?;
        let total = parse_amount(total, "total")?;

        Ok(Self {
            timestamp,
            service: (*service).to_string(),
            cost,
            total,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("bad timestamp {raw:?}: {e}"))
}

fn parse_amount(raw: &str, field: &str) -> Result<f64, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|e| format!("bad {field} {raw:?}: {e}"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{field} must be a non-negative number"));
    }
    Ok(value)
}

/// Point-in-time view of ledger totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Running total per service key
    pub totals: BTreeMap<String, f64>,
    /// Alert limit applied to every key
    pub alert_limit: f64,
}

impl UsageSnapshot {
    /// Keys whose total has reached the alert limit
    #[must_use]
    pub fn over_limit(&self) -> Vec<&str> {
        self.totals
            .iter()
            .filter(|(_, total)| **total >= self.alert_limit)
            .map(|(key, _)| key.as_str())
            .collect()
    }
}
