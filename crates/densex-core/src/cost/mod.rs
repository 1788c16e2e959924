//! Cost Accounting - per-service totals with a durable log and budget alerts
//!
//! Every accounting event is appended to an append-only log before it is
//! acknowledged. The in-memory totals are a cache of that log and can be
//! rebuilt by replaying it.
//!
//! # Module Structure
//!
//! - `record`: `CostRecord` and its log-line format
//! - `sink`: durable log destinations (`CostSink`, `CsvCostLog`)
//! - `dashboard`: optional remote mirror (`DashboardReporter`, `HttpDashboard`)
//! - `ledger`: `UsageLedger`, configuration and `LedgerError`

mod dashboard;
mod ledger;
mod record;
mod sink;

#[cfg(test)]
mod tests;

pub use dashboard::{DashboardError, DashboardReporter, HttpDashboard};
pub use ledger::{
    DashboardConfig, LedgerConfig, LedgerError, UsageLedger, DEFAULT_ALERT_LIMIT, DEFAULT_LOG_PATH,
};
pub use record::{CostRecord, UsageSnapshot};
pub use sink::{CostSink, CsvCostLog};
