//! Densex Core - Retry and Cost Accounting
//!
//! This crate holds the pieces every Densex call site shares:
//! - `retry`: bounded retries with per-attempt timeout and exponential backoff
//! - `cost`: per-service cost ledger with a durable log, dashboard mirroring
//!   and budget alerts
//! - `citation`: character spans of an answer inside its source passage
//! - `env`: loading and validating required environment variables
//!
//! # Control flow
//!
//! ```text
//! call site ──► RetryExecutor ──► external operation (attempt 1..n)
//!     │
//!     └── on success ──► UsageLedger::record
//!                           ├─ totals[key] += cost     (under lock)
//!                           ├─ append CostRecord        (usage.csv)
//!                           ├─ dashboard POST           (RetryExecutor)
//!                           └─ total >= limit ? BudgetExceeded
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod citation;
pub mod cost;
pub mod env;
pub mod error;
pub mod retry;

pub use citation::{generate_citation, Span};
pub use cost::{
    CostRecord, CostSink, CsvCostLog, DashboardConfig, DashboardError, DashboardReporter,
    HttpDashboard, LedgerConfig, LedgerError, UsageLedger, UsageSnapshot,
};
pub use env::load_env;
pub use error::{Error, Result};
pub use retry::{
    AttemptFailure, BoxError, RecordingSleeper, RetryError, RetryExecutor, RetryPolicy, Sleeper,
    TokioSleeper,
};
