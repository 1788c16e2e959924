//! Usage Ledger - serialized cost accumulation
//!
//! `record` holds one exclusive lock across the whole bookkeeping sequence:
//! compute the new total, append it to the log, commit it, mirror it to the
//! dashboard, then check the alert limit. Concurrent callers are therefore
//! totally ordered and no two of them can interleave their alert checks.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::dashboard::{DashboardReporter, HttpDashboard};
use super::record::{CostRecord, UsageSnapshot};
use super::sink::{CostSink, CsvCostLog};
use crate::retry::{RetryError, RetryExecutor, RetryPolicy};

/// Default alert limit in cost units
pub const DEFAULT_ALERT_LIMIT: f64 = 150.0;
/// Default cost log location
pub const DEFAULT_LOG_PATH: &str = "usage.csv";

// ============================================================================
// Errors
// ============================================================================

/// Failures of [`UsageLedger`] operations
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Service key or cost was rejected; nothing was recorded
    #[error("invalid monitoring data: {reason}")]
    InvalidData {
        /// What was wrong with the input
        reason: String,
    },

    /// Alert limit was not a positive finite number
    #[error("alert limit must be a positive number, got {0}")]
    InvalidLimit(f64),

    /// The durable log could not be written or read
    #[error("failed to log usage")]
    Persistence(#[source] io::Error),

    /// The dashboard could not be reached after retries.
    /// The record is already persisted and committed.
    #[error("failed to report usage to dashboard")]
    RemoteReport(#[source] RetryError),

    /// The key's running total reached the alert limit.
    /// The record is already persisted and committed.
    #[error("{service} cost {total:.2} exceeds ${limit:.2}")]
    BudgetExceeded {
        /// Service key that crossed the limit
        service: String,
        /// Committed running total
        total: f64,
        /// Configured limit
        limit: f64,
    },

    /// A line of an existing log could not be parsed during replay
    #[error("malformed cost log line {line}: {reason}")]
    Replay {
        /// 1-based line number
        line: usize,
        /// Parse failure
        reason: String,
    },
}

impl LedgerError {
    /// Whether this is a budget breach rather than a malfunction
    #[must_use]
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, LedgerError::BudgetExceeded { .. })
    }

    fn invalid(reason: impl Into<String>) -> Self {
        LedgerError::InvalidData {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Remote dashboard settings
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// Endpoint receiving JSON POSTs
    pub url: String,
    /// Delivery attempts per record
    pub retries: u32,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Backoff before the second attempt
    pub base_delay: Duration,
}

impl DashboardConfig {
    /// Dashboard at `url` with 3 attempts, 5 s timeout, 1 s base delay
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            retries: 3,
            timeout: Duration::from_secs(5),
            base_delay: Duration::from_secs(1),
        }
    }

    /// Set the number of delivery attempts
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the base backoff delay
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Retry policy for deliveries
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, self.base_delay, self.timeout)
    }
}

/// Ledger settings
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Running total at or above which `record` fails with `BudgetExceeded`
    pub alert_limit: f64,
    /// Cost log location
    pub log_path: PathBuf,
    /// Optional remote mirror
    pub dashboard: Option<DashboardConfig>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            alert_limit: DEFAULT_ALERT_LIMIT,
            log_path: PathBuf::from(DEFAULT_LOG_PATH),
            dashboard: None,
        }
    }
}

impl LedgerConfig {
    /// Set the alert limit
    #[must_use]
    pub fn with_alert_limit(mut self, limit: f64) -> Self {
        self.alert_limit = limit;
        self
    }

    /// Set the log path
    #[must_use]
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = path.into();
        self
    }

    /// Enable the remote dashboard
    #[must_use]
    pub fn with_dashboard(mut self, dashboard: DashboardConfig) -> Self {
        self.dashboard = Some(dashboard);
        self
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[derive(Debug)]
struct Dashboard {
    reporter: Arc<dyn DashboardReporter>,
    policy: RetryPolicy,
}

/// Per-service cost accumulator
#[derive(Debug)]
pub struct UsageLedger {
    totals: Mutex<HashMap<String, f64>>,
    alert_limit: f64,
    sink: Arc<dyn CostSink>,
    dashboard: Option<Dashboard>,
    executor: RetryExecutor,
}

impl UsageLedger {
    /// Ledger writing to `sink`, without a dashboard
    pub fn new(alert_limit: f64, sink: Arc<dyn CostSink>) -> Result<Self, LedgerError> {
        if !alert_limit.is_finite() || alert_limit <= 0.0 {
            return Err(LedgerError::InvalidLimit(alert_limit));
        }
        Ok(Self {
            totals: Mutex::new(HashMap::new()),
            alert_limit,
            sink,
            dashboard: None,
            executor: RetryExecutor::new(),
        })
    }

    /// Ledger with a CSV log and, if configured, an HTTP dashboard.
    /// Existing log content is not read; see [`UsageLedger::open`].
    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let ledger = Self::new(
            config.alert_limit,
            Arc::new(CsvCostLog::new(config.log_path.clone())),
        )?;
        Ok(match &config.dashboard {
            Some(dashboard) => ledger.with_dashboard(
                Arc::new(HttpDashboard::new(dashboard.url.clone())),
                dashboard.policy(),
            ),
            None => ledger,
        })
    }

    /// Ledger from config with totals rebuilt from the existing log
    pub async fn open(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let ledger = Self::from_config(config)?;
        let replayed = ledger.replay().await?;
        info!(
            path = %config.log_path.display(),
            records = replayed,
            "usage ledger opened"
        );
        Ok(ledger)
    }

    /// Mirror every record to `reporter` under `policy`
    #[must_use]
    pub fn with_dashboard(mut self, reporter: Arc<dyn DashboardReporter>, policy: RetryPolicy) -> Self {
        self.dashboard = Some(Dashboard { reporter, policy });
        self
    }

    /// Use a custom executor for dashboard deliveries
    #[must_use]
    pub fn with_executor(mut self, executor: RetryExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Configured alert limit
    #[must_use]
    pub fn alert_limit(&self) -> f64 {
        self.alert_limit
    }

    /// Rebuild totals from the sink's existing lines.
    ///
    /// The last running total of each key wins. Returns the number of
    /// records read.
    pub async fn replay(&self) -> Result<usize, LedgerError> {
        let mut totals = self.totals.lock().await;
        let lines = self.sink.read_lines().await.map_err(LedgerError::Persistence)?;

        let mut rebuilt = HashMap::new();
        for (index, line) in lines.iter().enumerate() {
            let record = CostRecord::parse_line(line).map_err(|reason| LedgerError::Replay {
                line: index + 1,
                reason,
            })?;
            rebuilt.insert(record.service, record.total);
        }

        *totals = rebuilt;
        Ok(lines.len())
    }

    /// Record `cost` against `service`.
    ///
    /// On success returns the committed record. A `BudgetExceeded` or
    /// `RemoteReport` error means the cost *was* committed and persisted.
    /// `Persistence` means it was not.
    #[instrument(skip(self), fields(limit = self.alert_limit))]
    pub async fn record(&self, service: &str, cost: f64) -> Result<CostRecord, LedgerError> {
        validate_input(service, cost)?;

        let mut totals = self.totals.lock().await;
        let total = totals.get(service).copied().unwrap_or(0.0) + cost;
        let record = CostRecord::now(service, cost, total);

        self.sink
            .append(&record)
            .await
            .map_err(LedgerError::Persistence)?;
        totals.insert(service.to_string(), total);
        debug!(service, cost, total, "usage recorded");

        if let Some(dashboard) = &self.dashboard {
            let reporter = &dashboard.reporter;
            self.executor
                .execute(&dashboard.policy, || reporter.report(&record))
                .await
                .map_err(LedgerError::RemoteReport)?;
        }

        if total >= self.alert_limit {
            warn!(service, total, limit = self.alert_limit, "cost alert limit reached");
            return Err(LedgerError::BudgetExceeded {
                service: service.to_string(),
                total,
                limit: self.alert_limit,
            });
        }

        Ok(record)
    }

    /// Running total for `service` (zero for unknown keys)
    pub async fn total(&self, service: &str) -> f64 {
        self.totals.lock().await.get(service).copied().unwrap_or(0.0)
    }

    /// Copy of all running totals
    pub async fn totals(&self) -> HashMap<String, f64> {
        self.totals.lock().await.clone()
    }

    /// Sorted totals together with the alert limit
    pub async fn snapshot(&self) -> UsageSnapshot {
        let totals = self.totals.lock().await;
        UsageSnapshot {
            totals: totals.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            alert_limit: self.alert_limit,
        }
    }
}

fn validate_input(service: &str, cost: f64) -> Result<(), LedgerError> {
    if service.trim().is_empty() {
        return Err(LedgerError::invalid("service key must be non-empty"));
    }
    if service.contains([',', '\n', '\r']) {
        return Err(LedgerError::invalid(
            "service key must not contain commas or line breaks",
        ));
    }
    if !cost.is_finite() || cost < 0.0 {
        return Err(LedgerError::invalid("cost must be a non-negative number"));
    }
    Ok(())
}
