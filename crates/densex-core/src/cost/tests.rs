//! Tests for cost module

use super::*;
use crate::retry::{RecordingSleeper, RetryExecutor, RetryPolicy};
use async_trait::async_trait;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Debug, Default)]
struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl CostSink for MemorySink {
    async fn append(&self, record: &CostRecord) -> io::Result<()> {
        self.lines.lock().unwrap().push(record.to_log_line());
        Ok(())
    }

    async fn read_lines(&self) -> io::Result<Vec<String>> {
        Ok(self.lines())
    }
}

/// Hands control back to the scheduler around every write, so a ledger
/// that released its lock mid-record would interleave
#[derive(Debug, Default)]
struct YieldingSink {
    lines: Mutex<Vec<String>>,
}

impl YieldingSink {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl CostSink for YieldingSink {
    async fn append(&self, record: &CostRecord) -> io::Result<()> {
        tokio::task::yield_now().await;
        self.lines.lock().unwrap().push(record.to_log_line());
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn read_lines(&self) -> io::Result<Vec<String>> {
        Ok(self.lines())
    }
}

#[derive(Debug)]
struct BrokenSink;

#[async_trait]
impl CostSink for BrokenSink {
    async fn append(&self, _record: &CostRecord) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    }
}

/// Fails the first `failures` deliveries, then accepts
#[derive(Debug, Default)]
struct FlakyDashboard {
    failures: u32,
    calls: AtomicU32,
    delivered: Mutex<Vec<(String, f64, f64)>>,
}

impl FlakyDashboard {
    fn failing(failures: u32) -> Self {
        Self {
            failures,
            ..Self::default()
        }
    }
}

#[async_trait]
impl DashboardReporter for FlakyDashboard {
    async fn report(&self, record: &CostRecord) -> Result<(), DashboardError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(DashboardError::Status(503));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((record.service.clone(), record.cost, record.total));
        Ok(())
    }
}

fn memory_ledger(limit: f64) -> (UsageLedger, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::default());
    let ledger = UsageLedger::new(limit, sink.clone()).unwrap();
    (ledger, sink)
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ============================================================================
// Records
// ============================================================================

#[test]
fn test_log_line_format() {
    let record = CostRecord {
        timestamp: chrono::DateTime::parse_from_rfc3339("2024-05-01T12:30:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc),
        service: "openrouter".to_string(),
        cost: 0.0125,
        total: 1.5,
    };

    assert_eq!(
        record.to_log_line(),
        "2024-05-01T12:30:00.000000Z,openrouter,0.0125,1.5000"
    );
    assert_eq!(CostRecord::parse_line(&record.to_log_line()).unwrap(), record);
}

#[test]
fn test_parse_line_accepts_naive_timestamps() {
    let record = CostRecord::parse_line("2024-01-01T00:00:00.123456,pinecone,0.0100,0.0300").unwrap();
    assert_eq!(record.service, "pinecone");
    assert!(approx(record.total, 0.03));
    assert_eq!(record.timestamp.timestamp_subsec_micros(), 123_456);
}

#[test]
fn test_parse_line_rejects_malformed() {
    assert!(CostRecord::parse_line("").is_err());
    assert!(CostRecord::parse_line("2024-01-01T00:00:00Z,svc,0.1").is_err());
    assert!(CostRecord::parse_line("yesterday,svc,0.1,0.1").is_err());
    assert!(CostRecord::parse_line("2024-01-01T00:00:00Z,svc,abc,0.1").is_err());
    assert!(CostRecord::parse_line("2024-01-01T00:00:00Z,svc,-1,0.1").is_err());
    assert!(CostRecord::parse_line("2024-01-01T00:00:00Z, ,0.1,0.1").is_err());
}

#[test]
fn test_snapshot_over_limit() {
    let snapshot = UsageSnapshot {
        totals: [("a".to_string(), 0.5), ("b".to_string(), 1.0)]
            .into_iter()
            .collect(),
        alert_limit: 1.0,
    };
    assert_eq!(snapshot.over_limit(), vec!["b"]);
}

// ============================================================================
// Ledger
// ============================================================================

#[tokio::test]
async fn test_totals_accumulate_per_key() {
    let (ledger, sink) = memory_ledger(100.0);

    ledger.record("openrouter", 0.25).await.unwrap();
    let record = ledger.record("openrouter", 0.5).await.unwrap();
    ledger.record("pinecone", 0.1).await.unwrap();

    assert!(approx(record.total, 0.75));
    assert!(approx(ledger.total("openrouter").await, 0.75));
    assert!(approx(ledger.total("pinecone").await, 0.1));
    assert_eq!(ledger.total("unknown").await, 0.0);
    assert_eq!(sink.lines().len(), 3);
}

#[tokio::test]
async fn test_invalid_input_leaves_state_untouched() {
    let (ledger, sink) = memory_ledger(100.0);
    ledger.record("svc", 1.0).await.unwrap();

    let invalid: [(&str, f64); 6] = [
        ("svc", -0.5),
        ("svc", f64::NAN),
        ("svc", f64::INFINITY),
        ("", 1.0),
        ("   ", 1.0),
        ("a,b", 1.0),
    ];
    for (service, cost) in invalid {
        let err = ledger.record(service, cost).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidData { .. }), "{service:?} {cost}");
        assert!(err.to_string().starts_with("invalid monitoring data"));
    }

    assert!(approx(ledger.total("svc").await, 1.0));
    assert_eq!(sink.lines().len(), 1);
}

#[tokio::test]
async fn test_zero_cost_is_recorded() {
    let (ledger, sink) = memory_ledger(1.0);
    let record = ledger.record("svc", 0.0).await.unwrap();
    assert_eq!(record.total, 0.0);
    assert_eq!(sink.lines().len(), 1);
}

#[tokio::test]
async fn test_budget_crossing_is_committed() {
    let (ledger, sink) = memory_ledger(1.0);

    assert!(approx(ledger.record("svc", 0.6).await.unwrap().total, 0.6));
    assert!(approx(ledger.record("svc", 0.3).await.unwrap().total, 0.9));

    let err = ledger.record("svc", 0.2).await.unwrap_err();
    match &err {
        LedgerError::BudgetExceeded {
            service,
            total,
            limit,
        } => {
            assert_eq!(service, "svc");
            assert!(approx(*total, 1.1));
            assert_eq!(*limit, 1.0);
        }
        other => panic!("expected BudgetExceeded, got {other:?}"),
    }
    assert!(err.is_budget_exceeded());
    assert_eq!(err.to_string(), "svc cost 1.10 exceeds $1.00");

    // Not rolled back
    assert!(approx(ledger.total("svc").await, 1.1));
    let lines = sink.lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[2].ends_with(",svc,0.2000,1.1000"));
}

#[tokio::test]
async fn test_reaching_limit_exactly_alerts() {
    let (ledger, _sink) = memory_ledger(1.0);
    let err = ledger.record("svc", 1.0).await.unwrap_err();
    assert!(err.is_budget_exceeded());

    // Later records keep alerting and keep accumulating
    let err = ledger.record("svc", 0.5).await.unwrap_err();
    assert!(err.is_budget_exceeded());
    assert!(approx(ledger.total("svc").await, 1.5));
}

#[tokio::test]
async fn test_limit_is_shared_but_totals_independent() {
    let (ledger, _sink) = memory_ledger(1.0);
    ledger.record("a", 0.9).await.unwrap();
    ledger.record("b", 0.9).await.unwrap();
    assert!(ledger.record("a", 0.1).await.unwrap_err().is_budget_exceeded());
    assert!(approx(ledger.total("b").await, 0.9));
}

#[tokio::test]
async fn test_persistence_failure_wins_over_alert() {
    let ledger = UsageLedger::new(1.0, Arc::new(BrokenSink)).unwrap();

    let err = ledger.record("svc", 5.0).await.unwrap_err();
    assert!(matches!(err, LedgerError::Persistence(_)));
    assert_eq!(err.to_string(), "failed to log usage");
    assert!(std::error::Error::source(&err).is_some());
    assert_eq!(ledger.total("svc").await, 0.0);
}

#[test]
fn test_invalid_alert_limits() {
    for limit in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let err = UsageLedger::new(limit, Arc::new(MemorySink::default())).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidLimit(_)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_records_are_serialized() {
    let sink = Arc::new(YieldingSink::default());
    let ledger = Arc::new(UsageLedger::new(1_000.0, sink.clone()).unwrap());

    let handles: Vec<_> = (0..60)
        .map(|i| {
            let ledger = ledger.clone();
            let key = if i % 6 == 0 { "other" } else { "k" };
            tokio::spawn(async move { ledger.record(key, 1.0).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(ledger.total("k").await, 50.0);
    assert_eq!(ledger.total("other").await, 10.0);

    // Each key's running totals in the log step up by exactly one cost
    let mut last = std::collections::HashMap::new();
    let lines = sink.lines();
    assert_eq!(lines.len(), 60);
    for line in lines {
        let record = CostRecord::parse_line(&line).unwrap();
        let previous = last.insert(record.service.clone(), record.total).unwrap_or(0.0);
        assert!(record.total > previous);
        assert_eq!(record.total, previous + 1.0);
    }
    assert_eq!(last["k"], 50.0);
    assert_eq!(last["other"], 10.0);
}

// ============================================================================
// Dashboard
// ============================================================================

fn dashboard_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(5))
}

#[tokio::test]
async fn test_dashboard_receives_committed_record() {
    let sleeper = RecordingSleeper::new();
    let dashboard = Arc::new(FlakyDashboard::failing(2));
    let (ledger, _sink) = memory_ledger(10.0);
    let ledger = ledger
        .with_dashboard(dashboard.clone(), dashboard_policy())
        .with_executor(RetryExecutor::with_sleeper(sleeper.clone()));

    ledger.record("svc", 0.5).await.unwrap();

    assert_eq!(dashboard.calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
    assert_eq!(
        dashboard.delivered.lock().unwrap().clone(),
        vec![("svc".to_string(), 0.5, 0.5)]
    );
}

#[tokio::test]
async fn test_dashboard_outage_after_local_persistence() {
    let dashboard = Arc::new(FlakyDashboard::failing(u32::MAX));
    let (ledger, sink) = memory_ledger(10.0);
    let ledger = ledger
        .with_dashboard(dashboard.clone(), dashboard_policy())
        .with_executor(RetryExecutor::with_sleeper(RecordingSleeper::new()));

    let err = ledger.record("svc", 0.5).await.unwrap_err();

    match &err {
        LedgerError::RemoteReport(retry) => assert_eq!(retry.attempts(), 3),
        other => panic!("expected RemoteReport, got {other:?}"),
    }
    assert_eq!(dashboard.calls.load(Ordering::SeqCst), 3);
    assert_eq!(sink.lines().len(), 1);
    assert!(approx(ledger.total("svc").await, 0.5));
}

#[tokio::test]
async fn test_dashboard_outage_precedes_alert() {
    let (ledger, _sink) = memory_ledger(0.1);
    let ledger = ledger
        .with_dashboard(Arc::new(FlakyDashboard::failing(u32::MAX)), dashboard_policy())
        .with_executor(RetryExecutor::with_sleeper(RecordingSleeper::new()));

    let err = ledger.record("svc", 0.5).await.unwrap_err();
    assert!(matches!(err, LedgerError::RemoteReport(_)));
}

#[tokio::test]
async fn test_http_dashboard_connection_refused() {
    let dashboard = HttpDashboard::new("http://127.0.0.1:1/usage");
    let err = dashboard
        .report(&CostRecord::now("svc", 0.1, 0.1))
        .await
        .unwrap_err();
    assert!(matches!(err, DashboardError::Http(_)));
}

#[test]
fn test_dashboard_config_policy() {
    let config = DashboardConfig::new("http://dash/usage")
        .with_retries(5)
        .with_timeout(Duration::from_millis(250));
    let policy = config.policy();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.timeout, Duration::from_millis(250));
    assert_eq!(policy.base_delay, Duration::from_secs(1));
}

// ============================================================================
// CSV log and replay
// ============================================================================

#[tokio::test]
async fn test_csv_log_creates_parent_and_appends() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("logs").join("daily").join("usage.csv");
    let config = LedgerConfig::default()
        .with_alert_limit(10.0)
        .with_log_path(&path);
    let ledger = UsageLedger::from_config(&config).unwrap();

    ledger.record("openrouter", 0.01).await.unwrap();
    ledger.record("openrouter", 0.02).await.unwrap();

    let content = tokio::fs::read_to_string(&path).await.unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(",openrouter,0.0100,0.0100"));
    assert!(lines[1].ends_with(",openrouter,0.0200,0.0300"));
}

#[tokio::test]
async fn test_open_replays_existing_log() {
    let dir = TempDir::new().unwrap();
    let config = LedgerConfig::default()
        .with_alert_limit(10.0)
        .with_log_path(dir.path().join("usage.csv"));

    {
        let ledger = UsageLedger::open(&config).await.unwrap();
        ledger.record("openrouter", 0.5).await.unwrap();
        ledger.record("pinecone", 0.25).await.unwrap();
        ledger.record("openrouter", 0.5).await.unwrap();
    }

    let reopened = UsageLedger::open(&config).await.unwrap();
    assert!(approx(reopened.total("openrouter").await, 1.0));
    assert!(approx(reopened.total("pinecone").await, 0.25));

    reopened.record("pinecone", 0.25).await.unwrap();
    assert!(approx(reopened.total("pinecone").await, 0.5));

    let snapshot = reopened.snapshot().await;
    assert_eq!(snapshot.totals.keys().collect::<Vec<_>>(), vec!["openrouter", "pinecone"]);
    assert_eq!(snapshot.alert_limit, 10.0);
}

#[tokio::test]
async fn test_open_missing_log_starts_empty() {
    let dir = TempDir::new().unwrap();
    let config = LedgerConfig::default().with_log_path(dir.path().join("absent.csv"));
    let ledger = UsageLedger::open(&config).await.unwrap();
    assert!(ledger.totals().await.is_empty());
}

#[tokio::test]
async fn test_replay_reports_malformed_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("usage.csv");
    tokio::fs::write(
        &path,
        "2024-01-01T00:00:00Z,svc,0.1000,0.1000\nnot a record\n",
    )
    .await
    .unwrap();

    let config = LedgerConfig::default().with_log_path(&path);
    let err = UsageLedger::open(&config).await.unwrap_err();
    match err {
        LedgerError::Replay { line, .. } => assert_eq!(line, 2),
        other => panic!("expected Replay, got {other:?}"),
    }
}
