//! Retried, cost-accounted vector store

use crate::error::{Error, Result};
use crate::store::{Match, VectorRecord, VectorStore};
use async_trait::async_trait;
use densex_core::{RetryExecutor, RetryPolicy, UsageLedger};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Wraps a [`VectorStore`] with input validation, retries and upsert costs.
///
/// Upsert costs are recorded under the inner store's name (`"pinecone"`
/// for [`crate::PineconeIndex`]).
#[derive(Debug)]
pub struct RetryingStore<S> {
    inner: S,
    policy: RetryPolicy,
    executor: RetryExecutor,
    ledger: Option<Arc<UsageLedger>>,
    upsert_cost: f64,
}

impl<S: VectorStore> RetryingStore<S> {
    /// 3 attempts, 10 s timeout, 1 s base delay, no ledger
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            policy: RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(10)),
            executor: RetryExecutor::new(),
            ledger: None,
            upsert_cost: 0.0,
        }
    }

    /// Set the retry policy for both operations
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Use a custom executor
    #[must_use]
    pub fn with_executor(mut self, executor: RetryExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Charge `upsert_cost` to `ledger` for every successful upsert
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<UsageLedger>, upsert_cost: f64) -> Self {
        self.ledger = Some(ledger);
        self.upsert_cost = upsert_cost;
        self
    }

    /// Wrapped store
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: VectorStore> VectorStore for RetryingStore<S> {
    #[instrument(skip(self, records), fields(store = self.inner.name(), count = records.len()))]
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Err(Error::InvalidInput("no items provided".to_string()));
        }

        let inner = &self.inner;
        let written = self
            .executor
            .execute(&self.policy, || inner.upsert(records))
            .await
            .map_err(Error::Upsert)?;

        if let Some(ledger) = &self.ledger {
            ledger.record(self.inner.name(), self.upsert_cost).await?;
        }

        debug!(written, "upsert complete");
        Ok(written)
    }

    #[instrument(skip(self, vector), fields(store = self.inner.name()))]
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>> {
        if vector.is_empty() {
            return Err(Error::InvalidInput("vector required".to_string()));
        }
        if top_k == 0 {
            return Err(Error::InvalidInput("top_k must be positive".to_string()));
        }

        let inner = &self.inner;
        self.executor
            .execute(&self.policy, || inner.query(vector, top_k))
            .await
            .map_err(Error::Query)
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn persist(&self) -> Result<()> {
        self.inner.persist().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use densex_core::{CostRecord, CostSink, RecordingSleeper};
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Default)]
    struct NullSink;

    #[async_trait]
    impl CostSink for NullSink {
        async fn append(&self, _record: &CostRecord) -> io::Result<()> {
            Ok(())
        }
    }

    /// Fails the first `failures` calls of each operation
    #[derive(Default)]
    struct FlakyStore {
        failures: u32,
        upserts: AtomicU32,
        queries: AtomicU32,
    }

    #[async_trait]
    impl VectorStore for FlakyStore {
        async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
            if self.upserts.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(Error::Api("503".to_string()));
            }
            Ok(records.len())
        }

        async fn query(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<Match>> {
            if self.queries.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(Error::Api("503".to_string()));
            }
            Ok(vec![Match {
                id: "hit".to_string(),
                score: 0.9,
                metadata: Default::default(),
            }])
        }

        fn name(&self) -> &str {
            "pinecone"
        }
    }

    fn store(failures: u32) -> (RetryingStore<FlakyStore>, RecordingSleeper) {
        let sleeper = RecordingSleeper::new();
        let store = RetryingStore::new(FlakyStore {
            failures,
            ..FlakyStore::default()
        })
        .with_executor(RetryExecutor::with_sleeper(sleeper.clone()));
        (store, sleeper)
    }

    #[tokio::test]
    async fn test_empty_upsert_rejected() {
        let (store, _) = store(0);
        let err = store.upsert(&[]).await.unwrap_err();
        assert_eq!(err.to_string(), "no items provided");
        assert_eq!(store.inner().upserts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_query_vector_rejected() {
        let (store, _) = store(0);
        let err = store.query(&[], 1).await.unwrap_err();
        assert_eq!(err.to_string(), "vector required");
        assert_eq!(store.inner().queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_query_retries() {
        let (store, sleeper) = store(2);
        let matches = store.query(&[0.1, 0.2], 1).await.unwrap();
        assert_eq!(matches[0].id, "hit");
        assert_eq!(store.inner().queries.load(Ordering::SeqCst), 3);
        assert_eq!(
            sleeper.delays(),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn test_query_exhaustion() {
        let (store, _) = store(u32::MAX);
        let err = store.query(&[0.1], 1).await.unwrap_err();
        assert_eq!(err.to_string(), "query failed");
        assert!(matches!(err, Error::Query(ref retry) if retry.attempts() == 3));
    }

    #[tokio::test]
    async fn test_upsert_cost_recorded() {
        let ledger = Arc::new(UsageLedger::new(100.0, Arc::new(NullSink)).unwrap());
        let (store, _) = store(1);
        let store = store.with_ledger(ledger.clone(), 0.05);

        let records = vec![VectorRecord::new("a", vec![0.1])];
        assert_eq!(store.upsert(&records).await.unwrap(), 1);
        store.upsert(&records).await.unwrap();

        assert!((ledger.total("pinecone").await - 0.1).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_upsert_exhaustion_records_nothing() {
        let ledger = Arc::new(UsageLedger::new(100.0, Arc::new(NullSink)).unwrap());
        let (store, _) = store(u32::MAX);
        let store = store.with_ledger(ledger.clone(), 0.05);

        let err = store
            .upsert(&[VectorRecord::new("a", vec![0.1])])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "upsert failed");
        assert_eq!(ledger.total("pinecone").await, 0.0);
    }

    #[tokio::test]
    async fn test_upsert_budget_breach() {
        let ledger = Arc::new(UsageLedger::new(0.05, Arc::new(NullSink)).unwrap());
        let (store, _) = store(0);
        let store = store.with_ledger(ledger, 0.05);

        let err = store
            .upsert(&[VectorRecord::new("a", vec![0.1])])
            .await
            .unwrap_err();
        assert!(err.is_budget_exceeded());
    }
}
