//! Test helpers for the aggregation pipeline.
//!
//! Provides a `MockFetcher` implementing `Fetcher` with configurable
//! behavior and a call counter, a `FailingStore` whose writes always fail,
//! and builders for normalized records.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::error::{FetchError, StoreError};
use crate::fetcher::Fetcher;
use crate::memory::InMemoryStore;
use crate::store::{DailyItems, HourlyItems, SnapshotStore};
use crate::types::{FetchResult, NormalizedRecord, Partition, SourceItems};

/// `count` records for `source`, positions 1..=count.
pub fn records(source: &str, count: usize) -> Vec<NormalizedRecord> {
    (1..=count)
        .map(|i| {
            NormalizedRecord::new(
                i as u32,
                format!("{} item {}", source, i),
                format!("https://{}.example.com/{}", source, i),
            )
        })
        .collect()
}

/// Configurable response for `fetch`.
#[derive(Clone, Debug)]
pub enum FetchBehavior {
    /// Return Ok with code 200 and the given items.
    Succeed(Vec<NormalizedRecord>),
    /// Return Ok with code 500 and the given reason.
    SoftFail(String),
    /// Return Err.
    Fail(FetchError),
}

/// Internal state for MockFetcher, protected by a Mutex.
#[derive(Debug)]
pub struct MockFetcherState {
    pub source: String,
    pub behavior: FetchBehavior,
    /// Sleep before answering, to widen race windows in tests.
    pub delay: Option<Duration>,
}

/// Mock fetcher with configurable behavior and a call counter.
#[derive(Clone)]
pub struct MockFetcher {
    pub state: Arc<Mutex<MockFetcherState>>,
    calls: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new(source: &str, behavior: FetchBehavior) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockFetcherState {
                source: source.to_string(),
                behavior,
                delay: None,
            })),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always succeeds with `count` records.
    pub fn succeeding(source: &str, count: usize) -> Self {
        Self::new(source, FetchBehavior::Succeed(records(source, count)))
    }

    /// Always fails with a transport error.
    pub fn failing(source: &str) -> Self {
        Self::new(
            source,
            FetchBehavior::Fail(FetchError::Transport {
                url: format!("https://{}.example.com", source),
                reason: "connection refused".to_string(),
            }),
        )
    }

    /// Always answers with a code-500 result.
    pub fn soft_failing(source: &str, reason: &str) -> Self {
        Self::new(source, FetchBehavior::SoftFail(reason.to_string()))
    }

    /// Delay every answer by `delay`. Applies to all clones of this mock.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state
            .try_lock()
            .expect("MockFetcher state is locked by an in-flight fetch")
            .delay = Some(delay);
        self
    }

    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.delay = delay;
    }

    pub async fn set_behavior(&self, behavior: FetchBehavior) {
        self.state.lock().await.behavior = behavior;
    }

    /// Number of times `fetch` has been called.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self) -> Result<FetchResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (source, behavior, delay) = {
            let state = self.state.lock().await;
            (state.source.clone(), state.behavior.clone(), state.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match behavior {
            FetchBehavior::Succeed(items) => Ok(FetchResult::success(
                source.clone(),
                format!("https://{}.example.com/favicon.ico", source),
                items,
            )),
            FetchBehavior::SoftFail(reason) => Ok(FetchResult::empty_upstream(
                reason,
                format!("https://{}.example.com/favicon.ico", source),
            )),
            FetchBehavior::Fail(e) => Err(e),
        }
    }
}

/// Store whose reads pass through to an in-memory store and whose writes
/// always fail. Counts attempted writes.
pub struct FailingStore {
    inner: InMemoryStore,
    write_attempts: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            write_attempts: AtomicUsize::new(0),
        }
    }

    pub fn write_attempts(&self) -> usize {
        self.write_attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> Result<(), StoreError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Database("disk full".to_string()))
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for FailingStore {
    async fn get_latest(&self, source: &str) -> Result<Vec<NormalizedRecord>, StoreError> {
        self.inner.get_latest(source).await
    }

    async fn replace_latest(&self, _: &str, _: &[NormalizedRecord]) -> Result<(), StoreError> {
        self.fail()
    }

    async fn get_all_latest(&self) -> Result<SourceItems, StoreError> {
        self.inner.get_all_latest().await
    }

    async fn replace_all_latest(&self, _: &SourceItems) -> Result<(), StoreError> {
        self.fail()
    }

    async fn append_partition(&self, _: Partition, _: &SourceItems) -> Result<(), StoreError> {
        self.fail()
    }

    async fn get_by_partition(
        &self,
        source: &str,
        partition: Partition,
    ) -> Result<Vec<NormalizedRecord>, StoreError> {
        self.inner.get_by_partition(source, partition).await
    }

    async fn get_by_date(&self, source: &str, date: NaiveDate) -> Result<HourlyItems, StoreError> {
        self.inner.get_by_date(source, date).await
    }

    async fn get_by_source(&self, source: &str) -> Result<DailyItems, StoreError> {
        self.inner.get_by_source(source).await
    }
}

/// Create a pool and run migrations against `DATABASE_URL`.
pub async fn setup_test_db() -> Result<deadpool_postgres::Pool, String> {
    let url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL not set".to_string())?;
    let pool =
        crate::db::create_pool(&url, crate::db::DEFAULT_POOL_SIZE).map_err(|e| e.to_string())?;
    crate::db::run_migrations(&pool)
        .await
        .map_err(|e| e.to_string())?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_delay_applies_to_shared_clones() {
        let original = MockFetcher::succeeding("a", 1);
        let registered = original.clone();
        let original = original.with_delay(Duration::from_secs(2));

        let started = tokio::time::Instant::now();
        registered.fetch().await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert_eq!(original.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_delay_clears_delay() {
        let fetcher = MockFetcher::succeeding("a", 1).with_delay(Duration::from_secs(5));
        fetcher.set_delay(None).await;

        let started = tokio::time::Instant::now();
        fetcher.fetch().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
