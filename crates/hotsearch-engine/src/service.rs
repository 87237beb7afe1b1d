use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use hotsearch::store::{DailyItems, HourlyItems};
use hotsearch::{
    FetchError, FetchOutcome, FetchResult, FetcherRegistry, NormalizedRecord, Partition,
    SnapshotStore, SourceDescriptor, SourceInfo, SourceItems, StoreError,
};

use crate::aggregator::Aggregator;
use crate::metrics::EngineMetrics;
use crate::singleflight::SingleFlight;

const ALL_SOURCES_KEY: &str = "*";

/// Read-through cache over the snapshot store.
///
/// Reads are served from the store's latest snapshot when one exists and
/// fall back to a live fetch otherwise. Live results are persisted on a
/// best-effort basis: a failed write is logged and the caller still gets
/// the data.
pub struct CacheService {
    registry: Arc<FetcherRegistry>,
    store: Arc<dyn SnapshotStore>,
    aggregator: Arc<Aggregator>,
    metrics: Arc<EngineMetrics>,
    source_flights: SingleFlight<Result<FetchResult, FetchError>>,
    all_flights: SingleFlight<Arc<SourceItems>>,
}

impl CacheService {
    pub fn new(
        aggregator: Arc<Aggregator>,
        store: Arc<dyn SnapshotStore>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            registry: Arc::clone(aggregator.registry()),
            store,
            aggregator,
            metrics,
            source_flights: SingleFlight::new(),
            all_flights: SingleFlight::new(),
        }
    }

    pub fn registry(&self) -> &Arc<FetcherRegistry> {
        &self.registry
    }

    /// Current list for one source.
    ///
    /// Unknown ids get an empty successful result without touching the store
    /// or the network. A hard fetch failure on a cache miss is returned to
    /// the caller; soft failures come back as the code-500 result.
    pub async fn get_source(&self, id: &str) -> Result<FetchResult, FetchError> {
        let Some(descriptor) = self.registry.get(id) else {
            debug!(source = id, "unknown source requested");
            return Ok(FetchResult::unknown_source(id));
        };

        match self.store.get_latest(&descriptor.id).await {
            Ok(items) if !items.is_empty() => {
                self.metrics.cache_hits.inc();
                return Ok(FetchResult::success(id, descriptor.icon.clone(), items));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(source = %descriptor.id, error = %e, "store read failed, falling back to live fetch")
            }
        }

        self.metrics.cache_misses.inc();
        info!(source = %descriptor.id, "cache miss, fetching live");

        let key = descriptor.id.clone();
        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        let (result, joined) = self
            .source_flights
            .run(&key, move || fetch_and_persist(descriptor, store, metrics))
            .await;
        if joined {
            self.metrics.singleflight_joins.inc();
            debug!(source = %key, "joined in-flight fetch");
        }
        // Live and cached answers both name the id the caller asked for
        result.map(|mut r| {
            if r.is_success() {
                r.message = id.to_string();
            }
            r
        })
    }

    /// Latest lists for every source.
    ///
    /// Served from the store when it holds data for any source. Only a
    /// completely empty store triggers a live fan-out, so sources missing
    /// from a partially populated store stay missing until the next refresh.
    pub async fn get_all(&self) -> SourceItems {
        match self.store.get_all_latest().await {
            Ok(items) if !items.is_empty() => {
                self.metrics.cache_hits.inc();
                return items;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "store read failed, falling back to live aggregation"),
        }

        self.metrics.cache_misses.inc();
        info!("store empty, aggregating all sources live");

        let aggregator = Arc::clone(&self.aggregator);
        let store = Arc::clone(&self.store);
        let metrics = Arc::clone(&self.metrics);
        let (items, joined) = self
            .all_flights
            .run(ALL_SOURCES_KEY, move || async move {
                let items = aggregator.aggregate_all().await;
                if !items.is_empty() {
                    if let Err(e) = store.replace_all_latest(&items).await {
                        metrics.persist_failures.inc();
                        error!(error = %e, sources = items.len(), "failed to persist aggregate");
                    }
                }
                Arc::new(items)
            })
            .await;
        if joined {
            self.metrics.singleflight_joins.inc();
        }
        (*items).clone()
    }

    pub fn list_sources(&self) -> Vec<SourceInfo> {
        self.registry.list_sources()
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.registry.list_ids()
    }

    /// History for one source at one (date, hour).
    pub async fn history_by_partition(
        &self,
        id: &str,
        partition: Partition,
    ) -> Result<Vec<NormalizedRecord>, StoreError> {
        self.store
            .get_by_partition(self.canonical(id), partition)
            .await
    }

    /// History for one source on one date, keyed by hour.
    pub async fn history_by_date(
        &self,
        id: &str,
        date: NaiveDate,
    ) -> Result<HourlyItems, StoreError> {
        self.store.get_by_date(self.canonical(id), date).await
    }

    /// All history for one source, keyed by date then hour.
    pub async fn history_by_source(&self, id: &str) -> Result<DailyItems, StoreError> {
        self.store.get_by_source(self.canonical(id)).await
    }

    fn canonical<'a>(&'a self, id: &'a str) -> &'a str {
        self.registry.resolve(id).unwrap_or(id)
    }
}

async fn fetch_and_persist(
    descriptor: Arc<SourceDescriptor>,
    store: Arc<dyn SnapshotStore>,
    metrics: Arc<EngineMetrics>,
) -> Result<FetchResult, FetchError> {
    let timer = metrics.fetch_duration.start_timer();
    let result = descriptor.fetcher.fetch().await;
    timer.observe_duration();
    metrics
        .fetch_outcomes
        .with_label_values(&[descriptor.id.as_str(), FetchOutcome::label_of(&result)])
        .inc();

    match &result {
        Ok(r) if r.is_success() && !r.items.is_empty() => {
            if let Err(e) = store.replace_latest(&descriptor.id, &r.items).await {
                metrics.persist_failures.inc();
                error!(source = %descriptor.id, error = %e, "failed to persist live fetch");
            }
        }
        Ok(r) => warn!(source = %descriptor.id, message = %r.message, "live fetch returned no data"),
        Err(e) => warn!(source = %descriptor.id, error = %e, "live fetch failed"),
    }
    result
}
