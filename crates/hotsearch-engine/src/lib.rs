//! Aggregation engine: fan-out over every source, the read-through cache,
//! and the scheduled refresher.

pub mod aggregator;
pub mod metrics;
pub mod refresher;
pub mod service;
pub mod singleflight;

use std::sync::Arc;
use std::time::Duration;

use hotsearch::{FetcherRegistry, SnapshotStore};

pub use aggregator::Aggregator;
pub use metrics::EngineMetrics;
pub use refresher::{RefreshOutcome, Refresher};
pub use service::CacheService;

/// The engine's components, wired to one registry and one store.
pub struct Engine {
    pub aggregator: Arc<Aggregator>,
    pub service: Arc<CacheService>,
    pub refresher: Arc<Refresher>,
    pub metrics: Arc<EngineMetrics>,
}

impl Engine {
    pub fn new(
        registry: Arc<FetcherRegistry>,
        store: Arc<dyn SnapshotStore>,
        refresh_period: Duration,
        metrics: EngineMetrics,
    ) -> Self {
        let metrics = Arc::new(metrics);
        let aggregator = Arc::new(Aggregator::new(registry, Arc::clone(&metrics)));
        let service = Arc::new(CacheService::new(
            Arc::clone(&aggregator),
            Arc::clone(&store),
            Arc::clone(&metrics),
        ));
        let refresher = Arc::new(Refresher::new(
            Arc::clone(&aggregator),
            store,
            refresh_period,
            Arc::clone(&metrics),
        ));
        Self {
            aggregator,
            service,
            refresher,
            metrics,
        }
    }
}
