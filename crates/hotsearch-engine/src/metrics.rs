/// Engine metrics, registered against the caller's registry.
pub struct EngineMetrics {
    pub fetch_outcomes: prometheus::IntCounterVec,
    pub fetch_duration: prometheus::Histogram,
    pub cache_hits: prometheus::IntCounter,
    pub cache_misses: prometheus::IntCounter,
    pub singleflight_joins: prometheus::IntCounter,
    pub persist_failures: prometheus::IntCounter,
    pub refresh_runs: prometheus::IntCounterVec,
    pub refresh_duration: prometheus::Histogram,
    pub refresh_last_success: prometheus::IntGauge,
}

impl EngineMetrics {
    pub fn new(registry: &prometheus::Registry) -> Self {
        let fetch_outcomes = prometheus::IntCounterVec::new(
            prometheus::Opts::new("hotsearch_fetch_total", "Fetcher calls by source and outcome"),
            &["source", "outcome"],
        )
        .unwrap();
        let fetch_duration = prometheus::Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "hotsearch_fetch_duration_seconds",
                "Duration of a single fetcher call",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )
        .unwrap();
        let cache_hits =
            prometheus::IntCounter::new("hotsearch_cache_hits_total", "Reads served from the store")
                .unwrap();
        let cache_misses = prometheus::IntCounter::new(
            "hotsearch_cache_misses_total",
            "Reads that fell back to a live fetch",
        )
        .unwrap();
        let singleflight_joins = prometheus::IntCounter::new(
            "hotsearch_singleflight_joins_total",
            "Cache misses that joined an in-flight fetch",
        )
        .unwrap();
        let persist_failures = prometheus::IntCounter::new(
            "hotsearch_persist_failures_total",
            "Store writes that failed",
        )
        .unwrap();
        let refresh_runs = prometheus::IntCounterVec::new(
            prometheus::Opts::new("hotsearch_refresh_runs_total", "Scheduled refresh runs by result"),
            &["result"],
        )
        .unwrap();
        let refresh_duration = prometheus::Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "hotsearch_refresh_duration_seconds",
                "Refresh cycle duration",
            )
            .buckets(vec![1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]),
        )
        .unwrap();
        let refresh_last_success = prometheus::IntGauge::new(
            "hotsearch_refresh_last_success_timestamp",
            "Epoch seconds of last fully persisted refresh",
        )
        .unwrap();

        registry.register(Box::new(fetch_outcomes.clone())).unwrap();
        registry.register(Box::new(fetch_duration.clone())).unwrap();
        registry.register(Box::new(cache_hits.clone())).unwrap();
        registry.register(Box::new(cache_misses.clone())).unwrap();
        registry.register(Box::new(singleflight_joins.clone())).unwrap();
        registry.register(Box::new(persist_failures.clone())).unwrap();
        registry.register(Box::new(refresh_runs.clone())).unwrap();
        registry.register(Box::new(refresh_duration.clone())).unwrap();
        registry.register(Box::new(refresh_last_success.clone())).unwrap();

        Self {
            fetch_outcomes,
            fetch_duration,
            cache_hits,
            cache_misses,
            singleflight_joins,
            persist_failures,
            refresh_runs,
            refresh_duration,
            refresh_last_success,
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new(&prometheus::Registry::new())
    }
}
