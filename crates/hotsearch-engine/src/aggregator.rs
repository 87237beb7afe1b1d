use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use hotsearch::{FetchOutcome, FetcherRegistry, SourceItems};

use crate::metrics::EngineMetrics;

/// Concurrent fan-out over every registered source.
pub struct Aggregator {
    registry: Arc<FetcherRegistry>,
    metrics: Arc<EngineMetrics>,
}

impl Aggregator {
    pub fn new(registry: Arc<FetcherRegistry>, metrics: Arc<EngineMetrics>) -> Self {
        Self { registry, metrics }
    }

    pub fn registry(&self) -> &Arc<FetcherRegistry> {
        &self.registry
    }

    /// Call every fetcher concurrently and collect the ones that succeed.
    ///
    /// Never fails. Sources that error or answer with a soft failure are
    /// logged and left out of the result. Each fetch runs on its own task and
    /// reports through a channel to this single collector, so no map is
    /// shared between tasks; the call returns once every sender is gone.
    pub async fn aggregate_all(&self) -> SourceItems {
        let (tx, mut rx) = mpsc::channel(self.registry.len().max(1));

        for source in self.registry.sources() {
            let source = Arc::clone(source);
            let tx = tx.clone();
            let metrics = Arc::clone(&self.metrics);
            tokio::spawn(async move {
                let timer = metrics.fetch_duration.start_timer();
                let outcome = FetchOutcome::classify(source.fetcher.fetch().await);
                timer.observe_duration();
                // Receiver outlives all senders
                let _ = tx.send((source.id.clone(), outcome)).await;
            });
        }
        drop(tx);

        let mut collected = SourceItems::new();
        let mut failed = 0usize;
        while let Some((id, outcome)) = rx.recv().await {
            self.metrics
                .fetch_outcomes
                .with_label_values(&[id.as_str(), outcome.label()])
                .inc();
            match outcome {
                FetchOutcome::Success(result) => {
                    debug!(source = %id, items = result.items.len(), "source fetched");
                    collected.insert(id, result.items);
                }
                FetchOutcome::EmptyUpstream { reason } => {
                    failed += 1;
                    warn!(source = %id, reason = %reason, "source returned no data");
                }
                FetchOutcome::TransportError(e) => {
                    failed += 1;
                    warn!(source = %id, error = %e, "source fetch failed");
                }
            }
        }

        info!(
            succeeded = collected.len(),
            failed,
            registered = self.registry.len(),
            "aggregation complete"
        );
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use hotsearch::test_helpers::MockFetcher;

    fn aggregator(fetchers: Vec<(&str, MockFetcher)>) -> Aggregator {
        let mut registry = FetcherRegistry::new();
        for (id, fetcher) in fetchers {
            registry.register(id, id, "", Arc::new(fetcher)).unwrap();
        }
        Aggregator::new(Arc::new(registry), Arc::new(EngineMetrics::default()))
    }

    #[tokio::test]
    async fn test_all_sources_succeed() {
        let agg = aggregator(vec![
            ("a", MockFetcher::succeeding("a", 3)),
            ("b", MockFetcher::succeeding("b", 1)),
            ("c", MockFetcher::succeeding("c", 2)),
        ]);
        let result = agg.aggregate_all().await;
        let mut ids: Vec<_> = result.keys().cloned().collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(result["a"].len(), 3);
    }

    #[tokio::test]
    async fn test_hard_failure_is_omitted() {
        let agg = aggregator(vec![
            ("a", MockFetcher::succeeding("a", 3)),
            ("b", MockFetcher::failing("b")),
        ]);
        let result = agg.aggregate_all().await;
        assert_eq!(result.len(), 1);
        assert_eq!(result["a"].len(), 3);
        assert!(!result.contains_key("b"));
    }

    #[tokio::test]
    async fn test_soft_failure_is_omitted() {
        let agg = aggregator(vec![
            ("a", MockFetcher::succeeding("a", 2)),
            ("b", MockFetcher::soft_failing("b", "layout changed")),
        ]);
        let result = agg.aggregate_all().await;
        assert!(result.contains_key("a"));
        assert!(!result.contains_key("b"));
    }

    #[tokio::test]
    async fn test_every_fetcher_called_once() {
        let a = MockFetcher::succeeding("a", 1);
        let b = MockFetcher::failing("b");
        let agg = aggregator(vec![("a", a.clone()), ("b", b.clone())]);
        agg.aggregate_all().await;
        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_source_does_not_drop_fast_ones() {
        let slow = MockFetcher::succeeding("slow", 1).with_delay(Duration::from_secs(8));
        let agg = aggregator(vec![
            ("fast", MockFetcher::succeeding("fast", 2)),
            ("slow", slow),
        ]);
        let result = agg.aggregate_all().await;
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let agg = aggregator(vec![]);
        assert!(agg.aggregate_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_outcomes_are_counted() {
        let registry = prometheus::Registry::new();
        let metrics = Arc::new(EngineMetrics::new(&registry));
        let mut sources = FetcherRegistry::new();
        sources
            .register("a", "a", "", Arc::new(MockFetcher::succeeding("a", 1)))
            .unwrap();
        sources
            .register("b", "b", "", Arc::new(MockFetcher::failing("b")))
            .unwrap();
        let agg = Aggregator::new(Arc::new(sources), Arc::clone(&metrics));
        agg.aggregate_all().await;

        assert_eq!(
            metrics
                .fetch_outcomes
                .with_label_values(&["a", "success"])
                .get(),
            1
        );
        assert_eq!(
            metrics
                .fetch_outcomes
                .with_label_values(&["b", "transport_error"])
                .get(),
            1
        );
    }
}
