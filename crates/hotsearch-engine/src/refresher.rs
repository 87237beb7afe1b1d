use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio::sync::{broadcast, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use hotsearch::{AggregateSnapshot, Partition, SnapshotStore};

use crate::aggregator::Aggregator;
use crate::metrics::EngineMetrics;

const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Result of one refresh attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Aggregation produced data for `sources` sources. `persisted` is false
    /// if either store write failed.
    Completed { sources: usize, persisted: bool },
    /// No source succeeded; nothing was written.
    Empty,
    /// Another refresh was already running.
    Skipped,
}

/// Periodic background refresh of every source.
///
/// Each run aggregates all sources, overwrites the latest snapshots, writes
/// the current (date, hour) history partition, and announces the snapshot
/// to subscribers. Runs never overlap.
pub struct Refresher {
    aggregator: Arc<Aggregator>,
    store: Arc<dyn SnapshotStore>,
    period: Duration,
    metrics: Arc<EngineMetrics>,
    running: Semaphore,
    completed: broadcast::Sender<Arc<AggregateSnapshot>>,
    shutdown: CancellationToken,
}

impl Refresher {
    pub fn new(
        aggregator: Arc<Aggregator>,
        store: Arc<dyn SnapshotStore>,
        period: Duration,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let (completed, _) = broadcast::channel(16);
        Self {
            aggregator,
            store,
            period: period.max(MIN_PERIOD),
            metrics,
            running: Semaphore::new(1),
            completed,
            shutdown: CancellationToken::new(),
        }
    }

    /// Receive every snapshot a run completes with.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AggregateSnapshot>> {
        self.completed.subscribe()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Refresh immediately, then once per period. Blocks until shutdown.
    pub async fn run(&self) {
        info!(period_secs = self.period.as_secs(), "refresher started");
        tokio::select! {
            () = self.tick_loop() => {}
            () = self.shutdown.cancelled() => {
                info!("refresher shutting down");
            }
        }
    }

    async fn tick_loop(&self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.refresh_once().await;
        }
    }

    /// Run one refresh now unless one is already running.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let Ok(_permit) = self.running.try_acquire() else {
            warn!("refresh already running, skipping");
            self.metrics
                .refresh_runs
                .with_label_values(&["skipped"])
                .inc();
            return RefreshOutcome::Skipped;
        };

        let timer = self.metrics.refresh_duration.start_timer();
        let created_at = Utc::now();
        let partition = Partition::at(&created_at.with_timezone(&Local));
        info!(%partition, "refresh starting");

        let items = self.aggregator.aggregate_all().await;
        if items.is_empty() {
            timer.observe_duration();
            warn!(%partition, "refresh produced no data, nothing persisted");
            self.metrics.refresh_runs.with_label_values(&["empty"]).inc();
            return RefreshOutcome::Empty;
        }

        let mut persisted = true;
        if let Err(e) = self.store.replace_all_latest(&items).await {
            persisted = false;
            self.metrics.persist_failures.inc();
            error!(error = %e, sources = items.len(), "failed to replace latest snapshots");
        }
        if let Err(e) = self.store.append_partition(partition, &items).await {
            persisted = false;
            self.metrics.persist_failures.inc();
            error!(error = %e, %partition, "failed to write history partition");
        }
        timer.observe_duration();

        let sources = items.len();
        if persisted {
            self.metrics
                .refresh_last_success
                .set(Utc::now().timestamp());
            self.metrics
                .refresh_runs
                .with_label_values(&["completed"])
                .inc();
            info!(sources, %partition, "refresh complete");
        } else {
            self.metrics
                .refresh_runs
                .with_label_values(&["persist_failed"])
                .inc();
        }

        // No subscribers is fine
        let _ = self.completed.send(Arc::new(AggregateSnapshot {
            items,
            created_at,
            partition,
        }));

        RefreshOutcome::Completed { sources, persisted }
    }
}
