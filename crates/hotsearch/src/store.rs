use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;
use crate::types::{NormalizedRecord, Partition, SourceItems};

/// Hour of day -> items
pub type HourlyItems = BTreeMap<u8, Vec<NormalizedRecord>>;
/// Date -> hour of day -> items
pub type DailyItems = BTreeMap<NaiveDate, HourlyItems>;

/// Persistence for source snapshots.
///
/// Two independent views are kept: the latest snapshot per source
/// (overwritten on every save) and a history partitioned by (date, hour).
/// Writers choose which view to touch; nothing writes both implicitly.
/// Items are always returned in the order they were written.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Latest items for one source. Empty if none are stored.
    async fn get_latest(&self, source: &str) -> Result<Vec<NormalizedRecord>, StoreError>;

    /// Replace the latest items for one source.
    async fn replace_latest(
        &self,
        source: &str,
        items: &[NormalizedRecord],
    ) -> Result<(), StoreError>;

    /// Latest items for every source that has any.
    async fn get_all_latest(&self) -> Result<SourceItems, StoreError>;

    /// Replace the latest items for every source in `batch`.
    ///
    /// Sources absent from `batch` keep their previous snapshot. Both
    /// backends apply the batch atomically.
    async fn replace_all_latest(&self, batch: &SourceItems) -> Result<(), StoreError>;

    /// Record `batch` as the history partition `partition`.
    ///
    /// Writing the same partition again replaces it for the sources in
    /// `batch`; other partitions and sources are untouched.
    async fn append_partition(
        &self,
        partition: Partition,
        batch: &SourceItems,
    ) -> Result<(), StoreError>;

    /// History for one source at one (date, hour).
    async fn get_by_partition(
        &self,
        source: &str,
        partition: Partition,
    ) -> Result<Vec<NormalizedRecord>, StoreError>;

    /// History for one source on one date, keyed by hour.
    async fn get_by_date(&self, source: &str, date: NaiveDate) -> Result<HourlyItems, StoreError>;

    /// All history for one source, keyed by date then hour.
    async fn get_by_source(&self, source: &str) -> Result<DailyItems, StoreError>;
}
