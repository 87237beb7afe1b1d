use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{DailyItems, HourlyItems, SnapshotStore};
use crate::types::{NormalizedRecord, Partition, SourceItems};

#[derive(Default)]
struct StoreData {
    latest: SourceItems,
    history: HashMap<String, BTreeMap<Partition, Vec<NormalizedRecord>>>,
}

/// Process-local snapshot store.
///
/// Batch writes take one write lock, so they are atomic across sources.
/// Nothing survives a restart.
pub struct InMemoryStore {
    data: Arc<RwLock<StoreData>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(StoreData::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn put_latest(latest: &mut SourceItems, source: &str, items: &[NormalizedRecord]) {
    if items.is_empty() {
        latest.remove(source);
    } else {
        latest.insert(source.to_string(), items.to_vec());
    }
}

#[async_trait]
impl SnapshotStore for InMemoryStore {
    async fn get_latest(&self, source: &str) -> Result<Vec<NormalizedRecord>, StoreError> {
        let data = self.data.read().await;
        Ok(data.latest.get(source).cloned().unwrap_or_default())
    }

    async fn replace_latest(
        &self,
        source: &str,
        items: &[NormalizedRecord],
    ) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        put_latest(&mut data.latest, source, items);
        Ok(())
    }

    async fn get_all_latest(&self) -> Result<SourceItems, StoreError> {
        let data = self.data.read().await;
        Ok(data.latest.clone())
    }

    async fn replace_all_latest(&self, batch: &SourceItems) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        for (source, items) in batch {
            put_latest(&mut data.latest, source, items);
        }
        Ok(())
    }

    async fn append_partition(
        &self,
        partition: Partition,
        batch: &SourceItems,
    ) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        for (source, items) in batch {
            data.history
                .entry(source.clone())
                .or_default()
                .insert(partition, items.clone());
        }
        Ok(())
    }

    async fn get_by_partition(
        &self,
        source: &str,
        partition: Partition,
    ) -> Result<Vec<NormalizedRecord>, StoreError> {
        let data = self.data.read().await;
        Ok(data
            .history
            .get(source)
            .and_then(|h| h.get(&partition))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_by_date(&self, source: &str, date: NaiveDate) -> Result<HourlyItems, StoreError> {
        let data = self.data.read().await;
        let Some(history) = data.history.get(source) else {
            return Ok(HourlyItems::new());
        };
        Ok(history
            .iter()
            .filter(|(p, items)| p.date == date && !items.is_empty())
            .map(|(p, items)| (p.hour, items.clone()))
            .collect())
    }

    async fn get_by_source(&self, source: &str) -> Result<DailyItems, StoreError> {
        let data = self.data.read().await;
        let mut out = DailyItems::new();
        if let Some(history) = data.history.get(source) {
            for (p, items) in history.iter().filter(|(_, items)| !items.is_empty()) {
                out.entry(p.date).or_default().insert(p.hour, items.clone());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::records;

    fn partition(day: u32, hour: u8) -> Partition {
        Partition::new(NaiveDate::from_ymd_opt(2025, 6, day).unwrap(), hour).unwrap()
    }

    #[tokio::test]
    async fn test_latest_roundtrip_preserves_order() {
        let store = InMemoryStore::new();
        assert!(store.get_latest("baidu").await.unwrap().is_empty());

        let items = records("baidu", 5);
        store.replace_latest("baidu", &items).await.unwrap();
        assert_eq!(store.get_latest("baidu").await.unwrap(), items);
    }

    #[tokio::test]
    async fn test_replace_latest_overwrites() {
        let store = InMemoryStore::new();
        store.replace_latest("baidu", &records("baidu", 5)).await.unwrap();
        store.replace_latest("baidu", &records("baidu", 2)).await.unwrap();
        assert_eq!(store.get_latest("baidu").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replace_all_keeps_untouched_sources() {
        let store = InMemoryStore::new();
        store.replace_latest("weibo", &records("weibo", 3)).await.unwrap();

        let mut batch = SourceItems::new();
        batch.insert("baidu".into(), records("baidu", 2));
        batch.insert("zhihu".into(), records("zhihu", 4));
        store.replace_all_latest(&batch).await.unwrap();

        let all = store.get_all_latest().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all["weibo"].len(), 3);
        assert_eq!(all["zhihu"].len(), 4);
    }

    #[tokio::test]
    async fn test_empty_replace_clears_source() {
        let store = InMemoryStore::new();
        store.replace_latest("baidu", &records("baidu", 2)).await.unwrap();
        store.replace_latest("baidu", &[]).await.unwrap();
        assert!(store.get_all_latest().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_views() {
        let store = InMemoryStore::new();
        let mut batch = SourceItems::new();
        batch.insert("baidu".into(), records("baidu", 2));

        store.append_partition(partition(1, 9), &batch).await.unwrap();
        store.append_partition(partition(1, 10), &batch).await.unwrap();
        store.append_partition(partition(2, 0), &batch).await.unwrap();

        let at = store.get_by_partition("baidu", partition(1, 10)).await.unwrap();
        assert_eq!(at.len(), 2);
        assert!(store
            .get_by_partition("baidu", partition(1, 11))
            .await
            .unwrap()
            .is_empty());

        let day = store
            .get_by_date("baidu", NaiveDate::from_ymd_opt(2025, 6, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(day.keys().copied().collect::<Vec<_>>(), vec![9, 10]);

        let all = store.get_by_source("baidu").await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(store.get_by_source("zhihu").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_same_partition_is_replaced() {
        let store = InMemoryStore::new();
        let mut batch = SourceItems::new();
        batch.insert("baidu".into(), records("baidu", 5));
        store.append_partition(partition(3, 8), &batch).await.unwrap();

        batch.insert("baidu".into(), records("baidu", 1));
        store.append_partition(partition(3, 8), &batch).await.unwrap();

        let items = store.get_by_partition("baidu", partition(3, 8)).await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn test_history_does_not_touch_latest() {
        let store = InMemoryStore::new();
        let mut batch = SourceItems::new();
        batch.insert("baidu".into(), records("baidu", 2));
        store.append_partition(partition(4, 1), &batch).await.unwrap();
        assert!(store.get_latest("baidu").await.unwrap().is_empty());
    }
}
