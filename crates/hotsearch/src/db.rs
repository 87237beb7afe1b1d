use async_trait::async_trait;
use chrono::NaiveDate;
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime, Transaction};
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{DailyItems, HourlyItems, SnapshotStore};
use crate::types::{NormalizedRecord, Partition, SourceItems};

/// Connections kept by default. One refresh holds a single connection for
/// its transaction; live misses borrow one each.
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Connection pool for `database_url`, holding at most `max_size`
/// connections. Connections are opened lazily on first use.
pub fn create_pool(database_url: &str, max_size: usize) -> Result<Pool, StoreError> {
    database_url
        .parse::<tokio_postgres::Config>()
        .map_err(|e| StoreError::Pool(format!("invalid database URL: {}", e)))?;

    let mut cfg = Config::new();
    cfg.url = Some(database_url.to_string());
    cfg.pool = Some(PoolConfig::new(max_size.max(1)));

    cfg.create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| StoreError::Pool(e.to_string()))
}

/// Create the snapshot tables if they do not exist yet
pub async fn run_migrations(pool: &Pool) -> Result<(), StoreError> {
    let client = pool
        .get()
        .await
        .map_err(|e| StoreError::Pool(e.to_string()))?;

    client
        .batch_execute(include_str!("../migrations/001_initial.sql"))
        .await
        .map_err(|e| db_err("migration failed", e))?;

    info!("snapshot tables ready");
    Ok(())
}

/// PostgreSQL-backed snapshot store.
///
/// Every write runs in a single transaction, so batch writes are atomic
/// across sources. Rows carry an `ordinal` column that preserves write order
/// independently of the record's rank.
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> Result<deadpool_postgres::Object, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

const INSERT_LATEST: &str = "INSERT INTO latest_items \
     (source, ordinal, item_index, title, url, hot_value, description) \
     VALUES ($1, $2, $3, $4, $5, $6, $7)";

const INSERT_HISTORY: &str = "INSERT INTO history_items \
     (source, snapshot_date, snapshot_hour, ordinal, item_index, title, url, hot_value, description) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)";

fn db_err(context: &str, e: tokio_postgres::Error) -> StoreError {
    StoreError::Database(format!("{}: {}", context, e))
}

fn position_param(record: &NormalizedRecord) -> Result<i32, StoreError> {
    i32::try_from(record.position)
        .map_err(|_| StoreError::Corrupt(format!("position {} out of range", record.position)))
}

fn row_to_record(row: &Row) -> Result<NormalizedRecord, StoreError> {
    let position: i32 = row.get("item_index");
    Ok(NormalizedRecord {
        position: u32::try_from(position)
            .map_err(|_| StoreError::Corrupt(format!("negative item_index {}", position)))?,
        title: row.get("title"),
        url: row.get("url"),
        hot_value: row.get("hot_value"),
        description: row.get("description"),
    })
}

fn row_hour(row: &Row) -> Result<u8, StoreError> {
    let hour: i16 = row.get("snapshot_hour");
    u8::try_from(hour).map_err(|_| StoreError::Corrupt(format!("invalid snapshot_hour {}", hour)))
}

async fn write_latest(
    tx: &Transaction<'_>,
    source: &str,
    items: &[NormalizedRecord],
) -> Result<(), StoreError> {
    tx.execute("DELETE FROM latest_items WHERE source = $1", &[&source])
        .await
        .map_err(|e| db_err("delete latest", e))?;

    let stmt = tx
        .prepare(INSERT_LATEST)
        .await
        .map_err(|e| db_err("prepare latest insert", e))?;
    for (ordinal, item) in items.iter().enumerate() {
        let ordinal = ordinal as i32;
        let position = position_param(item)?;
        tx.execute(
            &stmt,
            &[
                &source,
                &ordinal,
                &position,
                &item.title,
                &item.url,
                &item.hot_value,
                &item.description,
            ],
        )
        .await
        .map_err(|e| db_err("insert latest", e))?;
    }
    Ok(())
}

#[async_trait]
impl SnapshotStore for PostgresStore {
    async fn get_latest(&self, source: &str) -> Result<Vec<NormalizedRecord>, StoreError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT item_index, title, url, hot_value, description \
                 FROM latest_items WHERE source = $1 ORDER BY ordinal",
                &[&source],
            )
            .await
            .map_err(|e| db_err("select latest", e))?;
        rows.iter().map(row_to_record).collect()
    }

    async fn replace_latest(
        &self,
        source: &str,
        items: &[NormalizedRecord],
    ) -> Result<(), StoreError> {
        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| db_err("begin tx", e))?;
        write_latest(&tx, source, items).await?;
        tx.commit().await.map_err(|e| db_err("commit", e))?;
        debug!(source, items = items.len(), "latest snapshot replaced");
        Ok(())
    }

    async fn get_all_latest(&self) -> Result<SourceItems, StoreError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT source, item_index, title, url, hot_value, description \
                 FROM latest_items ORDER BY source, ordinal",
                &[],
            )
            .await
            .map_err(|e| db_err("select all latest", e))?;

        let mut out = SourceItems::new();
        for row in &rows {
            let source: String = row.get("source");
            out.entry(source).or_default().push(row_to_record(row)?);
        }
        Ok(out)
    }

    async fn replace_all_latest(&self, batch: &SourceItems) -> Result<(), StoreError> {
        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| db_err("begin tx", e))?;
        for (source, items) in batch {
            write_latest(&tx, source, items).await?;
        }
        tx.commit().await.map_err(|e| db_err("commit", e))?;
        debug!(sources = batch.len(), "latest snapshots replaced");
        Ok(())
    }

    async fn append_partition(
        &self,
        partition: Partition,
        batch: &SourceItems,
    ) -> Result<(), StoreError> {
        let hour = partition.hour as i16;
        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| db_err("begin tx", e))?;
        let stmt = tx
            .prepare(INSERT_HISTORY)
            .await
            .map_err(|e| db_err("prepare history insert", e))?;

        for (source, items) in batch {
            tx.execute(
                "DELETE FROM history_items \
                 WHERE source = $1 AND snapshot_date = $2 AND snapshot_hour = $3",
                &[source, &partition.date, &hour],
            )
            .await
            .map_err(|e| db_err("delete partition", e))?;

            for (ordinal, item) in items.iter().enumerate() {
                let ordinal = ordinal as i32;
                let position = position_param(item)?;
                tx.execute(
                    &stmt,
                    &[
                        source,
                        &partition.date,
                        &hour,
                        &ordinal,
                        &position,
                        &item.title,
                        &item.url,
                        &item.hot_value,
                        &item.description,
                    ],
                )
                .await
                .map_err(|e| db_err("insert history", e))?;
            }
        }

        tx.commit().await.map_err(|e| db_err("commit", e))?;
        debug!(%partition, sources = batch.len(), "history partition written");
        Ok(())
    }

    async fn get_by_partition(
        &self,
        source: &str,
        partition: Partition,
    ) -> Result<Vec<NormalizedRecord>, StoreError> {
        let hour = partition.hour as i16;
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT item_index, title, url, hot_value, description FROM history_items \
                 WHERE source = $1 AND snapshot_date = $2 AND snapshot_hour = $3 \
                 ORDER BY ordinal",
                &[&source, &partition.date, &hour],
            )
            .await
            .map_err(|e| db_err("select partition", e))?;
        rows.iter().map(row_to_record).collect()
    }

    async fn get_by_date(&self, source: &str, date: NaiveDate) -> Result<HourlyItems, StoreError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT snapshot_hour, item_index, title, url, hot_value, description \
                 FROM history_items WHERE source = $1 AND snapshot_date = $2 \
                 ORDER BY snapshot_hour, ordinal",
                &[&source, &date],
            )
            .await
            .map_err(|e| db_err("select by date", e))?;

        let mut out = HourlyItems::new();
        for row in &rows {
            out.entry(row_hour(row)?)
                .or_default()
                .push(row_to_record(row)?);
        }
        Ok(out)
    }

    async fn get_by_source(&self, source: &str) -> Result<DailyItems, StoreError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT snapshot_date, snapshot_hour, item_index, title, url, hot_value, description \
                 FROM history_items WHERE source = $1 \
                 ORDER BY snapshot_date, snapshot_hour, ordinal",
                &[&source],
            )
            .await
            .map_err(|e| db_err("select by source", e))?;

        let mut out = DailyItems::new();
        for row in &rows {
            let date: NaiveDate = row.get("snapshot_date");
            out.entry(date)
                .or_default()
                .entry(row_hour(row)?)
                .or_default()
                .push(row_to_record(row)?);
        }
        Ok(out)
    }
}
