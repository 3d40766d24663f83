//! Deduplicator: enforces one row per natural key in the dimension tables
//!
//! Loaders insert without conflict checks, so repeated or overlapping loads
//! leave duplicates behind. For each table this pass picks one representative
//! row per duplicated key, deletes every row for those keys and reinserts the
//! representatives, all inside a single transaction.

use serde::{Deserialize, Serialize};

use crate::error::{EtlError, EtlResult};
use crate::loader::{
    ARTIST_COLUMNS, ARTISTS_TABLE, SONG_COLUMNS, SONGS_TABLE, USER_COLUMNS, USERS_TABLE,
};
use crate::warehouse::{Warehouse, WarehouseError};

/// A dimension table and how to pick its representative rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupTarget {
    pub table: &'static str,
    /// Natural key column
    pub key: &'static str,
    pub columns: &'static [&'static str],
    /// Ranking within a key; rank 1 survives. `None` keeps an arbitrary row.
    pub order_by: Option<&'static str>,
}

impl DedupTarget {
    /// Catalog rows are immutable, any copy will do
    pub const SONGS: DedupTarget = DedupTarget {
        table: SONGS_TABLE,
        key: "song_id",
        columns: &SONG_COLUMNS,
        order_by: None,
    };

    pub const ARTISTS: DedupTarget = DedupTarget {
        table: ARTISTS_TABLE,
        key: "artist_id",
        columns: &ARTIST_COLUMNS,
        order_by: None,
    };

    /// The most recently observed row carries the current subscription level
    pub const USERS: DedupTarget = DedupTarget {
        table: USERS_TABLE,
        key: "user_id",
        columns: &USER_COLUMNS,
        order_by: Some("observed_at DESC NULLS LAST"),
    };

    /// Every table the pass covers, in processing order
    pub const ALL: [DedupTarget; 3] = [Self::USERS, Self::ARTISTS, Self::SONGS];

    fn temp_table(&self) -> String {
        format!("dedup_{}", self.table)
    }

    /// Number of keys with more than one row
    pub fn duplicate_count_sql(&self) -> String {
        format!(
            "SELECT COUNT(*) AS duplicated_keys FROM (SELECT {key} FROM {table} GROUP BY {key} HAVING COUNT(*) > 1) duplicated",
            key = self.key,
            table = self.table
        )
    }

    pub fn row_count_sql(&self) -> String {
        format!("SELECT COUNT(*) AS row_count FROM {}", self.table)
    }

    /// Statements of the cleanup transaction
    pub fn cleanup_statements(&self) -> Vec<String> {
        let columns = self.columns.join(", ");
        let temp = self.temp_table();
        let window = match self.order_by {
            Some(order_by) => format!("PARTITION BY {} ORDER BY {}", self.key, order_by),
            None => format!("PARTITION BY {}", self.key),
        };

        vec![
            format!("DROP TABLE IF EXISTS {};", temp),
            format!(
                "CREATE TEMP TABLE {temp} AS \
                 SELECT {columns} FROM (\
                 SELECT {columns}, ROW_NUMBER() OVER ({window}) AS dedup_rank \
                 FROM {table} \
                 WHERE {key} IN (SELECT {key} FROM {table} GROUP BY {key} HAVING COUNT(*) > 1)\
                 ) ranked WHERE dedup_rank = 1;",
                table = self.table,
                key = self.key,
            ),
            format!(
                "DELETE FROM {table} WHERE {key} IN (SELECT {key} FROM {temp});",
                table = self.table,
                key = self.key,
            ),
            format!(
                "INSERT INTO {table} ({columns}) SELECT {columns} FROM {temp};",
                table = self.table
            ),
            format!("DROP TABLE {};", temp),
        ]
    }
}

/// Outcome of deduplicating one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    pub table: String,
    /// Keys that had more than one row
    pub duplicated_keys: u64,
    pub rows_removed: u64,
}

/// Runs the deduplication pass over the dimension tables
pub struct Deduplicator<'a, W: Warehouse> {
    warehouse: &'a W,
}

impl<'a, W: Warehouse> Deduplicator<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self { warehouse }
    }

    /// Deduplicate songs, artists and users; the first failure stops the pass
    pub async fn deduplicate_all(&self) -> EtlResult<Vec<DedupStats>> {
        let mut stats = Vec::with_capacity(DedupTarget::ALL.len());
        for target in &DedupTarget::ALL {
            stats.push(self.deduplicate(target).await?);
        }
        Ok(stats)
    }

    /// Deduplicate one table. A table without duplicates is left untouched.
    pub async fn deduplicate(&self, target: &DedupTarget) -> EtlResult<DedupStats> {
        let fail = |source: WarehouseError| {
            tracing::error!("Deduplication of {} failed: {}", target.table, source);
            EtlError::Dedup {
                table: target.table.to_string(),
                source,
            }
        };

        let duplicated_keys = self
            .scalar(&target.duplicate_count_sql())
            .await
            .map_err(fail)?;

        if duplicated_keys == 0 {
            tracing::info!("No duplicates in {}", target.table);
            return Ok(DedupStats {
                table: target.table.to_string(),
                ..Default::default()
            });
        }

        let before = self.scalar(&target.row_count_sql()).await.map_err(fail)?;
        self.warehouse
            .execute_transaction(&target.cleanup_statements())
            .await
            .map_err(fail)?;
        let after = self.scalar(&target.row_count_sql()).await.map_err(fail)?;

        let stats = DedupStats {
            table: target.table.to_string(),
            duplicated_keys,
            rows_removed: before.saturating_sub(after),
        };
        tracing::info!(
            "Removed {} duplicate rows across {} keys in {}",
            stats.rows_removed,
            stats.duplicated_keys,
            stats.table
        );
        Ok(stats)
    }

    async fn scalar(&self, sql: &str) -> Result<u64, WarehouseError> {
        let result = self.warehouse.query(sql).await?;
        result
            .scalar_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| WarehouseError::QueryFailed(format!("Expected a count from: {}", sql)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_cleanup_keeps_latest() {
        let statements = DedupTarget::USERS.cleanup_statements();
        assert_eq!(statements.len(), 5);
        assert_eq!(statements[0], "DROP TABLE IF EXISTS dedup_users;");
        assert!(statements[1].contains(
            "ROW_NUMBER() OVER (PARTITION BY user_id ORDER BY observed_at DESC NULLS LAST)"
        ));
        assert_eq!(
            statements[2],
            "DELETE FROM users WHERE user_id IN (SELECT user_id FROM dedup_users);"
        );
        assert_eq!(
            statements[3],
            "INSERT INTO users (user_id, first_name, last_name, gender, level, observed_at) \
             SELECT user_id, first_name, last_name, gender, level, observed_at FROM dedup_users;"
        );
    }

    #[test]
    fn test_catalog_cleanup_is_unordered() {
        let statements = DedupTarget::SONGS.cleanup_statements();
        assert!(statements[1].contains("OVER (PARTITION BY song_id)"));
        assert!(statements[1].contains("HAVING COUNT(*) > 1"));
    }

    #[test]
    fn test_duplicate_count_sql() {
        assert_eq!(
            DedupTarget::ARTISTS.duplicate_count_sql(),
            "SELECT COUNT(*) AS duplicated_keys FROM \
             (SELECT artist_id FROM artists GROUP BY artist_id HAVING COUNT(*) > 1) duplicated"
        );
    }
}
