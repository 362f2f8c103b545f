//! SQLite-backed inventory store.
//!
//! Owns every write the sync path performs:
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`add_source`](SqliteStore::add_source) | Provision a source |
//! | [`mark_syncing`](SqliteStore::mark_syncing) / [`mark_completed`](SqliteStore::mark_completed) / [`mark_failed`](SqliteStore::mark_failed) | Status transitions, each committed on its own |
//! | [`replace_source`](SqliteStore::replace_source) | Clear-then-insert one source's records in a single transaction |
//!
//! `replace_source` runs entirely inside one SQLite transaction. If any
//! statement fails the transaction is dropped and rolled back, leaving the
//! previous cycle's rows intact; readers on other connections see either
//! the old snapshot or the new one (WAL snapshot isolation), never a mix.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::models::{
    InventoryRecord, NewSource, PerformanceSample, RecordSet, Source, SqlValue, SyncStatus,
};

/// Summary tables reported by [`SqliteStore::inventory_counts`].
pub const SUMMARY_TABLES: [&str; 4] = ["virtual_machines", "hosts", "datastores", "clusters"];

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ============ Sources ============

    pub async fn add_source(&self, source: &NewSource) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO sources (hostname, username, credential_ref, adapter, endpoint, is_active, sync_status)
            VALUES (?, ?, ?, ?, ?, ?, 'pending')
            "#,
        )
        .bind(&source.hostname)
        .bind(&source.username)
        .bind(&source.credential_ref)
        .bind(&source.adapter)
        .bind(&source.endpoint)
        .bind(source.is_active)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM sources ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(source_from_row).collect()
    }

    pub async fn active_sources(&self) -> Result<Vec<Source>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM sources WHERE is_active = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(source_from_row).collect()
    }

    pub async fn get_source(&self, id: i64) -> Result<Option<Source>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM sources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    /// Returns `false` if no source has this id.
    pub async fn set_active(&self, id: i64, active: bool) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE sources SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ============ Status transitions ============

    /// Claim a source for a cycle. Returns `false` when another process
    /// holds a claim started at or after `stale_before`.
    ///
    /// The check and the write are one statement, so two processes sharing
    /// the database cannot both claim the same source.
    pub async fn mark_syncing(
        &self,
        id: i64,
        started: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sources SET sync_status = 'syncing', sync_started = ?, last_error = NULL
             WHERE id = ?
               AND (sync_status != 'syncing' OR sync_started IS NULL OR sync_started < ?)",
        )
        .bind(started.timestamp())
        .bind(id)
        .bind(stale_before.timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_completed(&self, id: i64, at: DateTime<Utc>) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE sources SET sync_status = 'completed', last_sync = ?, last_error = NULL WHERE id = ?",
        )
        .bind(at.timestamp())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: i64, message: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE sources SET sync_status = 'failed', last_error = ? WHERE id = ?")
            .bind(message)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ============ Replace ============

    /// Replace everything stored for `source_id` with `records`.
    ///
    /// Inventory tables are cleared by source id. Performance tables are
    /// pruned of samples older than `retention_cutoff` instead, and incoming
    /// samples older than the cutoff are dropped. All rows are stamped with
    /// `synced_at`.
    pub async fn replace_source(
        &self,
        source_id: i64,
        records: &RecordSet,
        synced_at: DateTime<Utc>,
        retention_cutoff: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let now = synced_at.timestamp();
        let cutoff = retention_cutoff.timestamp();
        let mut tx = self.pool.begin().await?;

        replace_rows(&mut tx, source_id, now, &records.vms).await?;
        replace_rows(&mut tx, source_id, now, &records.hosts).await?;
        replace_rows(&mut tx, source_id, now, &records.datastores).await?;
        replace_rows(&mut tx, source_id, now, &records.clusters).await?;
        replace_rows(&mut tx, source_id, now, &records.distributed_switches).await?;
        replace_rows(&mut tx, source_id, now, &records.port_groups).await?;
        replace_rows(&mut tx, source_id, now, &records.network_adapters).await?;
        replace_rows(&mut tx, source_id, now, &records.storage_adapters).await?;
        replace_rows(&mut tx, source_id, now, &records.scsi_luns).await?;
        replace_rows(&mut tx, source_id, now, &records.resource_pools).await?;
        replace_rows(&mut tx, source_id, now, &records.vapps).await?;
        replace_rows(&mut tx, source_id, now, &records.folders).await?;
        replace_rows(&mut tx, source_id, now, &records.snapshots).await?;
        replace_rows(&mut tx, source_id, now, &records.templates).await?;
        replace_rows(&mut tx, source_id, now, &records.drs_rules).await?;
        replace_rows(&mut tx, source_id, now, &records.events).await?;
        replace_rows(&mut tx, source_id, now, &records.alarms).await?;
        replace_rows(&mut tx, source_id, now, &records.permissions).await?;
        merge_samples(&mut tx, source_id, now, cutoff, &records.vm_performance).await?;
        merge_samples(&mut tx, source_id, now, cutoff, &records.host_performance).await?;

        tx.commit().await?;
        Ok(())
    }

    // ============ Reads ============

    /// Row counts of the core tables for one source.
    pub async fn inventory_counts(
        &self,
        source_id: i64,
    ) -> Result<Vec<(&'static str, i64)>, sqlx::Error> {
        let mut counts = Vec::with_capacity(SUMMARY_TABLES.len());
        for table in SUMMARY_TABLES {
            let n: i64 =
                sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {} WHERE source_id = ?", table))
                    .bind(source_id)
                    .fetch_one(&self.pool)
                    .await?;
            counts.push((table, n));
        }
        Ok(counts)
    }
}

fn source_from_row(row: &SqliteRow) -> Result<Source, sqlx::Error> {
    let status: String = row.try_get("sync_status")?;
    let sync_status = status
        .parse::<SyncStatus>()
        .map_err(|e| sqlx::Error::Decode(e.into()))?;
    let last_sync: Option<i64> = row.try_get("last_sync")?;

    Ok(Source {
        id: row.try_get("id")?,
        hostname: row.try_get("hostname")?,
        username: row.try_get("username")?,
        credential_ref: row.try_get("credential_ref")?,
        adapter: row.try_get("adapter")?,
        endpoint: row.try_get("endpoint")?,
        is_active: row.try_get("is_active")?,
        sync_status,
        last_sync: last_sync.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        last_error: row.try_get("last_error")?,
    })
}

fn insert_sql<R: InventoryRecord>(verb: &str) -> String {
    let placeholders = vec!["?"; R::COLUMNS.len() + 2].join(", ");
    format!(
        "{} INTO {} (source_id, {}, last_updated) VALUES ({})",
        verb,
        R::TABLE,
        R::COLUMNS.join(", "),
        placeholders
    )
}

async fn insert_row<R: InventoryRecord>(
    conn: &mut SqliteConnection,
    sql: &str,
    source_id: i64,
    now: i64,
    record: &R,
) -> Result<(), sqlx::Error> {
    let mut query = sqlx::query(sql).bind(source_id);
    for value in record.values() {
        query = match value {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Int(v) => query.bind(v),
            SqlValue::Real(v) => query.bind(v),
            SqlValue::Text(v) => query.bind(v),
        };
    }
    query.bind(now).execute(&mut *conn).await?;
    Ok(())
}

async fn replace_rows<R: InventoryRecord>(
    conn: &mut SqliteConnection,
    source_id: i64,
    now: i64,
    records: &[R],
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!("DELETE FROM {} WHERE source_id = ?", R::TABLE))
        .bind(source_id)
        .execute(&mut *conn)
        .await?;

    let sql = insert_sql::<R>("INSERT");
    for record in records {
        insert_row(conn, &sql, source_id, now, record).await?;
    }
    Ok(())
}

async fn merge_samples<R: PerformanceSample>(
    conn: &mut SqliteConnection,
    source_id: i64,
    now: i64,
    cutoff: i64,
    samples: &[R],
) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "DELETE FROM {} WHERE source_id = ? AND timestamp < ?",
        R::TABLE
    ))
    .bind(source_id)
    .bind(cutoff)
    .execute(&mut *conn)
    .await?;

    let sql = insert_sql::<R>("INSERT OR REPLACE");
    for sample in samples.iter().filter(|s| s.timestamp().timestamp() >= cutoff) {
        insert_row(conn, &sql, source_id, now, sample).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HostSystem;

    #[test]
    fn insert_sql_brackets_record_columns() {
        let sql = insert_sql::<HostSystem>("INSERT");
        assert!(sql.starts_with("INSERT INTO hosts (source_id, moid, name, cluster,"));
        assert!(sql.ends_with("vm_count, last_updated) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"));
    }
}
