//! Schema migrations.
//!
//! Creates the `sources` table and one table per inventory record type.
//! Record tables are derived from each type's declared columns and share a
//! common prefix/suffix:
//!
//! ```text
//! id INTEGER PRIMARY KEY, source_id INTEGER NOT NULL, <record columns>, last_updated INTEGER NOT NULL
//! ```
//!
//! Every statement is `IF NOT EXISTS`, so running migrations repeatedly is safe.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::models::{
    Alarm, Cluster, Datastore, DistributedSwitch, DrsRule, Event, Folder, HostPerformance,
    HostSystem, InventoryRecord, NetworkAdapter, PerformanceSample, Permission, PortGroup,
    ResourcePool, ScsiLun, Snapshot, StorageAdapter, VApp, VirtualMachine, VmPerformance,
    VmTemplate,
};

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema to an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hostname TEXT NOT NULL UNIQUE,
            username TEXT,
            credential_ref TEXT,
            adapter TEXT NOT NULL,
            endpoint TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            sync_status TEXT NOT NULL DEFAULT 'pending',
            sync_started INTEGER,
            last_sync INTEGER,
            last_error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    create_record_table::<VirtualMachine>(pool).await?;
    create_record_table::<HostSystem>(pool).await?;
    create_record_table::<Datastore>(pool).await?;
    create_record_table::<Cluster>(pool).await?;
    create_record_table::<DistributedSwitch>(pool).await?;
    create_record_table::<PortGroup>(pool).await?;
    create_record_table::<NetworkAdapter>(pool).await?;
    create_record_table::<StorageAdapter>(pool).await?;
    create_record_table::<ScsiLun>(pool).await?;
    create_record_table::<ResourcePool>(pool).await?;
    create_record_table::<VApp>(pool).await?;
    create_record_table::<Folder>(pool).await?;
    create_record_table::<Snapshot>(pool).await?;
    create_record_table::<VmTemplate>(pool).await?;
    create_record_table::<DrsRule>(pool).await?;
    create_record_table::<Event>(pool).await?;
    create_record_table::<Alarm>(pool).await?;
    create_record_table::<Permission>(pool).await?;
    create_sample_table::<VmPerformance>(pool).await?;
    create_sample_table::<HostPerformance>(pool).await?;

    Ok(())
}

async fn create_record_table<R: InventoryRecord>(pool: &SqlitePool) -> Result<()> {
    sqlx::query(&record_table_ddl::<R>(None))
        .execute(pool)
        .await?;
    create_source_index::<R>(pool).await
}

async fn create_sample_table<R: PerformanceSample>(pool: &SqlitePool) -> Result<()> {
    let unique = format!("UNIQUE(source_id, {}, timestamp)", R::OBJECT_COLUMN);
    sqlx::query(&record_table_ddl::<R>(Some(&unique)))
        .execute(pool)
        .await?;
    create_source_index::<R>(pool).await
}

async fn create_source_index<R: InventoryRecord>(pool: &SqlitePool) -> Result<()> {
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_source_id ON {table}(source_id)",
        table = R::TABLE
    ))
    .execute(pool)
    .await?;
    Ok(())
}

fn record_table_ddl<R: InventoryRecord>(constraint: Option<&str>) -> String {
    let mut lines = vec![
        "id INTEGER PRIMARY KEY".to_string(),
        "source_id INTEGER NOT NULL REFERENCES sources(id)".to_string(),
    ];
    for (name, ty) in R::COLUMNS.iter().zip(R::COLUMN_TYPES) {
        lines.push(format!("{} {}", name, ty));
    }
    lines.push("last_updated INTEGER NOT NULL".to_string());
    if let Some(c) = constraint {
        lines.push(c.to_string());
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        R::TABLE,
        lines.join(",\n    ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_wraps_record_columns() {
        let ddl = record_table_ddl::<HostSystem>(None);
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS hosts ("));
        assert!(ddl.contains("source_id INTEGER NOT NULL REFERENCES sources(id)"));
        assert!(ddl.contains("moid TEXT NOT NULL"));
        assert!(ddl.contains("cluster TEXT,"));
        assert!(ddl.contains("vm_count INTEGER NOT NULL DEFAULT 0"));
        assert!(ddl.trim_end().ends_with("last_updated INTEGER NOT NULL\n)"));
    }

    #[test]
    fn sample_tables_are_unique_per_object_and_time() {
        let unique = format!("UNIQUE(source_id, {}, timestamp)", VmPerformance::OBJECT_COLUMN);
        let ddl = record_table_ddl::<VmPerformance>(Some(&unique));
        assert!(ddl.contains("UNIQUE(source_id, vm_moid, timestamp)"));
    }
}
