//! Source provisioning and status commands.
//!
//! Backs `vmirror source add|list|enable|disable` and `vmirror status`.
//! Everything is printed as plain tables on stdout.

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::db;
use crate::models::{NewSource, Source};
use crate::sqlite_store::SqliteStore;

pub async fn run_source_add(config: &Config, source: NewSource) -> Result<()> {
    if source.hostname.trim().is_empty() {
        bail!("hostname must not be empty");
    }

    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());
    let id = store
        .add_source(&source)
        .await
        .with_context(|| format!("Failed to add source '{}'", source.hostname))?;

    println!(
        "Added source {} ({}, adapter {}{})",
        id,
        source.hostname,
        source.adapter,
        if source.is_active { "" } else { ", inactive" }
    );

    pool.close().await;
    Ok(())
}

pub async fn run_source_list(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let sources = SqliteStore::new(pool.clone()).list_sources().await?;

    if sources.is_empty() {
        println!("No sources configured.");
    } else {
        println!(
            "{:<5} {:<28} {:<8} {:<7} {:<10} LAST SYNC",
            "ID", "HOSTNAME", "ADAPTER", "ACTIVE", "STATUS"
        );
        for s in &sources {
            println!(
                "{:<5} {:<28} {:<8} {:<7} {:<10} {}",
                s.id,
                s.hostname,
                s.adapter,
                if s.is_active { "yes" } else { "no" },
                s.sync_status,
                last_sync_display(s)
            );
        }
    }

    pool.close().await;
    Ok(())
}

pub async fn run_source_set_active(config: &Config, id: i64, active: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let found = SqliteStore::new(pool.clone()).set_active(id, active).await?;
    pool.close().await;

    if !found {
        bail!("source {} not found", id);
    }
    println!(
        "Source {} {}.",
        id,
        if active { "enabled" } else { "disabled" }
    );
    Ok(())
}

/// Print a source's sync status and the size of its mirrored inventory.
pub async fn run_status(config: &Config, id: i64) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone());

    let Some(source) = store.get_source(id).await? else {
        pool.close().await;
        bail!("source {} not found", id);
    };
    let counts = store.inventory_counts(id).await?;

    println!("Source {}: {}", source.id, source.hostname);
    println!("  Adapter:     {}", source.adapter);
    if let Some(endpoint) = &source.endpoint {
        println!("  Endpoint:    {}", endpoint);
    }
    println!("  Active:      {}", source.is_active);
    println!("  Status:      {}", source.sync_status);
    println!("  Last sync:   {}", last_sync_display(&source));
    if let Some(err) = &source.last_error {
        println!("  Last error:  {}", err);
    }
    println!();
    for (table, n) in counts {
        println!("  {:<18} {:>8}", table, n);
    }

    pool.close().await;
    Ok(())
}

fn last_sync_display(source: &Source) -> String {
    match source.last_sync {
        Some(at) => format_ts_relative(at.timestamp()),
        None => "never".to_string(),
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_timestamps() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 120), "2 mins ago");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
        assert_eq!(format_ts_relative(now - 86400 * 3), "3 days ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }
}
