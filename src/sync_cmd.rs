//! `vmirror sync`: run sync cycles from the command line.
//!
//! `sync all` syncs every active source, `sync <id>` a single one and
//! `sync <id> <id> ...` an explicit set. A single-source run fails the
//! command when that source fails; batch runs print a per-source table and
//! fail the command if any source failed.

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::db;
use crate::models::SyncStats;
use crate::sync::{BatchReport, SyncOrchestrator, SyncOutcome};

/// Columns shown in the per-source summary.
const SUMMARY_KEYS: [&str; 5] = ["vms", "hosts", "datastores", "clusters", "skipped_objects"];

pub async fn run_sync(config: &Config, targets: &[String]) -> Result<()> {
    let pool = db::connect(config).await?;
    let orchestrator = SyncOrchestrator::with_builtin_adapters(pool.clone(), &config.sync);

    let result = match parse_targets(targets)? {
        Target::All => orchestrator
            .sync_all()
            .await
            .map_err(anyhow::Error::from)
            .and_then(|report| print_report(&report)),
        Target::One(id) => match orchestrator.sync_one(id).await {
            Ok(stats) => {
                print_stats(id, &stats);
                Ok(())
            }
            Err(e) => Err(anyhow::Error::new(e).context(format!("sync of source {} failed", id))),
        },
        Target::Many(ids) => orchestrator
            .sync_sources(&ids)
            .await
            .map_err(anyhow::Error::from)
            .and_then(|report| print_report(&report)),
    };

    pool.close().await;
    result
}

#[derive(Debug, PartialEq)]
enum Target {
    All,
    One(i64),
    Many(Vec<i64>),
}

fn parse_targets(targets: &[String]) -> Result<Target> {
    match targets {
        [] => bail!("nothing to sync: pass `all` or one or more source ids"),
        [only] if only == "all" => Ok(Target::All),
        _ => {
            let ids = targets
                .iter()
                .map(|t| {
                    t.parse::<i64>()
                        .with_context(|| format!("invalid source id: '{}'", t))
                })
                .collect::<Result<Vec<_>>>()?;
            match ids.as_slice() {
                [id] => Ok(Target::One(*id)),
                _ => Ok(Target::Many(ids)),
            }
        }
    }
}

fn print_stats(id: i64, stats: &SyncStats) {
    println!("sync source {}", id);
    for (key, n) in stats {
        println!("  {:<18} {:>8}", key, n);
    }
    println!("ok");
}

fn print_report(report: &BatchReport) -> Result<()> {
    if report.is_empty() {
        println!("No active sources to sync.");
        return Ok(());
    }

    println!(
        "{:<5} {:<28} {:<10} {:>6} {:>6} {:>6} {:>6} {:>8}   ERROR",
        "ID", "HOSTNAME", "STATUS", "VMS", "HOSTS", "DS", "CLUST", "SKIPPED"
    );
    for r in &report.results {
        match &r.outcome {
            SyncOutcome::Completed { stats } => {
                let n: Vec<u64> = SUMMARY_KEYS
                    .iter()
                    .map(|k| stats.get(*k).copied().unwrap_or(0))
                    .collect();
                println!(
                    "{:<5} {:<28} {:<10} {:>6} {:>6} {:>6} {:>6} {:>8}",
                    r.source_id, r.hostname, "completed", n[0], n[1], n[2], n[3], n[4]
                );
            }
            SyncOutcome::Failed { error, .. } => {
                println!(
                    "{:<5} {:<28} {:<10} {:>6} {:>6} {:>6} {:>6} {:>8}   {}",
                    r.source_id, r.hostname, "failed", "-", "-", "-", "-", "-", error
                );
            }
        }
    }

    println!();
    println!(
        "{} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );

    if report.failed() > 0 {
        bail!("{} of {} sources failed", report.failed(), report.results.len());
    }
    Ok(())
}
