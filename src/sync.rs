//! Synchronization: the orchestrator and the per-source replace transaction.
//!
//! ```text
//!   sync_all / sync_sources / sync_one
//!              │
//!              ▼
//!   ┌─────────────────────┐   one job per source, at most max_workers at once
//!   │      TaskPool       │──────────────┬──────────────┐
//!   └─────────────────────┘              ▼              ▼
//!                               ReplaceTransaction  ReplaceTransaction ...
//!                                 │ mark syncing
//!                                 │ connect ── fail ─▶ failed
//!                                 │ bulk fetch + detail collection
//!                                 │ disconnect (always, once connected)
//!                                 │ replace rows in one SQLite transaction
//!                                 ▼
//!                            completed | failed
//! ```
//!
//! Each transaction owns its adapter and uses its own pooled connections, so
//! sources share nothing but the database. A failed source never affects
//! the others; batch calls report per-source outcomes instead of failing.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::adapter::{AdapterFactory, BuiltinAdapters, SourceAdapter};
use crate::config::SyncConfig;
use crate::error::{AdapterError, SyncError};
use crate::models::{RecordSet, Source, SyncStats};
use crate::pool::TaskPool;
use crate::sqlite_store::SqliteStore;

/// Tunables for the orchestrator, usually taken from `[sync]`.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub max_workers: usize,
    pub retention: chrono::Duration,
    pub max_events: usize,
    pub source_timeout: Option<Duration>,
    /// Age after which another process's `syncing` claim is taken over.
    pub stale_claim: chrono::Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            retention: chrono::Duration::hours(config.performance_retention_hours),
            max_events: config.max_events,
            source_timeout: config.source_timeout(),
            stale_claim: chrono::Duration::minutes(config.stale_claim_minutes),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Reports
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncOutcome {
    Completed { stats: SyncStats },
    Failed { kind: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSyncResult {
    pub source_id: i64,
    pub hostname: String,
    #[serde(flatten)]
    pub outcome: SyncOutcome,
}

impl SourceSyncResult {
    fn new(source_id: i64, hostname: String, result: Result<SyncStats, SyncError>) -> Self {
        let outcome = match result {
            Ok(stats) => SyncOutcome::Completed { stats },
            Err(e) => SyncOutcome::Failed {
                kind: e.kind().to_string(),
                error: e.to_string(),
            },
        };
        Self {
            source_id,
            hostname,
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, SyncOutcome::Completed { .. })
    }

    pub fn stats(&self) -> Option<&SyncStats> {
        match &self.outcome {
            SyncOutcome::Completed { stats } => Some(stats),
            SyncOutcome::Failed { .. } => None,
        }
    }
}

/// Aggregate result of a batch sync, ordered by source id.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub results: Vec<SourceSyncResult>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn get(&self, source_id: i64) -> Option<&SourceSyncResult> {
        self.results.iter().find(|r| r.source_id == source_id)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Orchestrator
// ═══════════════════════════════════════════════════════════════════════

/// Drives sync cycles for one or many sources.
///
/// Cheap to clone; clones share the in-flight set, so two callers (say the
/// scheduler and an API request) cannot run the same source concurrently.
#[derive(Clone)]
pub struct SyncOrchestrator {
    store: SqliteStore,
    adapters: Arc<dyn AdapterFactory>,
    settings: SyncSettings,
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl SyncOrchestrator {
    pub fn new(
        store: SqliteStore,
        adapters: Arc<dyn AdapterFactory>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            adapters,
            settings,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// An orchestrator over `pool` resolving adapters with [`BuiltinAdapters`].
    pub fn with_builtin_adapters(pool: SqlitePool, config: &SyncConfig) -> Self {
        Self::new(
            SqliteStore::new(pool),
            Arc::new(BuiltinAdapters),
            SyncSettings::from_config(config),
        )
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Sync every active source. No active sources is an empty report.
    ///
    /// Only a failure to load the source list is returned as an error;
    /// per-source failures are recorded in the report.
    pub async fn sync_all(&self) -> Result<BatchReport, SyncError> {
        let sources = self.store.active_sources().await?;
        if sources.is_empty() {
            warn!("no active sources to sync");
            return Ok(BatchReport::default());
        }
        Ok(self.dispatch(sources).await)
    }

    /// Sync an explicit set of sources, active or not. Unknown ids appear in
    /// the report as `not_found` failures.
    pub async fn sync_sources(&self, ids: &[i64]) -> Result<BatchReport, SyncError> {
        let mut seen = HashSet::new();
        let mut sources = Vec::new();
        let mut missing = Vec::new();

        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.store.get_source(id).await? {
                Some(source) => sources.push(source),
                None => missing.push(SourceSyncResult::new(
                    id,
                    String::new(),
                    Err(SyncError::NotFound(id)),
                )),
            }
        }

        let mut report = self.dispatch(sources).await;
        report.results.extend(missing);
        report.results.sort_by_key(|r| r.source_id);
        Ok(report)
    }

    /// Sync one source on the caller's task and propagate its failure.
    pub async fn sync_one(&self, source_id: i64) -> Result<SyncStats, SyncError> {
        let source = self
            .store
            .get_source(source_id)
            .await?
            .ok_or(SyncError::NotFound(source_id))?;
        self.run_source(&source).await
    }

    async fn run_source(&self, source: &Source) -> Result<SyncStats, SyncError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, source.id)
            .ok_or(SyncError::AlreadySyncing(source.id))?;

        ReplaceTransaction::new(&self.store, source, &self.settings)
            .run(self.adapters.as_ref())
            .await
    }

    async fn dispatch(&self, sources: Vec<Source>) -> BatchReport {
        if sources.is_empty() {
            return BatchReport::default();
        }

        info!(
            sources = sources.len(),
            workers = self.settings.max_workers,
            "starting batch sync"
        );

        let mut pending: BTreeMap<i64, String> = sources
            .iter()
            .map(|s| (s.id, s.hostname.clone()))
            .collect();

        let mut pool = TaskPool::new(self.settings.max_workers);
        for source in sources {
            let this = self.clone();
            pool.spawn(async move {
                let result = this.run_source(&source).await;
                SourceSyncResult::new(source.id, source.hostname, result)
            });
        }

        let mut results = Vec::with_capacity(pending.len());
        for joined in pool.join_all().await {
            match joined {
                Ok(result) => {
                    pending.remove(&result.source_id);
                    results.push(result);
                }
                Err(e) => error!(error = %e, "sync task aborted"),
            }
        }

        // Anything left panicked before reporting back.
        for (id, hostname) in pending {
            let message = "sync task aborted";
            if let Err(e) = self.store.mark_failed(id, message).await {
                error!(source_id = id, error = %e, "failed to record aborted sync");
            }
            results.push(SourceSyncResult {
                source_id: id,
                hostname,
                outcome: SyncOutcome::Failed {
                    kind: "aborted".to_string(),
                    error: message.to_string(),
                },
            });
        }

        results.sort_by_key(|r| r.source_id);
        let report = BatchReport { results };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "batch sync finished"
        );
        report
    }
}

/// Marks a source as in flight for as long as it lives.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<i64>>>,
    id: i64,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<i64>>>, id: i64) -> Option<Self> {
        let mut in_flight = set.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.insert(id).then(|| Self {
            set: Arc::clone(set),
            id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self
            .set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(&self.id);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Replace transaction
// ═══════════════════════════════════════════════════════════════════════

/// One source's sync cycle: `pending → syncing → {completed | failed}`.
pub struct ReplaceTransaction<'a> {
    store: &'a SqliteStore,
    source: &'a Source,
    settings: &'a SyncSettings,
}

impl<'a> ReplaceTransaction<'a> {
    pub fn new(store: &'a SqliteStore, source: &'a Source, settings: &'a SyncSettings) -> Self {
        Self {
            store,
            source,
            settings,
        }
    }

    pub async fn run(&self, adapters: &dyn AdapterFactory) -> Result<SyncStats, SyncError> {
        let id = self.source.id;
        let hostname = self.source.hostname.as_str();

        // Committed on its own so observers see progress.
        let started = Utc::now();
        let claimed = self
            .store
            .mark_syncing(id, started, started - self.settings.stale_claim)
            .await?;
        if !claimed {
            warn!(source_id = id, hostname, "source is being synced by another process");
            return Err(SyncError::AlreadySyncing(id));
        }
        info!(source_id = id, hostname, "sync started");

        let result = self.execute(adapters).await;

        match &result {
            Ok(stats) => info!(source_id = id, hostname, ?stats, "sync completed"),
            Err(e) => {
                error!(source_id = id, hostname, error = %e, "sync failed");
                if let Err(mark_err) = self.store.mark_failed(id, &e.to_string()).await {
                    error!(source_id = id, error = %mark_err, "failed to record sync failure");
                }
            }
        }

        result
    }

    async fn execute(&self, adapters: &dyn AdapterFactory) -> Result<SyncStats, SyncError> {
        let mut adapter = adapters
            .create(self.source)
            .map_err(|e| self.connection_error(e))?;
        adapter
            .connect()
            .await
            .map_err(|e| self.connection_error(e))?;

        let fetched = self.collect_with_timeout(adapter.as_mut()).await;

        if let Err(e) = adapter.disconnect().await {
            warn!(source_id = self.source.id, error = %e, "disconnect failed");
        }

        let mut records = fetched?;
        let synced_at = Utc::now();
        let cutoff = synced_at - self.settings.retention;

        let dropped = records.drop_samples_before(cutoff);
        if dropped > 0 {
            debug!(source_id = self.source.id, dropped, "dropped samples outside retention window");
        }

        self.store
            .replace_source(self.source.id, &records, synced_at, cutoff)
            .await
            .map_err(|source| SyncError::Commit {
                hostname: self.source.hostname.clone(),
                source,
            })?;

        self.store.mark_completed(self.source.id, synced_at).await?;
        Ok(records.stats())
    }

    async fn collect_with_timeout(
        &self,
        adapter: &mut dyn SourceAdapter,
    ) -> Result<RecordSet, SyncError> {
        match self.settings.source_timeout {
            Some(limit) => tokio::time::timeout(limit, self.collect(adapter))
                .await
                .map_err(|_| SyncError::Timeout {
                    hostname: self.source.hostname.clone(),
                    secs: limit.as_secs(),
                })?,
            None => self.collect(adapter).await,
        }
    }

    async fn collect(&self, adapter: &mut dyn SourceAdapter) -> Result<RecordSet, SyncError> {
        let id = self.source.id;
        let conn = |e: AdapterError| self.connection_error(e);
        let mut records = RecordSet::default();

        debug!(source_id = id, "fetching core resources");
        records.vms = adapter.fetch_vms().await.map_err(conn)?;
        records.hosts = adapter.fetch_hosts().await.map_err(conn)?;
        records.datastores = adapter.fetch_datastores().await.map_err(conn)?;
        records.clusters = adapter.fetch_clusters().await.map_err(conn)?;

        debug!(source_id = id, "fetching networking");
        records.distributed_switches = adapter.fetch_distributed_switches().await.map_err(conn)?;
        records.port_groups = adapter.fetch_port_groups().await.map_err(conn)?;

        debug!(source_id = id, "fetching resource management");
        records.resource_pools = adapter.fetch_resource_pools().await.map_err(conn)?;
        records.vapps = adapter.fetch_vapps().await.map_err(conn)?;
        records.folders = adapter.fetch_folders().await.map_err(conn)?;
        records.templates = adapter.fetch_templates().await.map_err(conn)?;

        debug!(source_id = id, "fetching events, alarms and permissions");
        records.events = adapter
            .fetch_events(self.settings.max_events)
            .await
            .map_err(conn)?;
        records.alarms = adapter.fetch_alarms().await.map_err(conn)?;
        records.permissions = adapter.fetch_permissions().await.map_err(conn)?;

        debug!(source_id = id, "collecting per-object details");
        self.collect_details(adapter, &mut records).await?;

        Ok(records)
    }

    /// One remote round-trip set per enumerated VM, host and cluster.
    ///
    /// An object whose detail fetch fails contributes nothing and is counted
    /// in `skipped_objects`; only a connection error stops the pass.
    async fn collect_details(
        &self,
        adapter: &mut dyn SourceAdapter,
        records: &mut RecordSet,
    ) -> Result<(), SyncError> {
        for vm in &records.vms {
            let details = async {
                let tree = adapter.fetch_snapshots(vm).await?;
                let nics = adapter.fetch_network_adapters(vm).await?;
                let perf = adapter.fetch_vm_performance(vm).await?;
                Ok::<_, AdapterError>((tree.flatten(vm), nics, perf))
            }
            .await;

            match details {
                Ok((snapshots, nics, perf)) => {
                    records.snapshots.extend(snapshots);
                    records.network_adapters.extend(nics);
                    records.vm_performance.extend(perf);
                }
                Err(e) => self.skip_or_abort(e, "vm", &vm.moid, &mut records.skipped_objects)?,
            }
        }

        for host in &records.hosts {
            let details = async {
                let hbas = adapter.fetch_storage_adapters(host).await?;
                let luns = adapter.fetch_scsi_luns(host).await?;
                let perf = adapter.fetch_host_performance(host).await?;
                Ok::<_, AdapterError>((hbas, luns, perf))
            }
            .await;

            match details {
                Ok((hbas, luns, perf)) => {
                    records.storage_adapters.extend(hbas);
                    records.scsi_luns.extend(luns);
                    records.host_performance.extend(perf);
                }
                Err(e) => {
                    self.skip_or_abort(e, "host", &host.moid, &mut records.skipped_objects)?
                }
            }
        }

        for cluster in &records.clusters {
            match adapter.fetch_drs_rules(cluster).await {
                Ok(rules) => records.drs_rules.extend(rules),
                Err(e) => self.skip_or_abort(
                    e,
                    "cluster",
                    &cluster.moid,
                    &mut records.skipped_objects,
                )?,
            }
        }

        Ok(())
    }

    fn skip_or_abort(
        &self,
        error: AdapterError,
        kind: &str,
        moid: &str,
        skipped: &mut u64,
    ) -> Result<(), SyncError> {
        match error {
            AdapterError::Object { .. } => {
                warn!(
                    source_id = self.source.id,
                    object = moid,
                    kind,
                    error = %error,
                    "skipping object details"
                );
                *skipped += 1;
                Ok(())
            }
            AdapterError::Connection(_) => Err(self.connection_error(error)),
        }
    }

    fn connection_error(&self, error: AdapterError) -> SyncError {
        let message = match error {
            AdapterError::Connection(m) => m,
            other => other.to_string(),
        };
        SyncError::Connection {
            hostname: self.source.hostname.clone(),
            message,
        }
    }
}
