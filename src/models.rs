//! Core data models: sources, inventory records and the per-cycle record set.
//!
//! Every inventory record type is declared with `inventory_record!`, which
//! derives the struct together with its table name, column list and SQL
//! column types. The store adds `id`, `source_id` and `last_updated` to
//! every table, so records carry only remote attributes.
//!
//! Relationships are denormalized by name (a VM carries its cluster and host
//! names) except for explicit moid chains: folder parents, snapshot parents
//! and DRS rule VM lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ═══════════════════════════════════════════════════════════════════════
// Sources
// ═══════════════════════════════════════════════════════════════════════

/// Sync lifecycle of a source: `pending → syncing → {completed | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "syncing" => Ok(SyncStatus::Syncing),
            "completed" => Ok(SyncStatus::Completed),
            "failed" => Ok(SyncStatus::Failed),
            other => Err(format!("unknown sync status: '{}'", other)),
        }
    }
}

/// One remote inventory provider, as provisioned in the `sources` table.
#[derive(Debug, Clone, Serialize)]
pub struct Source {
    pub id: i64,
    pub hostname: String,
    pub username: Option<String>,
    /// Name of the environment variable holding the credential.
    pub credential_ref: Option<String>,
    /// Adapter kind used to reach the source (e.g. `"file"`).
    pub adapter: String,
    /// Adapter-specific locator (a dump path for `file`).
    pub endpoint: Option<String>,
    pub is_active: bool,
    pub sync_status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Provisioning input for a new source.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub hostname: String,
    pub username: Option<String>,
    pub credential_ref: Option<String>,
    pub adapter: String,
    pub endpoint: Option<String>,
    pub is_active: bool,
}

impl NewSource {
    pub fn new(hostname: impl Into<String>, adapter: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            username: None,
            credential_ref: None,
            adapter: adapter.into(),
            endpoint: None,
            is_active: true,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Column plumbing
// ═══════════════════════════════════════════════════════════════════════

/// A single column value ready to be bound into an INSERT.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Int(v as i64)
    }
}

/// Timestamps are stored as unix seconds.
impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Int(v.timestamp())
    }
}

/// Moid lists are stored as a JSON array.
impl From<Vec<String>> for SqlValue {
    fn from(v: Vec<String>) -> Self {
        SqlValue::Text(serde_json::to_string(&v).unwrap_or_else(|_| "[]".to_string()))
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// SQL declaration used for a record field's column.
pub trait SqlType {
    const SQL: &'static str;
}

impl SqlType for String {
    const SQL: &'static str = "TEXT NOT NULL";
}
impl SqlType for i64 {
    const SQL: &'static str = "INTEGER NOT NULL DEFAULT 0";
}
impl SqlType for f64 {
    const SQL: &'static str = "REAL NOT NULL DEFAULT 0";
}
impl SqlType for bool {
    const SQL: &'static str = "INTEGER NOT NULL DEFAULT 0";
}
impl SqlType for DateTime<Utc> {
    const SQL: &'static str = "INTEGER NOT NULL";
}
impl SqlType for Vec<String> {
    const SQL: &'static str = "TEXT NOT NULL DEFAULT '[]'";
}
impl SqlType for Option<String> {
    const SQL: &'static str = "TEXT";
}
impl SqlType for Option<i64> {
    const SQL: &'static str = "INTEGER";
}
impl SqlType for Option<f64> {
    const SQL: &'static str = "REAL";
}
impl SqlType for Option<bool> {
    const SQL: &'static str = "INTEGER";
}
impl SqlType for Option<DateTime<Utc>> {
    const SQL: &'static str = "INTEGER";
}

/// A record type stored in its own table, one row per remote object.
pub trait InventoryRecord: Send + Sync {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];
    const COLUMN_TYPES: &'static [&'static str];

    /// Column values in [`COLUMNS`](Self::COLUMNS) order.
    fn values(&self) -> Vec<SqlValue>;
}

/// Time-series records: unique per `(source_id, object, timestamp)` and
/// retained only within the configured window.
pub trait PerformanceSample: InventoryRecord {
    const OBJECT_COLUMN: &'static str;

    fn timestamp(&self) -> DateTime<Utc>;
}

macro_rules! inventory_record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident in $table:literal {
            $( $(#[$fmeta:meta])* pub $field:ident : $ty:ty, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl InventoryRecord for $name {
            const TABLE: &'static str = $table;
            const COLUMNS: &'static [&'static str] = &[$(stringify!($field)),*];
            const COLUMN_TYPES: &'static [&'static str] = &[$(<$ty as SqlType>::SQL),*];

            fn values(&self) -> Vec<SqlValue> {
                vec![$(SqlValue::from(self.$field.clone())),*]
            }
        }
    };
}

// ═══════════════════════════════════════════════════════════════════════
// Core resources
// ═══════════════════════════════════════════════════════════════════════

inventory_record! {
    pub struct VirtualMachine in "virtual_machines" {
        pub moid: String,
        pub name: String,
        pub cluster: Option<String>,
        pub host: Option<String>,
        /// `poweredOn`, `poweredOff` or `suspended`.
        pub power_state: Option<String>,
        pub cpu_count: Option<i64>,
        pub memory_mb: Option<i64>,
        pub ip_address: Option<String>,
        pub os_name: Option<String>,
        pub guest_full_name: Option<String>,
        pub vm_path: Option<String>,
        pub annotation: Option<String>,
        pub created_date: Option<DateTime<Utc>>,
    }
}

inventory_record! {
    pub struct HostSystem in "hosts" {
        pub moid: String,
        pub name: String,
        pub cluster: Option<String>,
        pub connection_state: Option<String>,
        pub power_state: Option<String>,
        pub cpu_mhz: Option<i64>,
        pub cpu_cores: Option<i64>,
        /// Bytes.
        pub memory_size: Option<i64>,
        pub vendor: Option<String>,
        pub model: Option<String>,
        #[serde(default)]
        pub vm_count: i64,
    }
}

inventory_record! {
    pub struct Datastore in "datastores" {
        pub moid: String,
        pub name: String,
        pub datastore_type: Option<String>,
        pub capacity: Option<i64>,
        pub free_space: Option<i64>,
        pub uncommitted: Option<i64>,
        pub accessible: Option<bool>,
        #[serde(default)]
        pub vm_count: i64,
    }
}

inventory_record! {
    pub struct Cluster in "clusters" {
        pub moid: String,
        pub name: String,
        pub total_cpu: Option<i64>,
        pub total_memory: Option<i64>,
        #[serde(default)]
        pub num_hosts: i64,
        #[serde(default)]
        pub num_vms: i64,
        pub drs_enabled: Option<bool>,
        pub ha_enabled: Option<bool>,
        /// `manual`, `partiallyAutomated` or `fullyAutomated`.
        pub drs_automation_level: Option<String>,
        pub ha_admission_control: Option<bool>,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Networking
// ═══════════════════════════════════════════════════════════════════════

inventory_record! {
    pub struct DistributedSwitch in "distributed_switches" {
        pub moid: String,
        pub name: String,
        pub version: Option<String>,
        pub num_ports: Option<i64>,
        pub num_uplinks: Option<i64>,
        pub max_ports: Option<i64>,
        pub network_io_control_enabled: Option<bool>,
    }
}

inventory_record! {
    pub struct PortGroup in "port_groups" {
        pub moid: String,
        pub name: String,
        pub vswitch_name: Option<String>,
        pub vlan_id: Option<i64>,
        pub num_ports: Option<i64>,
        pub port_binding: Option<String>,
        #[serde(default)]
        pub vm_count: i64,
        #[serde(default)]
        pub is_distributed: bool,
    }
}

inventory_record! {
    pub struct NetworkAdapter in "network_adapters" {
        pub vm_moid: String,
        pub adapter_type: Option<String>,
        pub mac_address: Option<String>,
        pub network_name: Option<String>,
        pub connected: Option<bool>,
        pub start_connected: Option<bool>,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Storage
// ═══════════════════════════════════════════════════════════════════════

inventory_record! {
    pub struct StorageAdapter in "storage_adapters" {
        pub host_moid: String,
        pub device: Option<String>,
        pub adapter_type: Option<String>,
        pub model: Option<String>,
        pub driver: Option<String>,
        pub pci: Option<String>,
        pub status: Option<String>,
    }
}

inventory_record! {
    pub struct ScsiLun in "scsi_luns" {
        pub host_moid: String,
        pub canonical_name: Option<String>,
        pub display_name: Option<String>,
        pub lun_type: Option<String>,
        pub vendor: Option<String>,
        pub model: Option<String>,
        pub capacity_mb: Option<i64>,
        pub multipath_policy: Option<String>,
        pub path_count: Option<i64>,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Resource management
// ═══════════════════════════════════════════════════════════════════════

inventory_record! {
    pub struct ResourcePool in "resource_pools" {
        pub moid: String,
        pub name: String,
        pub cluster_moid: Option<String>,
        pub parent_moid: Option<String>,
        pub cpu_reservation: Option<i64>,
        pub cpu_limit: Option<i64>,
        pub cpu_shares: Option<i64>,
        pub memory_reservation: Option<i64>,
        pub memory_limit: Option<i64>,
        pub memory_shares: Option<i64>,
        pub expandable_reservation: Option<bool>,
        #[serde(default)]
        pub vm_count: i64,
    }
}

inventory_record! {
    pub struct VApp in "vapps" {
        pub moid: String,
        pub name: String,
        pub power_state: Option<String>,
        #[serde(default)]
        pub vm_count: i64,
        pub cpu_reservation: Option<i64>,
        pub memory_reservation: Option<i64>,
    }
}

inventory_record! {
    pub struct Folder in "folders" {
        pub moid: String,
        pub name: String,
        /// `vm`, `host`, `datastore` or `network`.
        pub folder_type: Option<String>,
        pub parent_moid: Option<String>,
        pub path: Option<String>,
    }
}

inventory_record! {
    pub struct Snapshot in "snapshots" {
        pub vm_moid: String,
        pub snapshot_moid: String,
        pub vm_name: Option<String>,
        pub snapshot_name: Option<String>,
        pub description: Option<String>,
        pub created_date: Option<DateTime<Utc>>,
        pub size_mb: Option<i64>,
        pub quiesced: Option<bool>,
        pub parent_snapshot_moid: Option<String>,
    }
}

inventory_record! {
    pub struct VmTemplate in "vm_templates" {
        pub moid: String,
        pub name: String,
        pub guest_os: Option<String>,
        pub cpu_count: Option<i64>,
        pub memory_mb: Option<i64>,
        pub num_disks: Option<i64>,
        pub folder_moid: Option<String>,
        pub annotation: Option<String>,
    }
}

inventory_record! {
    pub struct DrsRule in "drs_rules" {
        pub cluster_moid: String,
        pub rule_name: Option<String>,
        /// `affinity`, `anti-affinity` or `vm-host`.
        pub rule_type: Option<String>,
        pub enabled: Option<bool>,
        pub mandatory: Option<bool>,
        #[serde(default)]
        pub vm_moids: Vec<String>,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Performance
// ═══════════════════════════════════════════════════════════════════════

inventory_record! {
    pub struct VmPerformance in "vm_performance" {
        pub vm_moid: String,
        pub timestamp: DateTime<Utc>,
        pub cpu_usage_mhz: Option<i64>,
        pub cpu_usage_percent: Option<f64>,
        pub memory_usage_mb: Option<i64>,
        pub memory_active_mb: Option<i64>,
        pub disk_read_iops: Option<i64>,
        pub disk_write_iops: Option<i64>,
        pub disk_read_latency_ms: Option<f64>,
        pub disk_write_latency_ms: Option<f64>,
        pub network_rx_mbps: Option<f64>,
        pub network_tx_mbps: Option<f64>,
    }
}

impl PerformanceSample for VmPerformance {
    const OBJECT_COLUMN: &'static str = "vm_moid";

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

inventory_record! {
    pub struct HostPerformance in "host_performance" {
        pub host_moid: String,
        pub timestamp: DateTime<Utc>,
        pub cpu_usage_mhz: Option<i64>,
        pub cpu_usage_percent: Option<f64>,
        pub memory_usage_mb: Option<i64>,
        pub memory_active_mb: Option<i64>,
        pub memory_ballooned_mb: Option<i64>,
        pub memory_swapped_mb: Option<i64>,
        pub disk_latency_ms: Option<f64>,
        pub network_throughput_mbps: Option<f64>,
    }
}

impl PerformanceSample for HostPerformance {
    const OBJECT_COLUMN: &'static str = "host_moid";

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Events, alarms, permissions
// ═══════════════════════════════════════════════════════════════════════

inventory_record! {
    pub struct Event in "events" {
        pub event_type: Option<String>,
        /// `info`, `warning` or `error`.
        pub severity: Option<String>,
        pub timestamp: Option<DateTime<Utc>>,
        pub user_name: Option<String>,
        pub entity_moid: Option<String>,
        pub entity_name: Option<String>,
        pub message: Option<String>,
    }
}

inventory_record! {
    pub struct Alarm in "alarms" {
        pub alarm_name: Option<String>,
        pub entity_moid: Option<String>,
        pub entity_name: Option<String>,
        /// `red`, `yellow`, `green` or `gray`.
        pub status: Option<String>,
        pub triggered_time: Option<DateTime<Utc>>,
        #[serde(default)]
        pub acknowledged: bool,
    }
}

inventory_record! {
    pub struct Permission in "permissions" {
        pub entity_moid: Option<String>,
        pub entity_type: Option<String>,
        /// User or group name.
        pub principal: Option<String>,
        pub role_name: Option<String>,
        pub is_group: Option<bool>,
        pub propagate: Option<bool>,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Snapshot trees
// ═══════════════════════════════════════════════════════════════════════

/// One node of a VM's snapshot tree. `parent` indexes into the owning
/// [`SnapshotTree::nodes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub moid: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub size_mb: Option<i64>,
    pub quiesced: Option<bool>,
    #[serde(default)]
    pub parent: Option<usize>,
}

/// A VM's snapshot tree as a flat arena of nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotTree {
    pub nodes: Vec<SnapshotNode>,
}

impl SnapshotTree {
    /// Flatten the tree into snapshot rows in depth-first pre-order.
    ///
    /// Nodes with no parent, an out-of-range parent or themselves as parent
    /// are roots. Nodes reachable only through a parent cycle are dropped.
    pub fn flatten(&self, vm: &VirtualMachine) -> Vec<Snapshot> {
        let n = self.nodes.len();
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut roots = Vec::new();

        for (i, node) in self.nodes.iter().enumerate() {
            match node.parent {
                Some(p) if p < n && p != i => children[p].push(i),
                _ => roots.push(i),
            }
        }

        let mut visited = vec![false; n];
        let mut out = Vec::with_capacity(n);
        let mut stack: Vec<usize> = roots.into_iter().rev().collect();

        while let Some(i) = stack.pop() {
            if visited[i] {
                continue;
            }
            visited[i] = true;

            let node = &self.nodes[i];
            let parent_moid = node
                .parent
                .filter(|&p| p < n && p != i)
                .map(|p| self.nodes[p].moid.clone());

            out.push(Snapshot {
                vm_moid: vm.moid.clone(),
                snapshot_moid: node.moid.clone(),
                vm_name: Some(vm.name.clone()),
                snapshot_name: node.name.clone(),
                description: node.description.clone(),
                created_date: node.created,
                size_mb: node.size_mb,
                quiesced: node.quiesced,
                parent_snapshot_moid: parent_moid,
            });

            stack.extend(children[i].iter().rev());
        }

        out
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Record set
// ═══════════════════════════════════════════════════════════════════════

/// Everything fetched from one source in one cycle.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pub vms: Vec<VirtualMachine>,
    pub hosts: Vec<HostSystem>,
    pub datastores: Vec<Datastore>,
    pub clusters: Vec<Cluster>,
    pub distributed_switches: Vec<DistributedSwitch>,
    pub port_groups: Vec<PortGroup>,
    pub resource_pools: Vec<ResourcePool>,
    pub vapps: Vec<VApp>,
    pub folders: Vec<Folder>,
    pub templates: Vec<VmTemplate>,
    pub events: Vec<Event>,
    pub alarms: Vec<Alarm>,
    pub permissions: Vec<Permission>,
    pub snapshots: Vec<Snapshot>,
    pub network_adapters: Vec<NetworkAdapter>,
    pub vm_performance: Vec<VmPerformance>,
    pub storage_adapters: Vec<StorageAdapter>,
    pub scsi_luns: Vec<ScsiLun>,
    pub host_performance: Vec<HostPerformance>,
    pub drs_rules: Vec<DrsRule>,
    /// Objects whose detail collection failed and were skipped.
    pub skipped_objects: u64,
}

/// Per-entity counts for one completed cycle.
pub type SyncStats = BTreeMap<String, u64>;

impl RecordSet {
    /// Drop performance samples older than `cutoff`, returning how many
    /// were dropped. Stats taken afterwards count only what gets stored.
    pub fn drop_samples_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.vm_performance.len() + self.host_performance.len();
        self.vm_performance.retain(|s| s.timestamp >= cutoff);
        self.host_performance.retain(|s| s.timestamp >= cutoff);
        before - self.vm_performance.len() - self.host_performance.len()
    }

    pub fn stats(&self) -> SyncStats {
        let counts: [(&str, usize); 20] = [
            ("vms", self.vms.len()),
            ("hosts", self.hosts.len()),
            ("datastores", self.datastores.len()),
            ("clusters", self.clusters.len()),
            ("dvs", self.distributed_switches.len()),
            ("port_groups", self.port_groups.len()),
            ("resource_pools", self.resource_pools.len()),
            ("vapps", self.vapps.len()),
            ("folders", self.folders.len()),
            ("templates", self.templates.len()),
            ("events", self.events.len()),
            ("alarms", self.alarms.len()),
            ("permissions", self.permissions.len()),
            ("snapshots", self.snapshots.len()),
            ("network_adapters", self.network_adapters.len()),
            ("vm_performance", self.vm_performance.len()),
            ("storage_adapters", self.storage_adapters.len()),
            ("scsi_luns", self.scsi_luns.len()),
            ("host_performance", self.host_performance.len()),
            ("drs_rules", self.drs_rules.len()),
        ];

        let mut stats: SyncStats = counts
            .iter()
            .map(|(k, v)| (k.to_string(), *v as u64))
            .collect();
        stats.insert("skipped_objects".to_string(), self.skipped_objects);
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm(moid: &str) -> VirtualMachine {
        VirtualMachine {
            moid: moid.to_string(),
            name: format!("{}-name", moid),
            cluster: None,
            host: None,
            power_state: None,
            cpu_count: None,
            memory_mb: None,
            ip_address: None,
            os_name: None,
            guest_full_name: None,
            vm_path: None,
            annotation: None,
            created_date: None,
        }
    }

    fn node(moid: &str, parent: Option<usize>) -> SnapshotNode {
        SnapshotNode {
            moid: moid.to_string(),
            name: Some(moid.to_uppercase()),
            description: None,
            created: None,
            size_mb: None,
            quiesced: None,
            parent,
        }
    }

    #[test]
    fn record_columns_line_up_with_values() {
        let v = vm("vm-1");
        assert_eq!(VirtualMachine::COLUMNS.len(), v.values().len());
        assert_eq!(VirtualMachine::COLUMNS.len(), VirtualMachine::COLUMN_TYPES.len());
        assert_eq!(VirtualMachine::COLUMNS[0], "moid");
        assert_eq!(v.values()[0], SqlValue::Text("vm-1".to_string()));
        assert_eq!(v.values()[2], SqlValue::Null);
    }

    #[test]
    fn drs_vm_list_is_stored_as_json() {
        let rule = DrsRule {
            cluster_moid: "domain-c1".to_string(),
            rule_name: Some("keep-apart".to_string()),
            rule_type: Some("anti-affinity".to_string()),
            enabled: Some(true),
            mandatory: None,
            vm_moids: vec!["vm-1".to_string(), "vm-2".to_string()],
        };
        let values = rule.values();
        assert_eq!(values[3], SqlValue::Int(1));
        assert_eq!(values[5], SqlValue::Text(r#"["vm-1","vm-2"]"#.to_string()));
    }

    #[test]
    fn snapshot_tree_flattens_depth_first_with_parent_moids() {
        // root ─┬─ b
        //       └─ a ── a1
        let tree = SnapshotTree {
            nodes: vec![
                node("b", Some(3)),
                node("a1", Some(2)),
                node("a", Some(3)),
                node("root", None),
            ],
        };
        let rows = tree.flatten(&vm("vm-7"));
        let order: Vec<&str> = rows.iter().map(|s| s.snapshot_moid.as_str()).collect();
        assert_eq!(order, vec!["root", "b", "a", "a1"]);

        let parents: Vec<Option<&str>> = rows
            .iter()
            .map(|s| s.parent_snapshot_moid.as_deref())
            .collect();
        assert_eq!(parents, vec![None, Some("root"), Some("root"), Some("a")]);
        assert!(rows.iter().all(|s| s.vm_moid == "vm-7"));
        assert_eq!(rows[0].vm_name.as_deref(), Some("vm-7-name"));
    }

    #[test]
    fn snapshot_tree_treats_dangling_parent_as_root_and_drops_cycles() {
        let tree = SnapshotTree {
            nodes: vec![
                node("orphan", Some(42)),
                node("x", Some(2)),
                node("y", Some(1)),
            ],
        };
        let rows = tree.flatten(&vm("vm-1"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].snapshot_moid, "orphan");
        assert_eq!(rows[0].parent_snapshot_moid, None);
    }

    #[test]
    fn stats_cover_every_table_and_skips() {
        let mut set = RecordSet::default();
        set.vms.push(vm("vm-1"));
        set.skipped_objects = 2;
        let stats = set.stats();
        assert_eq!(stats["vms"], 1);
        assert_eq!(stats["hosts"], 0);
        assert_eq!(stats["skipped_objects"], 2);
        assert_eq!(stats.len(), 21);
    }

    #[test]
    fn samples_outside_window_are_dropped_before_counting() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let sample = |age_hours: i64| VmPerformance {
            vm_moid: "vm-1".to_string(),
            timestamp: now - chrono::Duration::hours(age_hours),
            cpu_usage_mhz: None,
            cpu_usage_percent: None,
            memory_usage_mb: None,
            memory_active_mb: None,
            disk_read_iops: None,
            disk_write_iops: None,
            disk_read_latency_ms: None,
            disk_write_latency_ms: None,
            network_rx_mbps: None,
            network_tx_mbps: None,
        };

        let mut set = RecordSet::default();
        set.vm_performance = vec![sample(1), sample(24), sample(48)];
        let dropped = set.drop_samples_before(now - chrono::Duration::hours(24));

        assert_eq!(dropped, 1);
        assert_eq!(set.stats()["vm_performance"], 2);
    }

    #[test]
    fn sync_status_round_trips_through_str() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Syncing,
            SyncStatus::Completed,
            SyncStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<SyncStatus>().is_err());
    }
}
