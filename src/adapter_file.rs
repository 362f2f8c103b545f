//! File adapter.
//!
//! Serves a JSON inventory dump as if it were a live source. Useful for
//! air-gapped mirrors (dumps exported elsewhere), demos and tests.
//!
//! # Dump format
//!
//! ```json
//! {
//!   "vms": [{ "moid": "vm-1", "name": "web01", "power_state": "poweredOn" }],
//!   "hosts": [{ "moid": "host-1", "name": "esx01", "vm_count": 1 }],
//!   "snapshots": { "vm-1": { "nodes": [{ "moid": "snap-1", "parent": null }] } },
//!   "network_adapters": { "vm-1": [{ "vm_moid": "vm-1", "adapter_type": "VMXNET3" }] },
//!   "drs_rules": { "domain-c1": [] }
//! }
//! ```
//!
//! Every key is optional. Collections are top-level arrays; per-object
//! details are maps keyed by the owning object's moid. The file is read once
//! on `connect()`; a missing or malformed file is a connection error.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::adapter::{AdapterResult, SourceAdapter};
use crate::error::AdapterError;
use crate::models::{
    Alarm, Cluster, Datastore, DistributedSwitch, DrsRule, Event, Folder, HostPerformance,
    HostSystem, NetworkAdapter, Permission, PortGroup, ResourcePool, ScsiLun, SnapshotTree,
    StorageAdapter, VApp, VirtualMachine, VmPerformance, VmTemplate,
};

/// On-disk inventory dump.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InventoryDump {
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
    pub snapshots: HashMap<String, SnapshotTree>,
    pub network_adapters: HashMap<String, Vec<NetworkAdapter>>,
    pub vm_performance: HashMap<String, Vec<VmPerformance>>,
    pub storage_adapters: HashMap<String, Vec<StorageAdapter>>,
    pub scsi_luns: HashMap<String, Vec<ScsiLun>>,
    pub host_performance: HashMap<String, Vec<HostPerformance>>,
    pub drs_rules: HashMap<String, Vec<DrsRule>>,
}

pub struct FileAdapter {
    path: PathBuf,
    dump: Option<InventoryDump>,
}

impl FileAdapter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            dump: None,
        }
    }

    fn dump(&self) -> AdapterResult<&InventoryDump> {
        self.dump
            .as_ref()
            .ok_or_else(|| AdapterError::connection("not connected"))
    }

    fn detail<T: Clone>(map: &HashMap<String, Vec<T>>, moid: &str) -> Vec<T> {
        map.get(moid).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SourceAdapter for FileAdapter {
    async fn connect(&mut self) -> AdapterResult<()> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AdapterError::connection(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        let dump: InventoryDump = serde_json::from_str(&content).map_err(|e| {
            AdapterError::connection(format!("invalid dump {}: {}", self.path.display(), e))
        })?;
        self.dump = Some(dump);
        Ok(())
    }

    async fn disconnect(&mut self) -> AdapterResult<()> {
        self.dump = None;
        Ok(())
    }

    async fn fetch_vms(&mut self) -> AdapterResult<Vec<VirtualMachine>> {
        Ok(self.dump()?.vms.clone())
    }

    async fn fetch_hosts(&mut self) -> AdapterResult<Vec<HostSystem>> {
        Ok(self.dump()?.hosts.clone())
    }

    async fn fetch_datastores(&mut self) -> AdapterResult<Vec<Datastore>> {
        Ok(self.dump()?.datastores.clone())
    }

    async fn fetch_clusters(&mut self) -> AdapterResult<Vec<Cluster>> {
        Ok(self.dump()?.clusters.clone())
    }

    async fn fetch_distributed_switches(&mut self) -> AdapterResult<Vec<DistributedSwitch>> {
        Ok(self.dump()?.distributed_switches.clone())
    }

    async fn fetch_port_groups(&mut self) -> AdapterResult<Vec<PortGroup>> {
        Ok(self.dump()?.port_groups.clone())
    }

    async fn fetch_resource_pools(&mut self) -> AdapterResult<Vec<ResourcePool>> {
        Ok(self.dump()?.resource_pools.clone())
    }

    async fn fetch_vapps(&mut self) -> AdapterResult<Vec<VApp>> {
        Ok(self.dump()?.vapps.clone())
    }

    async fn fetch_folders(&mut self) -> AdapterResult<Vec<Folder>> {
        Ok(self.dump()?.folders.clone())
    }

    async fn fetch_templates(&mut self) -> AdapterResult<Vec<VmTemplate>> {
        Ok(self.dump()?.templates.clone())
    }

    async fn fetch_events(&mut self, max_events: usize) -> AdapterResult<Vec<Event>> {
        let mut events = self.dump()?.events.clone();
        // Newest first; undated events sort last.
        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        events.truncate(max_events);
        Ok(events)
    }

    async fn fetch_alarms(&mut self) -> AdapterResult<Vec<Alarm>> {
        Ok(self.dump()?.alarms.clone())
    }

    async fn fetch_permissions(&mut self) -> AdapterResult<Vec<Permission>> {
        Ok(self.dump()?.permissions.clone())
    }

    async fn fetch_snapshots(&mut self, vm: &VirtualMachine) -> AdapterResult<SnapshotTree> {
        Ok(self
            .dump()?
            .snapshots
            .get(&vm.moid)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_network_adapters(
        &mut self,
        vm: &VirtualMachine,
    ) -> AdapterResult<Vec<NetworkAdapter>> {
        Ok(Self::detail(&self.dump()?.network_adapters, &vm.moid))
    }

    async fn fetch_vm_performance(
        &mut self,
        vm: &VirtualMachine,
    ) -> AdapterResult<Vec<VmPerformance>> {
        Ok(Self::detail(&self.dump()?.vm_performance, &vm.moid))
    }

    async fn fetch_storage_adapters(
        &mut self,
        host: &HostSystem,
    ) -> AdapterResult<Vec<StorageAdapter>> {
        Ok(Self::detail(&self.dump()?.storage_adapters, &host.moid))
    }

    async fn fetch_scsi_luns(&mut self, host: &HostSystem) -> AdapterResult<Vec<ScsiLun>> {
        Ok(Self::detail(&self.dump()?.scsi_luns, &host.moid))
    }

    async fn fetch_host_performance(
        &mut self,
        host: &HostSystem,
    ) -> AdapterResult<Vec<HostPerformance>> {
        Ok(Self::detail(&self.dump()?.host_performance, &host.moid))
    }

    async fn fetch_drs_rules(&mut self, cluster: &Cluster) -> AdapterResult<Vec<DrsRule>> {
        Ok(Self::detail(&self.dump()?.drs_rules, &cluster.moid))
    }
}
