//! Source adapters: the boundary to remote inventory endpoints.
//!
//! A [`SourceAdapter`] is one connection to one source. It is created per
//! sync cycle by an [`AdapterFactory`], driven sequentially by exactly one
//! replace transaction, and never shared: every method takes `&mut self`.
//!
//! # Error contract
//!
//! | Call | `Err(AdapterError)` means |
//! |------|---------------------------|
//! | `connect` | the cycle fails, nothing is written |
//! | bulk `fetch_*` | connection-level failure, the cycle fails |
//! | per-object `fetch_*(&object)` | that object's details are skipped |
//!
//! Bulk fetches are expected to absorb failures of individual objects in a
//! listing themselves and return the objects they could read.

use async_trait::async_trait;

use crate::adapter_file::FileAdapter;
use crate::error::AdapterError;
use crate::models::{
    Alarm, Cluster, Datastore, DistributedSwitch, DrsRule, Event, Folder, HostPerformance,
    HostSystem, NetworkAdapter, Permission, PortGroup, ResourcePool, ScsiLun, SnapshotTree,
    Source, StorageAdapter, VApp, VirtualMachine, VmPerformance, VmTemplate,
};

pub type AdapterResult<T> = Result<T, AdapterError>;

#[async_trait]
pub trait SourceAdapter: Send {
    async fn connect(&mut self) -> AdapterResult<()>;

    /// Release the connection. Called on every exit path after `connect`.
    async fn disconnect(&mut self) -> AdapterResult<()>;

    async fn fetch_vms(&mut self) -> AdapterResult<Vec<VirtualMachine>>;
    async fn fetch_hosts(&mut self) -> AdapterResult<Vec<HostSystem>>;
    async fn fetch_datastores(&mut self) -> AdapterResult<Vec<Datastore>>;
    async fn fetch_clusters(&mut self) -> AdapterResult<Vec<Cluster>>;
    async fn fetch_distributed_switches(&mut self) -> AdapterResult<Vec<DistributedSwitch>>;
    async fn fetch_port_groups(&mut self) -> AdapterResult<Vec<PortGroup>>;
    async fn fetch_resource_pools(&mut self) -> AdapterResult<Vec<ResourcePool>>;
    async fn fetch_vapps(&mut self) -> AdapterResult<Vec<VApp>>;
    async fn fetch_folders(&mut self) -> AdapterResult<Vec<Folder>>;
    async fn fetch_templates(&mut self) -> AdapterResult<Vec<VmTemplate>>;
    /// Most recent events first, at most `max_events`.
    async fn fetch_events(&mut self, max_events: usize) -> AdapterResult<Vec<Event>>;
    async fn fetch_alarms(&mut self) -> AdapterResult<Vec<Alarm>>;
    async fn fetch_permissions(&mut self) -> AdapterResult<Vec<Permission>>;

    async fn fetch_snapshots(&mut self, vm: &VirtualMachine) -> AdapterResult<SnapshotTree>;
    async fn fetch_network_adapters(
        &mut self,
        vm: &VirtualMachine,
    ) -> AdapterResult<Vec<NetworkAdapter>>;
    async fn fetch_vm_performance(
        &mut self,
        vm: &VirtualMachine,
    ) -> AdapterResult<Vec<VmPerformance>>;
    async fn fetch_storage_adapters(
        &mut self,
        host: &HostSystem,
    ) -> AdapterResult<Vec<StorageAdapter>>;
    async fn fetch_scsi_luns(&mut self, host: &HostSystem) -> AdapterResult<Vec<ScsiLun>>;
    async fn fetch_host_performance(
        &mut self,
        host: &HostSystem,
    ) -> AdapterResult<Vec<HostPerformance>>;
    async fn fetch_drs_rules(&mut self, cluster: &Cluster) -> AdapterResult<Vec<DrsRule>>;
}

/// Builds a fresh adapter for a source at the start of each cycle.
pub trait AdapterFactory: Send + Sync {
    fn create(&self, source: &Source) -> AdapterResult<Box<dyn SourceAdapter>>;
}

/// Resolves the adapter kinds shipped with the crate.
///
/// | Kind | Endpoint |
/// |------|----------|
/// | `file` | path to a JSON inventory dump |
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinAdapters;

impl AdapterFactory for BuiltinAdapters {
    fn create(&self, source: &Source) -> AdapterResult<Box<dyn SourceAdapter>> {
        match source.adapter.as_str() {
            "file" => {
                let path = source.endpoint.as_deref().ok_or_else(|| {
                    AdapterError::connection(format!(
                        "source '{}' has no endpoint configured",
                        source.hostname
                    ))
                })?;
                Ok(Box::new(FileAdapter::new(path)))
            }
            other => Err(AdapterError::connection(format!(
                "unknown adapter kind: '{}'. Available: file",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SyncStatus;

    fn source(adapter: &str, endpoint: Option<&str>) -> Source {
        Source {
            id: 1,
            hostname: "vc01.lab".to_string(),
            username: None,
            credential_ref: None,
            adapter: adapter.to_string(),
            endpoint: endpoint.map(str::to_string),
            is_active: true,
            sync_status: SyncStatus::Pending,
            last_sync: None,
            last_error: None,
        }
    }

    #[test]
    fn unknown_kind_is_a_connection_error() {
        let err = BuiltinAdapters.create(&source("soap", None)).err().unwrap();
        assert!(matches!(err, AdapterError::Connection(m) if m.contains("soap")));
    }

    #[test]
    fn file_kind_requires_an_endpoint() {
        let err = BuiltinAdapters.create(&source("file", None)).err().unwrap();
        assert!(matches!(err, AdapterError::Connection(_)));
        assert!(BuiltinAdapters
            .create(&source("file", Some("/tmp/dump.json")))
            .is_ok());
    }
}
