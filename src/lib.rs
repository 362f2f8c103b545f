//! # vmirror
//!
//! A local mirror of virtualization inventory.
//!
//! vmirror periodically pulls the inventory of one or more remote
//! virtualization-management sources into SQLite, replacing each source's
//! records atomically per sync cycle, and answers free-text questions about
//! the mirrored data ("how many hosts with no vms").
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────┐
//! │  Sources    │──▶│ SyncOrchestrator │──▶│  SQLite  │
//! │ (adapters)  │   │  bounded pool    │   │   WAL    │
//! └─────────────┘   └──────────────────┘   └────┬─────┘
//!                                               │
//!                      ┌────────────────────────┤
//!                      ▼                        ▼
//!                 ┌──────────┐       ┌──────────────────┐
//!                 │   CLI    │       │  HTTP + query    │
//!                 │(vmirror) │       │   interpreter    │
//!                 └──────────┘       └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vmirror init
//! vmirror source add vc01.lab --endpoint ./dumps/vc01.json
//! vmirror sync all
//! vmirror query "how many powered off vms in cluster prod"
//! vmirror serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Adapter and sync error taxonomy |
//! | [`models`] | Sources, inventory records, snapshot trees |
//! | [`adapter`] | `SourceAdapter` / `AdapterFactory` traits |
//! | [`adapter_file`] | JSON inventory dump adapter |
//! | [`sqlite_store`] | Source status and atomic per-source replace |
//! | [`pool`] | Bounded task pool |
//! | [`sync`] | Orchestrator and replace transaction |
//! | [`query`] | Natural-language query interpreter |
//! | [`scheduler`] | Periodic background sync |
//! | [`server`] | JSON HTTP API |
//! | [`sources`], [`sync_cmd`], [`query_cmd`] | CLI commands |

pub mod adapter;
pub mod adapter_file;
pub mod config;
pub mod db;
pub mod error;
pub mod migrate;
pub mod models;
pub mod pool;
pub mod query;
pub mod query_cmd;
pub mod scheduler;
pub mod server;
pub mod sources;
pub mod sqlite_store;
pub mod sync;
pub mod sync_cmd;
