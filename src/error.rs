//! Error taxonomy for the sync path.
//!
//! Adapters report [`AdapterError`]; the orchestrator classifies outcomes
//! into [`SyncError`]. Object-scoped adapter failures never become a
//! `SyncError`: they are logged and the object is skipped.

use thiserror::Error;

/// Failure reported by a [`SourceAdapter`](crate::adapter::SourceAdapter).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    /// The source cannot be reached, authenticated to, or has dropped the
    /// session. Fatal to the current cycle.
    #[error("connection error: {0}")]
    Connection(String),

    /// A failure scoped to a single remote object.
    #[error("object {object}: {message}")]
    Object { object: String, message: String },
}

impl AdapterError {
    pub fn connection(message: impl Into<String>) -> Self {
        AdapterError::Connection(message.into())
    }

    pub fn object(object: impl Into<String>, message: impl Into<String>) -> Self {
        AdapterError::Object {
            object: object.into(),
            message: message.into(),
        }
    }
}

/// Fatal outcome of one source's sync cycle, or a lookup failure.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("source {0} not found")]
    NotFound(i64),

    #[error("source {0} is already being synced")]
    AlreadySyncing(i64),

    #[error("cannot connect to {hostname}: {message}")]
    Connection { hostname: String, message: String },

    #[error("sync of {hostname} timed out after {secs}s")]
    Timeout { hostname: String, secs: u64 },

    #[error("failed to commit inventory for {hostname}: {source}")]
    Commit {
        hostname: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl SyncError {
    /// Short machine-readable classification, used in reports and HTTP bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::NotFound(_) => "not_found",
            SyncError::AlreadySyncing(_) => "already_syncing",
            SyncError::Connection { .. } => "connection",
            SyncError::Timeout { .. } => "timeout",
            SyncError::Commit { .. } => "commit",
            SyncError::Store(_) => "store",
        }
    }
}
