//! TOML configuration.
//!
//! A single file configures the database, the sync engine, the query
//! interpreter, the HTTP server and logging. Only `[db].path` is required;
//! every other key has a default.
//!
//! ```toml
//! [db]
//! path = "./data/inventory.sqlite"
//!
//! [sync]
//! max_workers = 10
//! performance_retention_hours = 24
//!
//! [query]
//! fuzzy_threshold = 0.8
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}
fn default_busy_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_retention_hours")]
    pub performance_retention_hours: i64,
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    /// Per-source fetch timeout. `0` disables it.
    #[serde(default)]
    pub source_timeout_secs: u64,
    /// Scheduler interval used by `serve`. `0` disables periodic sync.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// A `syncing` claim older than this is treated as abandoned by a
    /// crashed process and may be taken over.
    #[serde(default = "default_stale_claim_minutes")]
    pub stale_claim_minutes: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            performance_retention_hours: default_retention_hours(),
            max_events: default_max_events(),
            source_timeout_secs: 0,
            interval_minutes: default_interval_minutes(),
            stale_claim_minutes: default_stale_claim_minutes(),
        }
    }
}

impl SyncConfig {
    pub fn source_timeout(&self) -> Option<Duration> {
        (self.source_timeout_secs > 0).then(|| Duration::from_secs(self.source_timeout_secs))
    }

    pub fn interval(&self) -> Option<Duration> {
        (self.interval_minutes > 0).then(|| Duration::from_secs(self.interval_minutes * 60))
    }
}

fn default_max_workers() -> usize {
    10
}
fn default_retention_hours() -> i64 {
    24
}
fn default_max_events() -> usize {
    100
}
fn default_interval_minutes() -> u64 {
    60
}
fn default_stale_claim_minutes() -> i64 {
    360
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    /// Regex with one capture group: the cluster name filter.
    #[serde(default = "default_cluster_pattern")]
    pub cluster_pattern: String,
    /// Regex with one capture group: the host name filter.
    #[serde(default = "default_host_pattern")]
    pub host_pattern: String,
    /// Session contexts kept in memory; the least recently used is evicted.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            cluster_pattern: default_cluster_pattern(),
            host_pattern: default_host_pattern(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_fuzzy_threshold() -> f64 {
    0.8
}
fn default_cluster_pattern() -> String {
    r"\bcluster\s+(\w+)".to_string()
}
fn default_host_pattern() -> String {
    r"\bhost\s+(\w+)".to_string()
}
fn default_max_sessions() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// A config with defaults everywhere and the database at `db_path`.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
                max_connections: default_max_connections(),
                busy_timeout_secs: default_busy_timeout_secs(),
            },
            sync: SyncConfig::default(),
            query: QueryConfig::default(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be >= 1");
    }

    if config.sync.max_workers == 0 {
        anyhow::bail!("sync.max_workers must be >= 1");
    }

    if config.sync.performance_retention_hours < 1 {
        anyhow::bail!("sync.performance_retention_hours must be >= 1");
    }

    if config.sync.stale_claim_minutes < 1 {
        anyhow::bail!("sync.stale_claim_minutes must be >= 1");
    }

    if config.query.max_sessions == 0 {
        anyhow::bail!("query.max_sessions must be >= 1");
    }

    let threshold = config.query.fuzzy_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        anyhow::bail!("query.fuzzy_threshold must be in (0.0, 1.0]");
    }

    for (key, pattern) in [
        ("query.cluster_pattern", &config.query.cluster_pattern),
        ("query.host_pattern", &config.query.host_pattern),
    ] {
        let re = regex::Regex::new(pattern)
            .with_context(|| format!("{} is not a valid regex", key))?;
        if re.captures_len() < 2 {
            anyhow::bail!("{} must contain a capture group", key);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse_config("[db]\npath = \"/tmp/inv.sqlite\"\n").unwrap();
        assert_eq!(config.db.max_connections, 10);
        assert_eq!(config.sync.max_workers, 10);
        assert_eq!(config.sync.performance_retention_hours, 24);
        assert_eq!(config.sync.max_events, 100);
        assert!(config.sync.source_timeout().is_none());
        assert_eq!(config.sync.interval(), Some(Duration::from_secs(3600)));
        assert!((config.query.fuzzy_threshold - 0.8).abs() < f64::EPSILON);
        assert_eq!(config.query.max_sessions, 1000);
        assert_eq!(config.sync.stale_claim_minutes, 360);
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn rejects_zero_workers() {
        let err = parse_config("[db]\npath = \"x.db\"\n[sync]\nmax_workers = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_workers"));
    }

    #[test]
    fn rejects_zero_session_cap() {
        let err = parse_config("[db]\npath = \"x.db\"\n[query]\nmax_sessions = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_sessions"));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err =
            parse_config("[db]\npath = \"x.db\"\n[query]\nfuzzy_threshold = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("fuzzy_threshold"));
    }

    #[test]
    fn rejects_name_pattern_without_capture_group() {
        let err = parse_config("[db]\npath = \"x.db\"\n[query]\nhost_pattern = 'host'\n")
            .unwrap_err();
        assert!(err.to_string().contains("host_pattern"));
    }

    #[test]
    fn zero_interval_disables_scheduler() {
        let config = parse_config("[db]\npath = \"x.db\"\n[sync]\ninterval_minutes = 0\nsource_timeout_secs = 5\n").unwrap();
        assert!(config.sync.interval().is_none());
        assert_eq!(config.sync.source_timeout(), Some(Duration::from_secs(5)));
    }
}
