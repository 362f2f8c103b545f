//! Natural-language queries over the mirrored inventory.
//!
//! A request goes through a fixed pipeline:
//!
//! | Stage | What happens |
//! |-------|--------------|
//! | normalize | lower-case, split on whitespace, trim surrounding punctuation |
//! | correct | replace near-miss tokens with the closest keyword (indel ratio, `2·LCS / (len_a + len_b)`) |
//! | classify | earliest entity keyword wins (default `vm`), earliest action keyword wins (default `get`) |
//! | filter | entity-specific state phrases plus `cluster <word>` / `host <word>` name captures |
//! | execute | one read-only SELECT against the entity's table |
//!
//! Nothing here ever fails on unrecognized input: missing keywords fall back
//! to defaults and an unfiltered query over the whole table.
//!
//! # Keywords
//!
//! Keyword phrases match whole tokens. A bare `on` / `off` only reads as a
//! power state at the end of a request or right before a VM keyword, so
//! "vms on host esx01" filters by host, not by power state. The flip side is
//! that an `on` in the middle of a request is ignored: "list vms that are on
//! in cluster prod" gets no power filter. Use `powered on` or `running` there.
//!
//! Dropped letters are corrected as readily as swapped ones: `cont` reads as
//! `count` and `hsts` as `hosts`.

use rapidfuzz::fuzz;
use regex::Regex;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::config::QueryConfig;

/// Session used by [`QueryInterpreter::interpret`].
pub const DEFAULT_SESSION: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Vm,
    Host,
    Datastore,
    Cluster,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Vm => "vm",
            EntityType::Host => "host",
            EntityType::Datastore => "datastore",
            EntityType::Cluster => "cluster",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            EntityType::Vm => "virtual_machines",
            EntityType::Host => "hosts",
            EntityType::Datastore => "datastores",
            EntityType::Cluster => "clusters",
        }
    }

    fn projection(&self) -> &'static str {
        match self {
            EntityType::Vm => {
                "id, source_id, moid, name, power_state, cpu_count, memory_mb, ip_address, \
                 os_name, cluster, host"
            }
            EntityType::Host => {
                "id, source_id, moid, name, connection_state, power_state, cpu_cores, \
                 memory_size, cluster, vm_count"
            }
            EntityType::Datastore => {
                "id, source_id, moid, name, datastore_type, capacity, free_space, accessible, \
                 vm_count"
            }
            EntityType::Cluster => {
                "id, source_id, moid, name, total_cpu, total_memory, num_hosts, num_vms, \
                 drs_enabled, ha_enabled"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Get,
    Count,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Count => "count",
        }
    }
}

const ENTITY_KEYWORDS: &[(EntityType, &[&str])] = &[
    (
        EntityType::Vm,
        &["vm", "vms", "virtual machine", "virtual machines", "machine", "machines"],
    ),
    (
        EntityType::Host,
        &["host", "hosts", "esxi", "server", "servers"],
    ),
    (
        EntityType::Datastore,
        &["datastore", "datastores", "storage", "disk", "disks"],
    ),
    (EntityType::Cluster, &["cluster", "clusters"]),
];

const ACTION_KEYWORDS: &[(Action, &[&str])] = &[
    (
        Action::Get,
        &["get", "show", "list", "find", "display", "fetch"],
    ),
    (Action::Count, &["count", "how many", "number of", "total"]),
];

const POWERED_ON: &[&str] = &["powered on", "poweredon", "running", "active", "on"];
const POWERED_OFF: &[&str] = &["powered off", "poweredoff", "stopped", "off", "shutdown"];
const EMPTY: &[&str] = &["empty", "no vms", "0 vms", "zero vms", "unused"];
const HOST_WITHOUT_VMS: &[&str] = &["no vms", "0 vms", "zero vms", "empty"];

/// Filters extracted from a request. Unset filters are omitted when
/// serialized, so an unfiltered request reports `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_vms: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        *self == QueryFilters::default()
    }
}

/// A classified request, before execution.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub corrected: String,
    pub entity_type: EntityType,
    pub action: Action,
    pub filters: QueryFilters,
}

// ═══════════════════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════════════════

/// Pure text-to-plan stage of the interpreter.
pub struct QueryParser {
    vocabulary: Vec<&'static str>,
    threshold: f64,
    cluster_pattern: Regex,
    host_pattern: Regex,
}

impl QueryParser {
    pub fn new(config: &QueryConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            vocabulary: vocabulary(),
            threshold: config.fuzzy_threshold,
            cluster_pattern: Regex::new(&config.cluster_pattern)?,
            host_pattern: Regex::new(&config.host_pattern)?,
        })
    }

    pub fn parse(&self, text: &str) -> QueryPlan {
        let tokens: Vec<String> = normalize(text)
            .into_iter()
            .map(|t| self.correct(&t))
            .collect();
        let corrected = tokens.join(" ");

        let entity_type = earliest(&tokens, ENTITY_KEYWORDS).unwrap_or(EntityType::Vm);
        let action = earliest(&tokens, ACTION_KEYWORDS).unwrap_or(Action::Get);
        let filters = self.filters(&tokens, &corrected, entity_type);

        QueryPlan {
            corrected,
            entity_type,
            action,
            filters,
        }
    }

    /// Closest keyword if it scores strictly above the threshold, else the
    /// token unchanged. Ties keep the first vocabulary entry.
    pub fn correct(&self, token: &str) -> String {
        if self.vocabulary.contains(&token) {
            return token.to_string();
        }

        let mut best: Option<(&str, f64)> = None;
        for &word in &self.vocabulary {
            let score = fuzz::ratio(token.chars(), word.chars());
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((word, score));
            }
        }

        match best {
            Some((word, score)) if score > self.threshold => word.to_string(),
            _ => token.to_string(),
        }
    }

    fn filters(&self, tokens: &[String], corrected: &str, entity: EntityType) -> QueryFilters {
        let mut filters = QueryFilters::default();

        match entity {
            EntityType::Vm => filters.power_state = power_state(tokens).map(str::to_string),
            EntityType::Datastore => {
                if EMPTY.iter().any(|p| find_phrase(tokens, p).is_some()) {
                    filters.empty = Some(true);
                }
            }
            EntityType::Host => {
                if HOST_WITHOUT_VMS.iter().any(|p| find_phrase(tokens, p).is_some()) {
                    filters.no_vms = Some(true);
                }
            }
            EntityType::Cluster => {}
        }

        filters.cluster = capture(&self.cluster_pattern, corrected);
        filters.host = capture(&self.host_pattern, corrected);
        filters
    }
}

/// Every word of every keyword phrase, first occurrence order.
fn vocabulary() -> Vec<&'static str> {
    let entity = ENTITY_KEYWORDS.iter().flat_map(|(_, p)| p.iter().copied());
    let action = ACTION_KEYWORDS.iter().flat_map(|(_, p)| p.iter().copied());
    let state = [POWERED_ON, POWERED_OFF, EMPTY]
        .into_iter()
        .flat_map(|p| p.iter().copied());

    let mut words: Vec<&'static str> = Vec::new();
    for phrase in entity.chain(action).chain(state) {
        for word in phrase.split_whitespace() {
            if !words.contains(&word) {
                words.push(word);
            }
        }
    }
    words
}

fn normalize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn phrase_positions<'a>(tokens: &'a [String], phrase: &str) -> impl Iterator<Item = usize> + 'a {
    let words: Vec<String> = phrase.split_whitespace().map(str::to_string).collect();
    let width = words.len().max(1);
    tokens
        .windows(width)
        .enumerate()
        .filter(move |(_, window)| !words.is_empty() && window == &words.as_slice())
        .map(|(i, _)| i)
}

fn find_phrase(tokens: &[String], phrase: &str) -> Option<usize> {
    phrase_positions(tokens, phrase).next()
}

/// The kind whose keyword appears first. Equal positions go to the earlier
/// table entry.
fn earliest<K: Copy>(tokens: &[String], table: &[(K, &[&str])]) -> Option<K> {
    let mut best: Option<(usize, K)> = None;
    for (kind, phrases) in table {
        for phrase in phrases.iter() {
            if let Some(pos) = find_phrase(tokens, phrase) {
                if best.map_or(true, |(b, _)| pos < b) {
                    best = Some((pos, *kind));
                }
            }
        }
    }
    best.map(|(_, kind)| kind)
}

fn starts_vm_keyword(tokens: &[String], at: usize) -> bool {
    let rest = tokens.get(at..).unwrap_or_default();
    ENTITY_KEYWORDS
        .iter()
        .filter(|(kind, _)| *kind == EntityType::Vm)
        .flat_map(|(_, phrases)| phrases.iter())
        .any(|phrase| find_phrase(rest, phrase) == Some(0))
}

fn power_state(tokens: &[String]) -> Option<&'static str> {
    let mut best: Option<(usize, &'static str)> = None;
    for (state, phrases) in [("poweredOn", POWERED_ON), ("poweredOff", POWERED_OFF)] {
        for phrase in phrases {
            let bare = !phrase.contains(' ') && (*phrase == "on" || *phrase == "off");
            let hit = phrase_positions(tokens, phrase).find(|&pos| {
                !bare || pos + 1 == tokens.len() || starts_vm_keyword(tokens, pos + 1)
            });
            if let Some(pos) = hit {
                if best.map_or(true, |(b, _)| pos < b) {
                    best = Some((pos, state));
                }
            }
        }
    }
    best.map(|(_, state)| state)
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

// ═══════════════════════════════════════════════════════════════════════
// Results
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct VmRow {
    pub id: i64,
    pub source_id: i64,
    pub moid: String,
    pub name: String,
    pub power_state: Option<String>,
    pub cpu_count: Option<i64>,
    pub memory_mb: Option<i64>,
    pub ip_address: Option<String>,
    pub os_name: Option<String>,
    pub cluster: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HostRow {
    pub id: i64,
    pub source_id: i64,
    pub moid: String,
    pub name: String,
    pub connection_state: Option<String>,
    pub power_state: Option<String>,
    pub cpu_cores: Option<i64>,
    pub memory_size: Option<i64>,
    pub cluster: Option<String>,
    pub vm_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatastoreRow {
    pub id: i64,
    pub source_id: i64,
    pub moid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub datastore_type: Option<String>,
    pub capacity: Option<i64>,
    pub free_space: Option<i64>,
    pub accessible: Option<bool>,
    pub vm_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterRow {
    pub id: i64,
    pub source_id: i64,
    pub moid: String,
    pub name: String,
    pub total_cpu: Option<i64>,
    pub total_memory: Option<i64>,
    pub num_hosts: i64,
    pub num_vms: i64,
    pub drs_enabled: Option<bool>,
    pub ha_enabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum QueryRow {
    Vm(VmRow),
    Host(HostRow),
    Datastore(DatastoreRow),
    Cluster(ClusterRow),
}

impl QueryRow {
    pub fn name(&self) -> &str {
        match self {
            QueryRow::Vm(r) => &r.name,
            QueryRow::Host(r) => &r.name,
            QueryRow::Datastore(r) => &r.name,
            QueryRow::Cluster(r) => &r.name,
        }
    }

    pub fn source_id(&self) -> i64 {
        match self {
            QueryRow::Vm(r) => r.source_id,
            QueryRow::Host(r) => r.source_id,
            QueryRow::Datastore(r) => r.source_id,
            QueryRow::Cluster(r) => r.source_id,
        }
    }

    fn from_row(entity: EntityType, row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(match entity {
            EntityType::Vm => QueryRow::Vm(VmRow {
                id: row.try_get("id")?,
                source_id: row.try_get("source_id")?,
                moid: row.try_get("moid")?,
                name: row.try_get("name")?,
                power_state: row.try_get("power_state")?,
                cpu_count: row.try_get("cpu_count")?,
                memory_mb: row.try_get("memory_mb")?,
                ip_address: row.try_get("ip_address")?,
                os_name: row.try_get("os_name")?,
                cluster: row.try_get("cluster")?,
                host: row.try_get("host")?,
            }),
            EntityType::Host => QueryRow::Host(HostRow {
                id: row.try_get("id")?,
                source_id: row.try_get("source_id")?,
                moid: row.try_get("moid")?,
                name: row.try_get("name")?,
                connection_state: row.try_get("connection_state")?,
                power_state: row.try_get("power_state")?,
                cpu_cores: row.try_get("cpu_cores")?,
                memory_size: row.try_get("memory_size")?,
                cluster: row.try_get("cluster")?,
                vm_count: row.try_get("vm_count")?,
            }),
            EntityType::Datastore => QueryRow::Datastore(DatastoreRow {
                id: row.try_get("id")?,
                source_id: row.try_get("source_id")?,
                moid: row.try_get("moid")?,
                name: row.try_get("name")?,
                datastore_type: row.try_get("datastore_type")?,
                capacity: row.try_get("capacity")?,
                free_space: row.try_get("free_space")?,
                accessible: row.try_get("accessible")?,
                vm_count: row.try_get("vm_count")?,
            }),
            EntityType::Cluster => QueryRow::Cluster(ClusterRow {
                id: row.try_get("id")?,
                source_id: row.try_get("source_id")?,
                moid: row.try_get("moid")?,
                name: row.try_get("name")?,
                total_cpu: row.try_get("total_cpu")?,
                total_memory: row.try_get("total_memory")?,
                num_hosts: row.try_get("num_hosts")?,
                num_vms: row.try_get("num_vms")?,
                drs_enabled: row.try_get("drs_enabled")?,
                ha_enabled: row.try_get("ha_enabled")?,
            }),
        })
    }
}

/// Interpreter output. `data` is absent for `count` requests.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub entity_type: EntityType,
    pub action: Action,
    pub filters: QueryFilters,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<QueryRow>>,
}

/// What a session's previous request resolved to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryContext {
    pub entity_type: EntityType,
    pub filters: QueryFilters,
    pub result_count: usize,
}

// ═══════════════════════════════════════════════════════════════════════
// Interpreter
// ═══════════════════════════════════════════════════════════════════════

/// Last context per session, capped at `capacity` entries. Recording a
/// new session when full evicts the one written longest ago.
struct SessionContexts {
    capacity: usize,
    tick: u64,
    entries: HashMap<String, (u64, QueryContext)>,
}

impl SessionContexts {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
        }
    }

    fn record(&mut self, session: &str, context: QueryContext) {
        if !self.entries.contains_key(session) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, (tick, _))| *tick)
                .map(|(name, _)| name.clone());
            if let Some(name) = oldest {
                debug!(session = %name, "evicting query session");
                self.entries.remove(&name);
            }
        }
        self.tick += 1;
        self.entries
            .insert(session.to_string(), (self.tick, context));
    }

    fn get(&self, session: &str) -> Option<&QueryContext> {
        self.entries.get(session).map(|(_, context)| context)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct QueryInterpreter {
    parser: QueryParser,
    pool: SqlitePool,
    sessions: Mutex<SessionContexts>,
}

impl QueryInterpreter {
    pub fn new(pool: SqlitePool, config: &QueryConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            parser: QueryParser::new(config)?,
            pool,
            sessions: Mutex::new(SessionContexts::new(config.max_sessions)),
        })
    }

    pub fn parser(&self) -> &QueryParser {
        &self.parser
    }

    pub async fn interpret(&self, text: &str) -> Result<QueryResult, sqlx::Error> {
        self.interpret_in(DEFAULT_SESSION, text).await
    }

    pub async fn interpret_in(
        &self,
        session: &str,
        text: &str,
    ) -> Result<QueryResult, sqlx::Error> {
        let plan = self.parser.parse(text);
        info!(
            query = text,
            corrected = %plan.corrected,
            entity = plan.entity_type.as_str(),
            action = plan.action.as_str(),
            "interpreting query"
        );

        let result = self.execute(plan).await?;

        let context = QueryContext {
            entity_type: result.entity_type,
            filters: result.filters.clone(),
            result_count: result.count,
        };
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record(session, context);

        Ok(result)
    }

    pub fn last_context(&self, session: &str) -> Option<QueryContext> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(session)
            .cloned()
    }

    /// Number of sessions with a stored context.
    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    async fn execute(&self, plan: QueryPlan) -> Result<QueryResult, sqlx::Error> {
        let entity = plan.entity_type;

        let (count, data) = match plan.action {
            Action::Count => {
                let mut qb = QueryBuilder::<Sqlite>::new(format!(
                    "SELECT COUNT(*) FROM {}",
                    entity.table()
                ));
                push_conditions(&mut qb, entity, &plan.filters);
                let n = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
                (n.max(0) as usize, None)
            }
            Action::Get => {
                let mut qb = QueryBuilder::<Sqlite>::new(format!(
                    "SELECT {} FROM {}",
                    entity.projection(),
                    entity.table()
                ));
                push_conditions(&mut qb, entity, &plan.filters);
                qb.push(" ORDER BY source_id, name, id");
                let rows = qb.build().fetch_all(&self.pool).await?;
                let data = rows
                    .iter()
                    .map(|row| QueryRow::from_row(entity, row))
                    .collect::<Result<Vec<_>, _>>()?;
                (data.len(), Some(data))
            }
        };

        debug!(entity = entity.as_str(), count, "query executed");

        Ok(QueryResult {
            entity_type: entity,
            action: plan.action,
            filters: plan.filters,
            count,
            data,
        })
    }
}

/// Only filters meaningful for the entity are applied; name filters are
/// case-insensitive substring matches.
fn push_conditions(qb: &mut QueryBuilder<'_, Sqlite>, entity: EntityType, filters: &QueryFilters) {
    qb.push(" WHERE 1 = 1");

    match entity {
        EntityType::Vm => {
            if let Some(state) = &filters.power_state {
                qb.push(" AND power_state = ").push_bind(state.clone());
            }
            push_contains(qb, "cluster", filters.cluster.as_deref());
            push_contains(qb, "host", filters.host.as_deref());
        }
        EntityType::Host => {
            if filters.no_vms == Some(true) {
                qb.push(" AND vm_count = 0");
            }
            push_contains(qb, "cluster", filters.cluster.as_deref());
            push_contains(qb, "name", filters.host.as_deref());
        }
        EntityType::Datastore => {
            if filters.empty == Some(true) {
                qb.push(" AND vm_count = 0");
            }
        }
        EntityType::Cluster => {
            push_contains(qb, "name", filters.cluster.as_deref());
        }
    }
}

fn push_contains(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, needle: Option<&str>) {
    let Some(needle) = needle else {
        return;
    };
    let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    qb.push(format!(" AND lower({}) LIKE ", column))
        .push_bind(format!("%{}%", escaped))
        .push(" ESCAPE '\\'");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> QueryParser {
        QueryParser::new(&QueryConfig::default()).unwrap()
    }

    #[test]
    fn typos_are_corrected_before_classification() {
        let p = parser();
        let typo = p.parse("shoe me all powred on vms");
        let clean = p.parse("show me all powered on vms");

        assert_eq!(typo.entity_type, EntityType::Vm);
        assert_eq!(typo.action, Action::Get);
        assert_eq!(typo.filters.power_state.as_deref(), Some("poweredOn"));
        assert_eq!(typo.entity_type, clean.entity_type);
        assert_eq!(typo.action, clean.action);
        assert_eq!(typo.filters, clean.filters);
        assert!(typo.corrected.contains("powered on"));
    }

    #[test]
    fn unknown_words_fall_back_to_defaults() {
        let plan = parser().parse("xyz abc");
        assert_eq!(plan.entity_type, EntityType::Vm);
        assert_eq!(plan.action, Action::Get);
        assert!(plan.filters.is_empty());
        assert_eq!(serde_json::to_string(&plan.filters).unwrap(), "{}");
    }

    #[test]
    fn correction_needs_strictly_more_than_threshold() {
        let p = parser();
        // shoe/show share three of four letters: 2*3/8 = 0.75
        assert_eq!(p.correct("shoe"), "shoe");
        assert_eq!(p.correct("powred"), "powered");
        assert_eq!(p.correct("clustr"), "cluster");
        assert_eq!(p.correct("esx01"), "esx01");
    }

    fn context(result_count: usize) -> QueryContext {
        QueryContext {
            entity_type: EntityType::Vm,
            filters: QueryFilters::default(),
            result_count,
        }
    }

    #[test]
    fn session_contexts_evict_oldest_write_when_full() {
        let mut sessions = SessionContexts::new(2);
        sessions.record("a", context(1));
        sessions.record("b", context(2));
        // rewriting a known session never evicts
        sessions.record("a", context(3));
        assert_eq!(sessions.len(), 2);

        sessions.record("c", context(4));
        assert_eq!(sessions.len(), 2);
        assert!(sessions.get("b").is_none());
        assert_eq!(sessions.get("a").map(|c| c.result_count), Some(3));
        assert_eq!(sessions.get("c").map(|c| c.result_count), Some(4));
    }

    #[test]
    fn dropped_letters_are_corrected() {
        let p = parser();
        assert_eq!(p.correct("cont"), "count");
        assert_eq!(p.correct("hsts"), "hosts");
        assert_eq!(p.correct("shw"), "show");
        assert_eq!(p.correct("hostt"), "host");

        let count = p.parse("cont vms");
        assert_eq!(count.corrected, "count vms");
        assert_eq!(count.action, Action::Count);
        assert_eq!(count.entity_type, EntityType::Vm);

        let hosts = p.parse("shw hsts");
        assert_eq!(hosts.corrected, "show hosts");
        assert_eq!(hosts.action, Action::Get);
        assert_eq!(hosts.entity_type, EntityType::Host);
    }

    #[test]
    fn count_and_get_share_entity_and_filters() {
        let p = parser();
        let count = p.parse("how many hosts with no vms");
        let list = p.parse("show hosts with no vms");

        assert_eq!(count.action, Action::Count);
        assert_eq!(list.action, Action::Get);
        for plan in [&count, &list] {
            assert_eq!(plan.entity_type, EntityType::Host);
            assert_eq!(plan.filters.no_vms, Some(true));
            assert_eq!(plan.filters.host, None);
        }
    }

    #[test]
    fn earliest_entity_keyword_wins() {
        let p = parser();
        assert_eq!(p.parse("list vms on host esx01").entity_type, EntityType::Vm);
        assert_eq!(p.parse("list host esx01 vms").entity_type, EntityType::Host);
        assert_eq!(p.parse("count empty datastores").entity_type, EntityType::Datastore);
    }

    #[test]
    fn bare_on_needs_end_of_text_or_vm_keyword() {
        let p = parser();

        let on_host = p.parse("show vms on host esx01");
        assert_eq!(on_host.filters.power_state, None);
        assert_eq!(on_host.filters.host.as_deref(), Some("esx01"));

        assert_eq!(
            p.parse("which vms are on").filters.power_state.as_deref(),
            Some("poweredOn")
        );

        let mid_sentence = p.parse("list vms that are on in cluster prod");
        assert_eq!(mid_sentence.filters.power_state, None);
        assert_eq!(mid_sentence.filters.cluster.as_deref(), Some("prod"));

        assert_eq!(
            p.parse("count off vms").filters.power_state.as_deref(),
            Some("poweredOff")
        );
        assert_eq!(
            p.parse("show stopped vms on host esx01")
                .filters
                .power_state
                .as_deref(),
            Some("poweredOff")
        );
    }

    #[test]
    fn name_filters_come_from_cluster_and_host_captures() {
        let p = parser();
        let plan = p.parse("How many VMs in cluster Prod?");
        assert_eq!(plan.action, Action::Count);
        assert_eq!(plan.filters.cluster.as_deref(), Some("prod"));

        let plural = p.parse("list clusters");
        assert_eq!(plural.entity_type, EntityType::Cluster);
        assert_eq!(plural.filters.cluster, None);
    }

    #[test]
    fn datastore_empty_phrases_set_flag() {
        let p = parser();
        assert_eq!(p.parse("show unused datastores").filters.empty, Some(true));
        assert_eq!(p.parse("show datastores").filters.empty, None);
        // state phrases are scoped to their entity
        assert_eq!(p.parse("show empty hosts").filters.empty, None);
    }

    #[test]
    fn vocabulary_is_deduplicated_words() {
        let words = vocabulary();
        assert!(words.contains(&"virtual"));
        assert!(words.contains(&"many"));
        assert_eq!(words.iter().filter(|w| **w == "vms").count(), 1);
        assert!(!words.iter().any(|w| w.contains(' ')));
    }
}
