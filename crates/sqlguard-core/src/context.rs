//! Input bundle passed from a host adapter into the validation engine.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::parser::StatementHandle;

/// Coarse statement classification, independent of dialect.
///
/// The parser is the single source of truth for this discriminator — no
/// checker re-derives it from the raw SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlCommandType {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Call,
    Unknown,
}

impl std::fmt::Display for SqlCommandType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Ddl => "DDL",
            Self::Call => "CALL",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Where the interceptor adapter is attached in the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionLayer {
    /// ORM-level hook point (e.g. a MyBatis/Hibernate-style interceptor).
    OrmLevel,
    /// Connection-pool filter (e.g. a HikariCP/Druid wrapper).
    PoolLevel,
    /// Generic JDBC (or JDBC-like) statement listener.
    JdbcListener,
    Unknown,
}

/// Row bounds requested by the caller, out-of-band from the SQL text itself.
///
/// Framework-level pagination (e.g. a `PageHelper`-style interceptor) often
/// supplies `offset`/`limit` without the SQL containing a literal `LIMIT`
/// clause — this is exactly the shape `LogicalPagination` (§4.4) watches for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowBounds {
    pub offset: u64,
    pub limit: u64,
}

/// Input to the validator: raw SQL plus everything known about the call
/// site at the moment of interception.
#[derive(Clone)]
pub struct SqlContext {
    /// Original, unmodified SQL text.
    pub sql: String,
    /// Stable hash of the normalized SQL (see [`SqlContext::sql_hash`]).
    sql_hash: String,
    pub command_type: SqlCommandType,
    /// Parsed statement handle, shared via the parser cache. `None` when
    /// parsing failed — checkers that need the AST fall back to a
    /// "analysis failed" treatment in that case.
    pub statement: Option<StatementHandle>,
    /// Ordered bound parameters, name -> value (positional params use
    /// their 1-based index as the key, e.g. `"$1"`).
    pub parameters: BTreeMap<String, String>,
    pub row_bounds: Option<RowBounds>,
    /// Stable per-call-site identifier; see [`crate::adapter::derive_statement_id`].
    pub statement_id: String,
    pub datasource: String,
    pub execution_layer: ExecutionLayer,
    pub mapper_id: Option<String>,
    /// Alternative SQL strings the same call site may emit (dynamic SQL,
    /// e.g. a MyBatis `<if>` fragment toggling a WHERE clause on and off).
    pub dynamic_variants: Vec<String>,
}

impl SqlContext {
    /// Build a context for a single, static piece of SQL.
    #[must_use]
    pub fn new(
        sql: impl Into<String>,
        statement_id: impl Into<String>,
        datasource: impl Into<String>,
        execution_layer: ExecutionLayer,
    ) -> Self {
        let sql = sql.into();
        let sql_hash = Self::compute_sql_hash(&sql);
        Self {
            sql,
            sql_hash,
            command_type: SqlCommandType::Unknown,
            statement: None,
            parameters: BTreeMap::new(),
            row_bounds: None,
            statement_id: statement_id.into(),
            datasource: datasource.into(),
            execution_layer,
            mapper_id: None,
            dynamic_variants: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_row_bounds(mut self, bounds: RowBounds) -> Self {
        self.row_bounds = Some(bounds);
        self
    }

    #[must_use]
    pub fn with_mapper_id(mut self, mapper_id: impl Into<String>) -> Self {
        self.mapper_id = Some(mapper_id.into());
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_dynamic_variants(mut self, variants: Vec<String>) -> Self {
        self.dynamic_variants = variants;
        self
    }

    /// Stable hash of the normalized SQL: lower-cased, whitespace-collapsed,
    /// then SHA-256 hex-encoded. Identical input always yields an identical
    /// hash (spec invariant on `SqlContext`).
    #[must_use]
    pub fn sql_hash(&self) -> &str {
        &self.sql_hash
    }

    fn compute_sql_hash(sql: &str) -> String {
        let normalized = normalize_for_hash(sql);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Recompute the hash after `sql` has been mutated by a dialect rewrite.
    pub(crate) fn refresh_hash(&mut self) {
        self.sql_hash = Self::compute_sql_hash(&self.sql);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }
}

/// Lower-case and collapse runs of whitespace to a single space, for cache
/// keying and hash purposes only — never used to rewrite SQL that is
/// actually executed.
#[must_use]
pub fn normalize_for_hash(sql: &str) -> String {
    let mut normalized = String::with_capacity(sql.len());
    let mut last_was_space = false;
    for ch in sql.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                normalized.push(' ');
                last_was_space = true;
            }
        } else {
            normalized.extend(ch.to_lowercase());
            last_was_space = false;
        }
    }
    normalized
}

/// Shared, read-only handle. Used where a caller needs to hold a reference
/// to statement identity without owning the parsed AST.
pub type SharedSql = Arc<str>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_lowercases() {
        assert_eq!(normalize_for_hash("  SELECT  *\nFROM\tusers "), "select * from users");
    }

    #[test]
    fn identical_sql_yields_identical_hash() {
        let a = SqlContext::new("SELECT 1", "site:1", "ds", ExecutionLayer::OrmLevel);
        let b = SqlContext::new("select   1", "site:2", "ds", ExecutionLayer::OrmLevel);
        assert_eq!(a.sql_hash(), b.sql_hash());
    }

    #[test]
    fn different_sql_yields_different_hash() {
        let a = SqlContext::new("SELECT 1", "site:1", "ds", ExecutionLayer::OrmLevel);
        let b = SqlContext::new("SELECT 2", "site:1", "ds", ExecutionLayer::OrmLevel);
        assert_ne!(a.sql_hash(), b.sql_hash());
    }

    #[test]
    fn empty_sql_detected() {
        let ctx = SqlContext::new("   ", "site:1", "ds", ExecutionLayer::PoolLevel);
        assert!(ctx.is_empty());
    }
}
