//! Pagination-hygiene checkers (spec §4.4, bottom of the rule table).

use sqlparser::ast::{Expr, Query, SetExpr, Value};

use super::Checker;
use crate::{
    context::SqlContext,
    result::{RiskLevel, Violation},
    visitor::StatementVisitor,
};

const ID_LOGICAL_PAGINATION: &str = "LogicalPagination";
const ID_DEEP_PAGINATION: &str = "DeepPagination";
const ID_LARGE_PAGE_SIZE: &str = "LargePageSize";
const ID_MISSING_ORDER_BY: &str = "MissingOrderBy";
const ID_NO_PAGINATION: &str = "NoPagination";

const DEFAULT_DEEP_PAGINATION_OFFSET: u64 = 10_000;
const DEFAULT_MAX_PAGE_SIZE: u64 = 1_000;

/// Row bounds were supplied out-of-band (e.g. a `PageHelper`-style
/// interceptor) but the SQL itself carries no `LIMIT` — the framework
/// believes it's paginating while the database executes a full scan.
pub struct LogicalPaginationChecker;

impl StatementVisitor for LogicalPaginationChecker {}

impl Checker for LogicalPaginationChecker {
    fn id(&self) -> &'static str {
        ID_LOGICAL_PAGINATION
    }

    fn check(&self, ctx: &SqlContext) -> Vec<Violation> {
        if ctx.row_bounds.is_none() {
            return Vec::new();
        }
        let sql_has_limit = ctx
            .statement
            .as_ref()
            .and_then(|h| h.first())
            .map(query_limit_present)
            .unwrap_or(false);
        if sql_has_limit {
            return Vec::new();
        }
        vec![Violation::new(
            ID_LOGICAL_PAGINATION,
            RiskLevel::Critical,
            "row bounds were supplied out-of-band but the SQL has no LIMIT clause",
        )
        .with_suggestion("rewrite the SQL to carry LIMIT/OFFSET directly, or route it through the dialect adapter")]
    }
}

fn query_limit_present(statement: &sqlparser::ast::Statement) -> bool {
    match statement {
        sqlparser::ast::Statement::Query(query) => query.limit.is_some() || has_top(query),
        _ => false,
    }
}

fn has_top(query: &Query) -> bool {
    matches!(query.body.as_ref(), SetExpr::Select(select) if select.top.is_some())
}

/// `LIMIT`/`OFFSET` beyond a configured offset threshold — deep pagination
/// that degrades to an O(offset) scan in most engines.
pub struct DeepPaginationChecker {
    max_offset: u64,
}

impl Default for DeepPaginationChecker {
    fn default() -> Self {
        Self { max_offset: DEFAULT_DEEP_PAGINATION_OFFSET }
    }
}

impl DeepPaginationChecker {
    #[must_use]
    pub fn new(max_offset: u64) -> Self {
        Self { max_offset }
    }
}

impl StatementVisitor for DeepPaginationChecker {
    fn visit_select(&self, ctx: &SqlContext, query: &Query) -> Vec<Violation> {
        let offset = numeric_offset(query).or_else(|| ctx.row_bounds.map(|b| b.offset));
        match offset {
            Some(offset) if offset > self.max_offset => vec![Violation::new(
                ID_DEEP_PAGINATION,
                RiskLevel::Medium,
                format!("offset {offset} exceeds the configured deep-pagination threshold ({})", self.max_offset),
            )
            .with_suggestion("paginate with a keyset/cursor strategy instead of a large OFFSET")],
            _ => Vec::new(),
        }
    }
}

impl Checker for DeepPaginationChecker {
    fn id(&self) -> &'static str {
        ID_DEEP_PAGINATION
    }
}

/// `LIMIT n` above a configured page-size cap.
pub struct LargePageSizeChecker {
    max_limit: u64,
}

impl Default for LargePageSizeChecker {
    fn default() -> Self {
        Self { max_limit: DEFAULT_MAX_PAGE_SIZE }
    }
}

impl LargePageSizeChecker {
    #[must_use]
    pub fn new(max_limit: u64) -> Self {
        Self { max_limit }
    }
}

impl StatementVisitor for LargePageSizeChecker {
    fn visit_select(&self, ctx: &SqlContext, query: &Query) -> Vec<Violation> {
        let limit = numeric_limit(query).or_else(|| ctx.row_bounds.map(|b| b.limit));
        match limit {
            Some(limit) if limit > self.max_limit => vec![Violation::new(
                ID_LARGE_PAGE_SIZE,
                RiskLevel::Medium,
                format!("page size {limit} exceeds the configured cap ({})", self.max_limit),
            )
            .with_suggestion("reduce the page size or stream results instead of fetching one large page")],
            _ => Vec::new(),
        }
    }
}

impl Checker for LargePageSizeChecker {
    fn id(&self) -> &'static str {
        ID_LARGE_PAGE_SIZE
    }
}

/// A paginated query (`LIMIT`/`OFFSET` present, from SQL or row bounds)
/// without an `ORDER BY` — page contents and boundaries are undefined across
/// calls without one.
pub struct MissingOrderByChecker;

impl StatementVisitor for MissingOrderByChecker {
    fn visit_select(&self, ctx: &SqlContext, query: &Query) -> Vec<Violation> {
        let is_paginated = query.limit.is_some() || has_top(query) || ctx.row_bounds.is_some();
        if is_paginated && query.order_by.is_empty() {
            return vec![Violation::new(ID_MISSING_ORDER_BY, RiskLevel::Low, "pagination without an ORDER BY produces an unstable page order")
                .with_suggestion("add an ORDER BY over a unique or monotonic column")];
        }
        Vec::new()
    }
}

impl Checker for MissingOrderByChecker {
    fn id(&self) -> &'static str {
        ID_MISSING_ORDER_BY
    }
}

/// Unbounded `SELECT` (no `LIMIT`, no row bounds) against a table configured
/// as large (full scans here are expensive enough to always paginate).
pub struct NoPaginationChecker {
    tables: Vec<String>,
}

impl Default for NoPaginationChecker {
    fn default() -> Self {
        Self { tables: Vec::new() }
    }
}

impl NoPaginationChecker {
    #[must_use]
    pub fn new(tables: Vec<String>) -> Self {
        Self { tables }
    }
}

impl StatementVisitor for NoPaginationChecker {
    fn visit_select(&self, ctx: &SqlContext, query: &Query) -> Vec<Violation> {
        if query.limit.is_some() || has_top(query) || ctx.row_bounds.is_some() {
            return Vec::new();
        }
        let SetExpr::Select(select) = query.body.as_ref() else { return Vec::new() };
        let touches_large_table = select
            .from
            .iter()
            .filter_map(|twj| match &twj.relation {
                sqlparser::ast::TableFactor::Table { name, .. } => Some(name.to_string().to_lowercase()),
                _ => None,
            })
            .any(|name| self.tables.iter().any(|t| t.eq_ignore_ascii_case(&name)));
        if touches_large_table {
            return vec![Violation::new(ID_NO_PAGINATION, RiskLevel::Medium, "unbounded SELECT against a table configured as large")
                .with_suggestion("add LIMIT/OFFSET or a keyset predicate")];
        }
        Vec::new()
    }
}

impl Checker for NoPaginationChecker {
    fn id(&self) -> &'static str {
        ID_NO_PAGINATION
    }
}

fn numeric_limit(query: &Query) -> Option<u64> {
    match &query.limit {
        Some(Expr::Value(Value::Number(n, _))) => n.parse().ok(),
        _ => None,
    }
}

fn numeric_offset(query: &Query) -> Option<u64> {
    match &query.offset {
        Some(offset) => match &offset.value {
            Expr::Value(Value::Number(n, _)) => n.parse().ok(),
            _ => None,
        },
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        context::{ExecutionLayer, RowBounds},
        parser::ParserCache,
    };

    fn ctx_for(sql: &str) -> SqlContext {
        let cache = ParserCache::default();
        let handle = cache.parse_cached(sql).ok();
        let mut ctx = SqlContext::new(sql, "site:1", "ds", ExecutionLayer::OrmLevel);
        ctx.statement = handle;
        ctx
    }

    #[test]
    fn logical_pagination_without_sql_limit_flagged() {
        let ctx = ctx_for("SELECT * FROM big_table").with_row_bounds(RowBounds { offset: 0, limit: 20 });
        assert_eq!(LogicalPaginationChecker.check(&ctx).len(), 1);
    }

    #[test]
    fn logical_pagination_with_sql_limit_passes() {
        let ctx = ctx_for("SELECT * FROM big_table LIMIT 20").with_row_bounds(RowBounds { offset: 0, limit: 20 });
        assert!(LogicalPaginationChecker.check(&ctx).is_empty());
    }

    #[test]
    fn deep_offset_flagged() {
        let ctx = ctx_for("SELECT * FROM t LIMIT 10 OFFSET 50000");
        assert_eq!(DeepPaginationChecker::default().check(&ctx).len(), 1);
    }

    #[test]
    fn large_page_size_flagged() {
        let ctx = ctx_for("SELECT * FROM t LIMIT 5000");
        assert_eq!(LargePageSizeChecker::default().check(&ctx).len(), 1);
    }

    #[test]
    fn missing_order_by_on_paginated_query_flagged() {
        let ctx = ctx_for("SELECT * FROM t LIMIT 10");
        assert_eq!(MissingOrderByChecker.check(&ctx).len(), 1);
    }

    #[test]
    fn order_by_present_passes() {
        let ctx = ctx_for("SELECT * FROM t ORDER BY id LIMIT 10");
        assert!(MissingOrderByChecker.check(&ctx).is_empty());
    }

    #[test]
    fn unbounded_select_against_large_table_flagged() {
        let ctx = ctx_for("SELECT * FROM events");
        let checker = NoPaginationChecker::new(vec!["events".to_string()]);
        assert_eq!(checker.check(&ctx).len(), 1);
    }
}
