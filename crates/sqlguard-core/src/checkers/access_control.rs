//! Field- and table-level access control checkers (spec §4.4).

use sqlparser::ast::{Expr, FromTable, Query, SetExpr, Statement, TableFactor, TableWithJoins};

use super::Checker;
use crate::{
    context::SqlContext,
    result::{RiskLevel, Violation},
    visitor::StatementVisitor,
};

const ID_BLACKLIST_FIELD: &str = "BlacklistField";
const ID_WHITELIST_FIELD: &str = "WhitelistField";
const ID_READ_ONLY_TABLE: &str = "ReadOnlyTable";

/// `WHERE` references *only* low-cardinality fields from a configured
/// blacklist (e.g. `status`, `deleted`) — a predicate that looks selective
/// but in practice matches most of the table.
///
/// Severity follows spec.md's "Medium/High" row: a predicate pinned to a
/// single blacklisted field (e.g. `WHERE deleted = false`) is the dangerous
/// case — a boolean/low-cardinality column alone still matches a large
/// fraction of rows — and stays `High`. Combining `medium_when_fields_at_least`
/// or more *distinct* blacklisted fields (e.g. `WHERE status = 'x' AND
/// deleted = false`) narrows the match enough to downgrade to `Medium`.
pub struct BlacklistFieldChecker {
    fields: Vec<String>,
    medium_when_fields_at_least: usize,
}

impl Default for BlacklistFieldChecker {
    fn default() -> Self {
        Self {
            fields: vec!["status".to_string(), "deleted".to_string(), "is_active".to_string()],
            medium_when_fields_at_least: 2,
        }
    }
}

impl BlacklistFieldChecker {
    #[must_use]
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields, ..Self::default() }
    }

    #[must_use]
    pub fn with_medium_threshold(mut self, medium_when_fields_at_least: usize) -> Self {
        self.medium_when_fields_at_least = medium_when_fields_at_least;
        self
    }

    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl StatementVisitor for BlacklistFieldChecker {
    fn visit_select(&self, _ctx: &SqlContext, query: &Query) -> Vec<Violation> {
        self.check_selection(selection_of(query))
    }

    fn visit_update(&self, _ctx: &SqlContext, statement: &Statement) -> Vec<Violation> {
        if let Statement::Update { selection, .. } = statement {
            return self.check_selection(selection.as_ref());
        }
        Vec::new()
    }

    fn visit_delete(&self, _ctx: &SqlContext, statement: &Statement) -> Vec<Violation> {
        if let Statement::Delete(delete) = statement {
            return self.check_selection(delete.selection.as_ref());
        }
        Vec::new()
    }
}

impl BlacklistFieldChecker {
    fn check_selection(&self, selection: Option<&Expr>) -> Vec<Violation> {
        let Some(expr) = selection else { return Vec::new() };
        let columns = referenced_columns(expr);
        if columns.is_empty() {
            return Vec::new();
        }
        let all_blacklisted = columns.iter().all(|c| self.fields.iter().any(|f| f.eq_ignore_ascii_case(c)));
        if !all_blacklisted {
            return Vec::new();
        }
        let distinct_fields = {
            let mut sorted = columns.clone();
            sorted.sort_unstable();
            sorted.dedup();
            sorted.len()
        };
        let level =
            if distinct_fields >= self.medium_when_fields_at_least { RiskLevel::Medium } else { RiskLevel::High };
        vec![Violation::new(
            ID_BLACKLIST_FIELD,
            level,
            format!("predicate references only low-cardinality field(s): {}", columns.join(", ")),
        )
        .with_suggestion("add a selective predicate on a high-cardinality column (e.g. primary key)")]
    }
}

impl Checker for BlacklistFieldChecker {
    fn id(&self) -> &'static str {
        ID_BLACKLIST_FIELD
    }
}

/// `SELECT *` against a table configured as whitelist-required (callers must
/// name columns explicitly, typically to avoid leaking newly-added fields).
pub struct WhitelistFieldChecker {
    tables: Vec<String>,
}

impl Default for WhitelistFieldChecker {
    fn default() -> Self {
        Self { tables: Vec::new() }
    }
}

impl WhitelistFieldChecker {
    #[must_use]
    pub fn new(tables: Vec<String>) -> Self {
        Self { tables }
    }
}

impl StatementVisitor for WhitelistFieldChecker {
    fn visit_select(&self, _ctx: &SqlContext, query: &Query) -> Vec<Violation> {
        let SetExpr::Select(select) = query.body.as_ref() else { return Vec::new() };
        let is_star = select.projection.iter().any(|item| matches!(item, sqlparser::ast::SelectItem::Wildcard(_)));
        if !is_star {
            return Vec::new();
        }
        let tables = select.from.iter().filter_map(table_with_joins_name).collect::<Vec<_>>();
        if tables.iter().any(|t| self.tables.iter().any(|w| w.eq_ignore_ascii_case(t))) {
            return vec![
                Violation::new(ID_WHITELIST_FIELD, RiskLevel::Medium, "SELECT * against a table requiring explicit column lists")
                    .with_suggestion("name the required columns instead of SELECT *"),
            ];
        }
        Vec::new()
    }
}

impl Checker for WhitelistFieldChecker {
    fn id(&self) -> &'static str {
        ID_WHITELIST_FIELD
    }
}

/// Write statement (`Insert`/`Update`/`Delete`) against a table declared
/// read-only.
pub struct ReadOnlyTableChecker {
    tables: Vec<String>,
}

impl Default for ReadOnlyTableChecker {
    fn default() -> Self {
        Self { tables: Vec::new() }
    }
}

impl ReadOnlyTableChecker {
    #[must_use]
    pub fn new(tables: Vec<String>) -> Self {
        Self { tables }
    }

    fn flag(&self, table: Option<String>) -> Vec<Violation> {
        match table {
            Some(name) if self.tables.iter().any(|t| t.eq_ignore_ascii_case(&name)) => vec![Violation::new(
                ID_READ_ONLY_TABLE,
                RiskLevel::High,
                format!("write statement against read-only table `{name}`"),
            )
            .with_suggestion("route writes for this table through its owning service")],
            _ => Vec::new(),
        }
    }
}

impl StatementVisitor for ReadOnlyTableChecker {
    fn visit_update(&self, _ctx: &SqlContext, statement: &Statement) -> Vec<Violation> {
        if let Statement::Update { table, .. } = statement {
            return self.flag(table_with_joins_name(table));
        }
        Vec::new()
    }

    fn visit_delete(&self, _ctx: &SqlContext, statement: &Statement) -> Vec<Violation> {
        if let Statement::Delete(delete) = statement {
            let name = match &delete.from {
                FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables.first().and_then(table_with_joins_name),
            };
            return self.flag(name);
        }
        Vec::new()
    }

    fn visit_insert(&self, _ctx: &SqlContext, statement: &Statement) -> Vec<Violation> {
        if let Statement::Insert(insert) = statement {
            return self.flag(Some(insert.table_name.to_string().to_lowercase()));
        }
        Vec::new()
    }
}

impl Checker for ReadOnlyTableChecker {
    fn id(&self) -> &'static str {
        ID_READ_ONLY_TABLE
    }
}

fn selection_of(query: &Query) -> Option<&Expr> {
    match query.body.as_ref() {
        SetExpr::Select(select) => select.selection.as_ref(),
        _ => None,
    }
}

fn table_with_joins_name(twj: &TableWithJoins) -> Option<String> {
    match &twj.relation {
        TableFactor::Table { name, .. } => Some(name.to_string().to_lowercase()),
        _ => None,
    }
}

/// Column names (last segment only) referenced anywhere in a `WHERE` tree.
fn referenced_columns(expr: &Expr) -> Vec<String> {
    let mut out = Vec::new();
    collect_columns(expr, &mut out);
    out
}

fn collect_columns(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Identifier(ident) => out.push(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(idents) => {
            if let Some(last) = idents.last() {
                out.push(last.value.to_lowercase());
            }
        },
        Expr::BinaryOp { left, right, .. } => {
            collect_columns(left, out);
            collect_columns(right, out);
        },
        Expr::UnaryOp { expr, .. } | Expr::Nested(expr) | Expr::IsNull(expr) | Expr::IsNotNull(expr) => collect_columns(expr, out),
        Expr::InList { expr, .. } | Expr::Between { expr, .. } => collect_columns(expr, out),
        _ => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::ExecutionLayer, parser::ParserCache};

    fn ctx_for(sql: &str) -> SqlContext {
        let cache = ParserCache::default();
        let handle = cache.parse_cached(sql).ok();
        let mut ctx = SqlContext::new(sql, "site:1", "ds", ExecutionLayer::OrmLevel);
        ctx.statement = handle;
        ctx
    }

    #[test]
    fn blacklist_only_predicate_flagged() {
        let ctx = ctx_for("SELECT * FROM users WHERE status = 'active'");
        assert_eq!(BlacklistFieldChecker::default().check(&ctx).len(), 1);
    }

    #[test]
    fn predicate_with_id_is_not_flagged() {
        let ctx = ctx_for("SELECT * FROM users WHERE status = 'active' AND id = 7");
        assert!(BlacklistFieldChecker::default().check(&ctx).is_empty());
    }

    #[test]
    fn single_blacklisted_field_is_high() {
        let ctx = ctx_for("SELECT * FROM users WHERE deleted = false");
        let violations = BlacklistFieldChecker::default().check(&ctx);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].level, RiskLevel::High);
    }

    #[test]
    fn two_distinct_blacklisted_fields_downgrade_to_medium() {
        let ctx = ctx_for("SELECT * FROM users WHERE status = 'active' AND deleted = false");
        let violations = BlacklistFieldChecker::default().check(&ctx);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].level, RiskLevel::Medium);
    }

    #[test]
    fn whitelist_star_against_guarded_table_flagged() {
        let ctx = ctx_for("SELECT * FROM accounts");
        let checker = WhitelistFieldChecker::new(vec!["accounts".to_string()]);
        assert_eq!(checker.check(&ctx).len(), 1);
    }

    #[test]
    fn read_only_table_update_flagged() {
        let ctx = ctx_for("UPDATE accounts SET balance = 0 WHERE id = 1");
        let checker = ReadOnlyTableChecker::new(vec!["accounts".to_string()]);
        assert_eq!(checker.check(&ctx).len(), 1);
    }
}
