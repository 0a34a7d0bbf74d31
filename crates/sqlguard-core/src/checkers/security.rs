//! Statement-shape and injection-surface checkers (spec §4.4, top half of
//! the rule table).
//!
//! `NoWhereClause`, `MultiStatement`, `SetOperation`, and `DdlOperation` walk
//! the parsed AST because the shapes they look for are exactly what the
//! parser already models. The remaining checkers here key off normalized SQL
//! text: their target constructs (`INTO OUTFILE`, session `SET`, vendor
//! function names, embedded comments) vary more across dialects than the
//! generic AST distinguishes, and a text match is also what keeps them
//! usable as the "regex-only" fallback bank when parsing fails.

use sqlparser::ast::{SetExpr, Statement};

use super::Checker;
use crate::{
    context::SqlContext,
    result::{RiskLevel, Violation},
    visitor::StatementVisitor,
};

const ID_NO_WHERE_CLAUSE: &str = "NoWhereClause";
const ID_MULTI_STATEMENT: &str = "MultiStatement";
const ID_SET_OPERATION: &str = "SetOperation";
const ID_SQL_COMMENT: &str = "SqlComment";
const ID_INTO_OUTFILE: &str = "IntoOutfile";
const ID_DDL_OPERATION: &str = "DdlOperation";
const ID_DANGEROUS_FUNCTION: &str = "DangerousFunction";
const ID_CALL_STATEMENT: &str = "CallStatement";
const ID_METADATA_STATEMENT: &str = "MetadataStatement";
const ID_SET_STATEMENT: &str = "SetStatement";
const ID_DENIED_TABLE: &str = "DeniedTable";

/// `Update`/`Delete` with no `WHERE` clause at all.
pub struct NoWhereClauseChecker;

impl StatementVisitor for NoWhereClauseChecker {
    fn visit_update(&self, _ctx: &SqlContext, statement: &Statement) -> Vec<Violation> {
        if let Statement::Update { selection: None, .. } = statement {
            return vec![Violation::new(
                ID_NO_WHERE_CLAUSE,
                RiskLevel::Critical,
                "UPDATE without a WHERE clause affects every row in the table",
            )
            .with_suggestion("add a WHERE clause scoping the rows to update")];
        }
        Vec::new()
    }

    fn visit_delete(&self, _ctx: &SqlContext, statement: &Statement) -> Vec<Violation> {
        if let Statement::Delete(delete) = statement {
            if delete.selection.is_none() {
                return vec![Violation::new(
                    ID_NO_WHERE_CLAUSE,
                    RiskLevel::Critical,
                    "DELETE without a WHERE clause removes every row in the table",
                )
                .with_suggestion("add a WHERE clause scoping the rows to delete")];
            }
        }
        Vec::new()
    }
}

impl Checker for NoWhereClauseChecker {
    fn id(&self) -> &'static str {
        ID_NO_WHERE_CLAUSE
    }
}

/// Two or more top-level statements in one text (stacked-query injection).
pub struct MultiStatementChecker;

impl StatementVisitor for MultiStatementChecker {}

impl Checker for MultiStatementChecker {
    fn id(&self) -> &'static str {
        ID_MULTI_STATEMENT
    }

    fn check(&self, ctx: &SqlContext) -> Vec<Violation> {
        match &ctx.statement {
            Some(handle) if handle.is_multi_statement() => vec![Violation::new(
                ID_MULTI_STATEMENT,
                RiskLevel::Critical,
                format!("input contains {} stacked statements", handle.statements().len()),
            )
            .with_suggestion("submit exactly one statement per call")],
            _ => Vec::new(),
        }
    }
}

/// `UNION`/`INTERSECT`/`EXCEPT` where the two sides project a different
/// number of columns — a classic injection tell, since a legitimate set
/// operation requires matching arity and a parser that accepted the text
/// despite a mismatch signals an unusual (often appended) right-hand side.
pub struct SetOperationChecker;

impl StatementVisitor for SetOperationChecker {
    fn visit_select(&self, _ctx: &SqlContext, query: &sqlparser::ast::Query) -> Vec<Violation> {
        if let SetExpr::SetOp { left, right, op, .. } = query.body.as_ref() {
            match (select_item_count(left), select_item_count(right)) {
                (Some(l), Some(r)) if l != r => {
                    return vec![Violation::new(
                        ID_SET_OPERATION,
                        RiskLevel::Critical,
                        format!("{op} sides project {l} and {r} columns respectively"),
                    )
                    .with_suggestion("ensure both sides of the set operation select the same columns")];
                },
                _ => {},
            }
        }
        Vec::new()
    }
}

impl Checker for SetOperationChecker {
    fn id(&self) -> &'static str {
        ID_SET_OPERATION
    }
}

fn select_item_count(expr: &SetExpr) -> Option<usize> {
    match expr {
        SetExpr::Select(select) => Some(select.projection.len()),
        SetExpr::Query(query) => select_item_count(query.body.as_ref()),
        _ => None,
    }
}

/// An embedded `--`, `/* */`, or `#` comment alongside a dynamic fragment —
/// the shape of a classic comment-based injection that truncates the
/// original query. Checked on raw text: comments are discarded by the
/// parser and never reach the AST.
pub struct SqlCommentChecker;

impl StatementVisitor for SqlCommentChecker {}

impl Checker for SqlCommentChecker {
    fn id(&self) -> &'static str {
        ID_SQL_COMMENT
    }

    fn requires_ast(&self) -> bool {
        false
    }

    fn check(&self, ctx: &SqlContext) -> Vec<Violation> {
        let has_comment = ctx.sql.contains("--") || ctx.sql.contains("/*") || ctx.sql.contains('#');
        if has_comment && !ctx.dynamic_variants.is_empty() {
            return vec![Violation::new(
                ID_SQL_COMMENT,
                RiskLevel::Critical,
                "SQL contains a comment marker alongside a dynamically-assembled fragment",
            )
            .with_suggestion("remove inline comments from dynamically assembled SQL")];
        }
        Vec::new()
    }
}

/// `INTO OUTFILE`/`INTO DUMPFILE` — MySQL's file-write escape hatch.
pub struct IntoOutfileChecker;

impl StatementVisitor for IntoOutfileChecker {}

impl Checker for IntoOutfileChecker {
    fn id(&self) -> &'static str {
        ID_INTO_OUTFILE
    }

    fn requires_ast(&self) -> bool {
        false
    }

    fn check(&self, ctx: &SqlContext) -> Vec<Violation> {
        let upper = ctx.sql.to_uppercase();
        if upper.contains("INTO OUTFILE") || upper.contains("INTO DUMPFILE") {
            return vec![Violation::new(ID_INTO_OUTFILE, RiskLevel::Critical, "statement writes query results to a server-side file")
                .with_suggestion("remove INTO OUTFILE/DUMPFILE; export data through an application-level path")];
        }
        Vec::new()
    }
}

/// `CREATE`/`ALTER`/`DROP`/`TRUNCATE` — schema mutation from the data-access path.
pub struct DdlOperationChecker;

impl StatementVisitor for DdlOperationChecker {
    fn visit_other(&self, _ctx: &SqlContext, statement: &Statement) -> Vec<Violation> {
        let is_ddl = matches!(
            statement,
            Statement::CreateTable(_)
                | Statement::AlterTable { .. }
                | Statement::Drop { .. }
                | Statement::Truncate { .. }
                | Statement::CreateIndex(_)
                | Statement::CreateView { .. }
                | Statement::CreateDatabase { .. }
                | Statement::CreateSchema { .. }
        );
        if is_ddl {
            return vec![
                Violation::new(ID_DDL_OPERATION, RiskLevel::Critical, "schema-mutating DDL issued through the data-access path")
                    .with_suggestion("run DDL through migration tooling, not the application datasource"),
            ];
        }
        Vec::new()
    }
}

impl Checker for DdlOperationChecker {
    fn id(&self) -> &'static str {
        ID_DDL_OPERATION
    }
}

const DANGEROUS_FUNCTIONS: &[&str] = &["load_file", "sys_exec", "sys_eval", "sleep", "benchmark", "xp_cmdshell", "pg_sleep", "dbms_lock.sleep"];

/// Calls to filesystem/process/timing-oracle functions.
pub struct DangerousFunctionChecker;

impl StatementVisitor for DangerousFunctionChecker {}

impl Checker for DangerousFunctionChecker {
    fn id(&self) -> &'static str {
        ID_DANGEROUS_FUNCTION
    }

    fn requires_ast(&self) -> bool {
        false
    }

    fn check(&self, ctx: &SqlContext) -> Vec<Violation> {
        let lower = ctx.sql.to_lowercase();
        for name in DANGEROUS_FUNCTIONS {
            if lower.contains(&format!("{name}(")) {
                return vec![Violation::new(ID_DANGEROUS_FUNCTION, RiskLevel::Critical, format!("call to dangerous function `{name}`"))
                    .with_suggestion("remove calls to filesystem, process, or timing-oracle functions")];
            }
        }
        Vec::new()
    }
}

/// `CALL`/`EXEC`/`EXECUTE` — stored-procedure invocation.
pub struct CallStatementChecker;

impl StatementVisitor for CallStatementChecker {
    fn visit_other(&self, _ctx: &SqlContext, statement: &Statement) -> Vec<Violation> {
        if matches!(statement, Statement::Call(_) | Statement::Execute { .. }) {
            return vec![Violation::new(ID_CALL_STATEMENT, RiskLevel::High, "stored procedure invocation from the data-access path")];
        }
        Vec::new()
    }
}

impl Checker for CallStatementChecker {
    fn id(&self) -> &'static str {
        ID_CALL_STATEMENT
    }
}

/// `SHOW`/`DESCRIBE`/`USE` — schema/metadata introspection.
pub struct MetadataStatementChecker;

impl StatementVisitor for MetadataStatementChecker {
    fn visit_other(&self, _ctx: &SqlContext, statement: &Statement) -> Vec<Violation> {
        let text = statement.to_string();
        let upper = text.trim_start();
        let is_metadata = ["SHOW ", "DESCRIBE ", "DESC ", "USE "].iter().any(|prefix| upper.to_uppercase().starts_with(prefix));
        if is_metadata {
            return vec![Violation::new(ID_METADATA_STATEMENT, RiskLevel::High, "schema/metadata introspection statement")];
        }
        Vec::new()
    }
}

impl Checker for MetadataStatementChecker {
    fn id(&self) -> &'static str {
        ID_METADATA_STATEMENT
    }
}

/// Session-level `SET`.
pub struct SetStatementChecker;

impl StatementVisitor for SetStatementChecker {
    fn visit_other(&self, _ctx: &SqlContext, statement: &Statement) -> Vec<Violation> {
        if matches!(statement, Statement::SetVariable { .. } | Statement::SetNames { .. } | Statement::SetTimeZone { .. }) {
            return vec![Violation::new(ID_SET_STATEMENT, RiskLevel::High, "session-level SET issued from the data-access path")];
        }
        Vec::new()
    }
}

impl Checker for SetStatementChecker {
    fn id(&self) -> &'static str {
        ID_SET_STATEMENT
    }
}

/// Any reference to a table matching a configured denylist pattern
/// (e.g. `sys_*`, internal/system schemas).
pub struct DeniedTableChecker {
    patterns: Vec<String>,
}

impl Default for DeniedTableChecker {
    fn default() -> Self {
        Self { patterns: vec!["sys_".to_string(), "information_schema".to_string(), "pg_catalog".to_string()] }
    }
}

impl DeniedTableChecker {
    #[must_use]
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl StatementVisitor for DeniedTableChecker {}

impl Checker for DeniedTableChecker {
    fn id(&self) -> &'static str {
        ID_DENIED_TABLE
    }

    fn requires_ast(&self) -> bool {
        false
    }

    fn check(&self, ctx: &SqlContext) -> Vec<Violation> {
        let lower = ctx.sql.to_lowercase();
        for pattern in &self.patterns {
            if lower.contains(pattern.as_str()) {
                return vec![Violation::new(ID_DENIED_TABLE, RiskLevel::Critical, format!("references a denylisted table matching `{pattern}`"))
                    .with_suggestion("access denylisted/system tables through an administrative path, not the application datasource")];
            }
        }
        Vec::new()
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
    fn update_without_where_is_critical() {
        let ctx = ctx_for("UPDATE users SET status = 'x'");
        let violations = NoWhereClauseChecker.check(&ctx);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].level, RiskLevel::Critical);
    }

    #[test]
    fn update_with_where_passes() {
        let ctx = ctx_for("UPDATE users SET status = 'x' WHERE id = 1");
        assert!(NoWhereClauseChecker.check(&ctx).is_empty());
    }

    #[test]
    fn delete_without_where_is_critical() {
        let ctx = ctx_for("DELETE FROM orders");
        assert_eq!(NoWhereClauseChecker.check(&ctx).len(), 1);
    }

    #[test]
    fn stacked_statements_flagged() {
        let ctx = ctx_for("SELECT 1; DROP TABLE users;");
        assert_eq!(MultiStatementChecker.check(&ctx).len(), 1);
    }

    #[test]
    fn ddl_is_flagged() {
        let ctx = ctx_for("DROP TABLE users");
        assert_eq!(DdlOperationChecker.check(&ctx).len(), 1);
    }

    #[test]
    fn dangerous_function_call_flagged() {
        let ctx = ctx_for("SELECT load_file('/etc/passwd')");
        assert_eq!(DangerousFunctionChecker.check(&ctx).len(), 1);
    }

    #[test]
    fn into_outfile_flagged() {
        let ctx = ctx_for("SELECT * FROM users INTO OUTFILE '/tmp/x.csv'");
        assert_eq!(IntoOutfileChecker.check(&ctx).len(), 1);
    }

    #[test]
    fn denied_table_pattern_flagged() {
        let ctx = ctx_for("SELECT * FROM sys_config");
        assert_eq!(DeniedTableChecker::default().check(&ctx).len(), 1);
    }
}
