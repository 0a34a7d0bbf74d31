//! Dialect Adapter (spec §4.2): database-specific pagination rewrites.
//!
//! Only a top-level `SELECT` with a plain body is rewritten. Set operations
//! (`UNION`/`INTERSECT`/`EXCEPT`), a CTE whose main body is a set operation,
//! and statements that already carry pagination are left untouched —
//! rewriting is safety-preserving, never a guess.

use sqlparser::ast::{Expr, Offset, OffsetRows, Query, SetExpr, Statement, Top, Value};

/// Supported target dialects (spec §4.2 lists five as the minimum).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Postgres,
    Oracle,
    SqlServer,
    H2,
}

impl Dialect {
    /// MySQL/PostgreSQL/H2 all accept a trailing `LIMIT n`.
    #[must_use]
    pub const fn uses_trailing_limit(self) -> bool {
        matches!(self, Self::MySql | Self::Postgres | Self::H2)
    }
}

/// Outcome of a rewrite attempt.
#[derive(Debug, Clone)]
pub enum RewriteOutcome {
    /// No rewrite applied (safety-preserving no-op: set operation, CTE with
    /// a set-operation body, nested subquery, or pagination already present).
    Unchanged,
    /// The statement was rewritten; callers needing the new text should
    /// `.to_string()` the returned statement.
    Rewritten(Box<Statement>),
    /// An existing numeric limit exceeded the configured cap and was
    /// capped down. Carries the capped value for a WARN-level log.
    Capped { statement: Box<Statement>, original: u64, capped_to: u64 },
}

/// Stateless dialect-specific statement rewriter.
#[derive(Debug, Clone, Copy)]
pub struct DialectAdapter {
    pub dialect: Dialect,
}

impl DialectAdapter {
    #[must_use]
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Apply a row cap to a top-level `SELECT`. No-op for anything else.
    #[must_use]
    pub fn apply_limit(&self, statement: &Statement, n: u64, enforce_max_limit: bool, max_limit: u64) -> RewriteOutcome {
        let Statement::Query(query) = statement else {
            return RewriteOutcome::Unchanged;
        };
        if !is_plain_select_body(&query.body) {
            return RewriteOutcome::Unchanged;
        }

        if let Some(existing) = numeric_limit(query) {
            return self.maybe_cap_existing(statement, existing, enforce_max_limit, max_limit);
        }

        let mut rewritten = query.as_ref().clone();
        match self.dialect {
            d if d.uses_trailing_limit() => {
                rewritten.limit = Some(number_expr(n));
            },
            Dialect::SqlServer => {
                set_select_top(&mut rewritten, number_expr(n));
            },
            Dialect::Oracle => {
                return RewriteOutcome::Rewritten(Box::new(wrap_with_rownum(statement, n)));
            },
        }
        RewriteOutcome::Rewritten(Box::new(Statement::Query(Box::new(rewritten))))
    }

    /// Add `{offset, limit}` pagination to a top-level `SELECT`.
    #[must_use]
    pub fn add_pagination(&self, statement: &Statement, offset: u64, limit: u64) -> RewriteOutcome {
        let Statement::Query(query) = statement else {
            return RewriteOutcome::Unchanged;
        };
        if !is_plain_select_body(&query.body) || numeric_limit(query).is_some() {
            return RewriteOutcome::Unchanged;
        }

        match self.dialect {
            d if d.uses_trailing_limit() => {
                let mut rewritten = query.as_ref().clone();
                rewritten.limit = Some(number_expr(limit));
                rewritten.offset = Some(Offset {
                    value: number_expr(offset),
                    rows: OffsetRows::Rows,
                });
                RewriteOutcome::Rewritten(Box::new(Statement::Query(Box::new(rewritten))))
            },
            Dialect::SqlServer => {
                // TOP has no native OFFSET; SQL Server pagination requires
                // `OFFSET ... FETCH NEXT ...` instead of TOP — leave TOP-only
                // rewrite to `apply_limit` and decline combined pagination
                // here rather than emit a statement that silently drops the
                // offset.
                RewriteOutcome::Unchanged
            },
            Dialect::Oracle => RewriteOutcome::Rewritten(Box::new(wrap_with_rownum(statement, offset + limit))),
        }
    }

    fn maybe_cap_existing(&self, statement: &Statement, existing: u64, enforce_max_limit: bool, max_limit: u64) -> RewriteOutcome {
        if !enforce_max_limit || existing <= max_limit {
            return RewriteOutcome::Unchanged;
        }
        let Statement::Query(query) = statement else {
            return RewriteOutcome::Unchanged;
        };
        let mut rewritten = query.as_ref().clone();
        rewritten.limit = Some(number_expr(max_limit));
        RewriteOutcome::Capped {
            statement: Box::new(Statement::Query(Box::new(rewritten))),
            original: existing,
            capped_to: max_limit,
        }
    }
}

/// `true` for a plain `SELECT ...` body; `false` for `UNION`/`INTERSECT`/
/// `EXCEPT` and anything else that isn't a simple select.
fn is_plain_select_body(body: &SetExpr) -> bool {
    matches!(body, SetExpr::Select(_))
}

/// Numeric (non-parameterized) `LIMIT`/`TOP` value already present, if any.
/// Parameterized limits (`LIMIT ?`) are left alone per spec §4.2.
fn numeric_limit(query: &Query) -> Option<u64> {
    match &query.limit {
        Some(Expr::Value(Value::Number(n, _))) => n.parse().ok(),
        _ => match &query.body {
            SetExpr::Select(select) => match &select.top {
                Some(Top { quantity: Some(Expr::Value(Value::Number(n, _))), .. }) => n.parse().ok(),
                _ => None,
            },
            _ => None,
        },
    }
}

fn number_expr(n: u64) -> Expr {
    Expr::Value(Value::Number(n.to_string(), false))
}

fn set_select_top(query: &mut Query, quantity: Expr) {
    if let SetExpr::Select(select) = query.body.as_mut() {
        select.top = Some(Top {
            with_ties: false,
            percent: false,
            quantity: Some(quantity),
        });
    }
}

fn wrap_with_rownum(statement: &Statement, n: u64) -> Statement {
    // Oracle has no `LIMIT`; the safe, dialect-correct rewrite wraps the
    // original query and filters on the pseudo-column `ROWNUM`.
    let inner = statement.to_string();
    let wrapped_sql = format!("SELECT * FROM ({inner}) sqlguard_rownum_wrap WHERE ROWNUM <= {n}");
    // Re-parse so the returned statement is a real AST, not raw text —
    // callers that inspect the rewritten statement (tests, further
    // checkers) see a structurally valid query.
    let dialect = sqlparser::dialect::GenericDialect {};
    sqlparser::parser::Parser::parse_sql(&dialect, &wrapped_sql)
        .ok()
        .and_then(|mut statements| statements.pop())
        .unwrap_or_else(|| statement.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::{dialect::GenericDialect, parser::Parser};

    fn parse(sql: &str) -> Statement {
        Parser::parse_sql(&GenericDialect {}, sql).unwrap().remove(0)
    }

    #[test]
    fn mysql_applies_trailing_limit() {
        let stmt = parse("SELECT * FROM users");
        let adapter = DialectAdapter::new(Dialect::MySql);
        match adapter.apply_limit(&stmt, 50, false, 0) {
            RewriteOutcome::Rewritten(rewritten) => {
                assert!(rewritten.to_string().to_uppercase().contains("LIMIT 50"));
            },
            other => panic!("expected rewrite, got {other:?}"),
        }
    }

    #[test]
    fn union_is_left_untouched() {
        let stmt = parse("SELECT a FROM t1 UNION SELECT b FROM t2");
        let adapter = DialectAdapter::new(Dialect::Postgres);
        assert!(matches!(adapter.apply_limit(&stmt, 10, false, 0), RewriteOutcome::Unchanged));
    }

    #[test]
    fn existing_parameterized_limit_left_alone() {
        let stmt = parse("SELECT * FROM users LIMIT ?");
        let adapter = DialectAdapter::new(Dialect::MySql);
        assert!(matches!(adapter.apply_limit(&stmt, 50, true, 10), RewriteOutcome::Unchanged));
    }

    #[test]
    fn enforce_max_limit_caps_down() {
        let stmt = parse("SELECT * FROM users LIMIT 5000");
        let adapter = DialectAdapter::new(Dialect::Postgres);
        match adapter.apply_limit(&stmt, 50, true, 1000) {
            RewriteOutcome::Capped { original, capped_to, .. } => {
                assert_eq!(original, 5000);
                assert_eq!(capped_to, 1000);
            },
            other => panic!("expected capped outcome, got {other:?}"),
        }
    }

    #[test]
    fn enforce_max_limit_off_by_default_is_noop() {
        let stmt = parse("SELECT * FROM users LIMIT 5000");
        let adapter = DialectAdapter::new(Dialect::Postgres);
        assert!(matches!(adapter.apply_limit(&stmt, 50, false, 1000), RewriteOutcome::Unchanged));
    }

    #[test]
    fn oracle_wraps_with_rownum() {
        let stmt = parse("SELECT * FROM users");
        let adapter = DialectAdapter::new(Dialect::Oracle);
        match adapter.apply_limit(&stmt, 10, false, 0) {
            RewriteOutcome::Rewritten(rewritten) => {
                assert!(rewritten.to_string().to_uppercase().contains("ROWNUM"));
            },
            other => panic!("expected rewrite, got {other:?}"),
        }
    }
}
