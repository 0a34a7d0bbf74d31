//! `DummyCondition` checker: predicates that parse as a real comparison but
//! are structurally guaranteed true (`1=1`, `'a'='a'`, and — in aggressive
//! mode — `col=col` for an arbitrary column).

use sqlparser::ast::{BinaryOperator, Expr, Query, SetExpr, Statement};

use super::Checker;
use crate::{
    context::SqlContext,
    result::{RiskLevel, Violation},
    visitor::StatementVisitor,
};

const ID: &str = "DummyCondition";

/// Literal-only by default; semantic folding (flagging `col=col` for any
/// column, not just literals) is opt-in because it produces more false
/// positives against legitimately self-referential expressions.
pub struct DummyConditionChecker {
    aggressive: bool,
}

impl Default for DummyConditionChecker {
    fn default() -> Self {
        Self { aggressive: false }
    }
}

impl DummyConditionChecker {
    #[must_use]
    pub fn new(aggressive: bool) -> Self {
        Self { aggressive }
    }

    fn check_selection(&self, selection: Option<&Expr>) -> Vec<Violation> {
        let Some(expr) = selection else { return Vec::new() };
        if contains_tautology(expr, self.aggressive) {
            return vec![Violation::new(ID, RiskLevel::High, "WHERE clause contains a condition that is always true")
                .with_suggestion("replace the tautological predicate with a real filter")];
        }
        Vec::new()
    }
}

impl StatementVisitor for DummyConditionChecker {
    fn visit_select(&self, _ctx: &SqlContext, query: &Query) -> Vec<Violation> {
        let selection = match query.body.as_ref() {
            SetExpr::Select(select) => select.selection.as_ref(),
            _ => None,
        };
        self.check_selection(selection)
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

impl Checker for DummyConditionChecker {
    fn id(&self) -> &'static str {
        ID
    }
}

fn contains_tautology(expr: &Expr, aggressive: bool) -> bool {
    match expr {
        Expr::BinaryOp { left, op: BinaryOperator::Eq, right } => {
            if left == right {
                aggressive || matches!(left.as_ref(), Expr::Value(_))
            } else {
                false
            }
        },
        Expr::BinaryOp { left, op: BinaryOperator::And | BinaryOperator::Or, right } => {
            contains_tautology(left, aggressive) || contains_tautology(right, aggressive)
        },
        Expr::Nested(inner) | Expr::UnaryOp { expr: inner, .. } => contains_tautology(inner, aggressive),
        _ => false,
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
    fn literal_tautology_flagged_by_default() {
        let ctx = ctx_for("SELECT * FROM user WHERE 1=1");
        assert_eq!(DummyConditionChecker::default().check(&ctx).len(), 1);
    }

    #[test]
    fn string_literal_tautology_flagged() {
        let ctx = ctx_for("SELECT * FROM user WHERE 'a' = 'a'");
        assert_eq!(DummyConditionChecker::default().check(&ctx).len(), 1);
    }

    #[test]
    fn column_self_comparison_not_flagged_by_default() {
        let ctx = ctx_for("SELECT * FROM user WHERE name = name");
        assert!(DummyConditionChecker::default().check(&ctx).is_empty());
    }

    #[test]
    fn column_self_comparison_flagged_in_aggressive_mode() {
        let ctx = ctx_for("SELECT * FROM user WHERE name = name");
        assert_eq!(DummyConditionChecker::new(true).check(&ctx).len(), 1);
    }

    #[test]
    fn real_predicate_passes() {
        let ctx = ctx_for("SELECT * FROM user WHERE id = 42");
        assert!(DummyConditionChecker::default().check(&ctx).is_empty());
    }
}
