//! Statement Visitor framework (spec §4.3).
//!
//! A single interface with default no-op methods per statement variant. A
//! checker overrides only the methods it cares about; [`dispatch`] is the
//! one place that inspects the parsed variant tag, so no checker ever
//! performs its own type discrimination.

use sqlparser::ast::{Query, Statement};

use crate::{context::SqlContext, result::Violation};

/// Typed dispatch surface over `{Select, Update, Delete, Insert}`.
///
/// All methods default to "no finding" so a checker implements only what's
/// relevant to it (e.g. `NoWhereClause` overrides `visit_update` and
/// `visit_delete`, nothing else).
pub trait StatementVisitor {
    fn visit_select(&self, _ctx: &SqlContext, _query: &Query) -> Vec<Violation> {
        Vec::new()
    }

    fn visit_update(&self, _ctx: &SqlContext, _statement: &Statement) -> Vec<Violation> {
        Vec::new()
    }

    fn visit_delete(&self, _ctx: &SqlContext, _statement: &Statement) -> Vec<Violation> {
        Vec::new()
    }

    fn visit_insert(&self, _ctx: &SqlContext, _statement: &Statement) -> Vec<Violation> {
        Vec::new()
    }

    /// Anything that isn't one of the four core variants: DDL, `CALL`,
    /// `SHOW`/`DESCRIBE`/`USE`, session `SET`, and so on.
    fn visit_other(&self, _ctx: &SqlContext, _statement: &Statement) -> Vec<Violation> {
        Vec::new()
    }
}

/// Route `statement` to the correct visitor method based on its variant.
pub fn dispatch(visitor: &dyn StatementVisitor, ctx: &SqlContext, statement: &Statement) -> Vec<Violation> {
    match statement {
        Statement::Query(query) => visitor.visit_select(ctx, query),
        Statement::Update { .. } => visitor.visit_update(ctx, statement),
        Statement::Delete(_) => visitor.visit_delete(ctx, statement),
        Statement::Insert(_) => visitor.visit_insert(ctx, statement),
        _ => visitor.visit_other(ctx, statement),
    }
}
