//! Validation Engine (spec §4.6): orchestrates parse → dispatch → checker
//! chain → dedup → aggregation into a single `ValidationResult`.

use std::sync::Arc;

use parking_lot::Mutex;
use sqlparser::ast::Statement;

use crate::{
    checkers::CheckerBank,
    config::{CheckerConfigSet, CheckerConfigStore},
    context::{SqlCommandType, SqlContext},
    dedup,
    parser::ParserCache,
    result::{RiskLevel, ValidationResult, Violation},
};

const ANALYSIS_FAILED_CHECKER: &str = "ParseFallback";

/// Stateful collaborators the engine owns: the parser cache (shared,
/// fine-grained locking internally) and the checker bank (rebuilt only when
/// configuration actually changes).
pub struct ValidationEngine {
    cache: ParserCache,
    config: CheckerConfigStore,
    bank: Mutex<(Arc<CheckerConfigSet>, Arc<CheckerBank>)>,
}

impl ValidationEngine {
    #[must_use]
    pub fn new(cache: ParserCache, config: CheckerConfigStore) -> Self {
        let snapshot = config.snapshot();
        let bank = Arc::new(CheckerBank::from_config(&snapshot));
        Self { cache, config, bank: Mutex::new((snapshot, bank)) }
    }

    #[must_use]
    pub fn with_default_config(cache: ParserCache) -> Self {
        Self::new(cache, CheckerConfigStore::default())
    }

    #[must_use]
    pub fn config(&self) -> &CheckerConfigStore {
        &self.config
    }

    #[must_use]
    pub fn parser_cache(&self) -> &ParserCache {
        &self.cache
    }

    /// Current bank, rebuilding from config only when the snapshot pointer
    /// has changed since the last call (copy-on-write per spec §5).
    fn current_bank(&self) -> Arc<CheckerBank> {
        let snapshot = self.config.snapshot();
        let mut guard = self.bank.lock();
        if !Arc::ptr_eq(&guard.0, &snapshot) {
            *guard = (Arc::clone(&snapshot), Arc::new(CheckerBank::from_config(&snapshot)));
        }
        Arc::clone(&guard.1)
    }

    /// `validate(ctx) → ValidationResult`, per spec §4.6.
    ///
    /// Mutates `ctx.statement` and `ctx.command_type` with the parse
    /// outcome so callers (and the audit event the adapter builds
    /// afterwards) see the same parsed statement the checkers used.
    pub fn validate(&self, ctx: &mut SqlContext) -> ValidationResult {
        let mut result = ValidationResult::new();

        if ctx.is_empty() {
            return result;
        }

        let config = self.config.snapshot();
        let parse_failed = match self.cache.parse_cached(&ctx.sql) {
            Ok(handle) => {
                ctx.command_type = handle.first().map(classify_statement).unwrap_or(SqlCommandType::Unknown);
                ctx.statement = Some(handle);
                false
            },
            Err(err) => {
                ctx.statement = None;
                result.insert_detail("parse_error", err.to_string());
                true
            },
        };

        let bank = self.current_bank();
        let violations = bank.run(ctx, &config);
        let (kept, suppressed) = dedup::dedup_violations(&ctx.statement_id, violations);
        if suppressed > 0 {
            result.insert_detail("suppressed_duplicate_violations", suppressed.to_string());
        }
        for violation in kept {
            result.push(violation);
        }

        if parse_failed {
            result.push(Violation::new(ANALYSIS_FAILED_CHECKER, RiskLevel::Medium, "SQL failed to parse; only text-based checkers ran"));
        }

        result
    }
}

fn classify_statement(statement: &Statement) -> SqlCommandType {
    match statement {
        Statement::Query(_) => SqlCommandType::Select,
        Statement::Insert(_) => SqlCommandType::Insert,
        Statement::Update { .. } => SqlCommandType::Update,
        Statement::Delete(_) => SqlCommandType::Delete,
        Statement::Call(_) => SqlCommandType::Call,
        Statement::CreateTable(_)
        | Statement::AlterTable { .. }
        | Statement::Drop { .. }
        | Statement::Truncate { .. }
        | Statement::CreateIndex(_)
        | Statement::CreateView { .. }
        | Statement::CreateDatabase { .. }
        | Statement::CreateSchema { .. } => SqlCommandType::Ddl,
        _ => SqlCommandType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionLayer;

    fn engine() -> ValidationEngine {
        ValidationEngine::with_default_config(ParserCache::default())
    }

    #[test]
    fn empty_sql_is_safe() {
        let engine = engine();
        let mut ctx = SqlContext::new("   ", "site:1", "ds", ExecutionLayer::OrmLevel);
        let result = engine.validate(&mut ctx);
        assert!(result.passed());
        assert_eq!(result.risk_level(), RiskLevel::Safe);
    }

    #[test]
    fn missing_where_on_update_blocks_critical() {
        let engine = engine();
        let mut ctx = SqlContext::new("UPDATE user SET status = 'X'", "site:1", "ds", ExecutionLayer::OrmLevel);
        let result = engine.validate(&mut ctx);
        assert_eq!(result.risk_level(), RiskLevel::Critical);
        assert_eq!(result.violations().len(), 1);
        assert_eq!(result.violations()[0].checker_id, "NoWhereClause");
        assert_eq!(ctx.command_type, SqlCommandType::Update);
    }

    #[test]
    fn dummy_predicate_is_high() {
        let engine = engine();
        let mut ctx = SqlContext::new("SELECT * FROM user WHERE 1=1", "site:2", "ds", ExecutionLayer::OrmLevel);
        let result = engine.validate(&mut ctx);
        assert_eq!(result.risk_level(), RiskLevel::High);
    }

    #[test]
    fn parse_failure_falls_back_to_medium_analysis_failed() {
        let engine = engine();
        let mut ctx = SqlContext::new("SELEKT GARBAGE", "site:3", "ds", ExecutionLayer::OrmLevel);
        let result = engine.validate(&mut ctx);
        assert_eq!(result.risk_level(), RiskLevel::Medium);
        assert!(result.violations().iter().any(|v| v.checker_id == "ParseFallback"));
        assert!(ctx.statement.is_none());
    }

    #[test]
    fn logical_pagination_trap_fires_critical() {
        use crate::context::RowBounds;
        let engine = engine();
        let mut ctx = SqlContext::new("SELECT * FROM big_table", "site:4", "ds", ExecutionLayer::OrmLevel)
            .with_row_bounds(RowBounds { offset: 0, limit: 20 });
        let result = engine.validate(&mut ctx);
        assert_eq!(result.risk_level(), RiskLevel::Critical);
        assert!(result.violations().iter().any(|v| v.checker_id == "LogicalPagination"));
    }
}
