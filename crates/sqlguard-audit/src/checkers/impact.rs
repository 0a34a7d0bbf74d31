//! `ActualImpactNoWhere` and `HighImpactMutation` (spec §4.9): checkers that
//! weigh what a mutation actually did against the database, not just what
//! its SQL shape suggested at validation time.

use sqlguard_core::{result::RiskLevel, ParserCache, SqlCommandType};

use super::AuditChecker;
use crate::event::{AuditEvent, RiskScore};

const ID_ACTUAL_IMPACT_NO_WHERE: &str = "ActualImpactNoWhere";
const ID_HIGH_IMPACT_MUTATION: &str = "HighImpactMutation";
const DEFAULT_MEDIUM_ROWS: i64 = 1000;
const DEFAULT_CRITICAL_ROWS: i64 = 10_000;

/// `rowsAffected > 0` AND the statement is `Update`/`Delete` with no
/// `WHERE`. Where prevention only saw the SQL shape, this checker confirms
/// the unscoped mutation actually touched rows.
pub struct ActualImpactNoWhereChecker {
    cache: ParserCache,
}

impl Default for ActualImpactNoWhereChecker {
    fn default() -> Self {
        Self { cache: ParserCache::new(256) }
    }
}

impl AuditChecker for ActualImpactNoWhereChecker {
    fn id(&self) -> &'static str {
        ID_ACTUAL_IMPACT_NO_WHERE
    }

    fn audit(&self, event: &AuditEvent) -> Option<RiskScore> {
        if event.rows_affected <= 0 || !matches!(event.sql_type, SqlCommandType::Update | SqlCommandType::Delete) {
            return None;
        }
        match self.cache.parse_cached(&event.sql) {
            Ok(handle) => {
                let has_where = handle.first().is_some_and(statement_has_where);
                if has_where {
                    None
                } else {
                    Some(
                        RiskScore::new(
                            RiskLevel::Critical,
                            95,
                            format!("{} affected {} rows with no WHERE clause", event.sql_type, event.rows_affected),
                        )
                        .with_impact_metric("rows_affected", event.rows_affected as f64),
                    )
                }
            },
            Err(_) => Some(RiskScore::new(RiskLevel::Medium, 40, "analysis failed: SQL could not be parsed post-execution")),
        }
    }
}

fn statement_has_where(statement: &sqlparser::ast::Statement) -> bool {
    match statement {
        sqlparser::ast::Statement::Update { selection, .. } => selection.is_some(),
        sqlparser::ast::Statement::Delete(delete) => delete.selection.is_some(),
        _ => true,
    }
}

/// `Update`/`Delete` whose `rowsAffected` crosses a configured threshold,
/// independent of whether a `WHERE` clause was present.
pub struct HighImpactMutationChecker {
    medium_threshold: i64,
    critical_threshold: i64,
}

impl Default for HighImpactMutationChecker {
    fn default() -> Self {
        Self { medium_threshold: DEFAULT_MEDIUM_ROWS, critical_threshold: DEFAULT_CRITICAL_ROWS }
    }
}

impl HighImpactMutationChecker {
    #[must_use]
    pub fn new(medium_threshold: i64, critical_threshold: i64) -> Self {
        Self { medium_threshold, critical_threshold }
    }
}

impl AuditChecker for HighImpactMutationChecker {
    fn id(&self) -> &'static str {
        ID_HIGH_IMPACT_MUTATION
    }

    fn audit(&self, event: &AuditEvent) -> Option<RiskScore> {
        if !matches!(event.sql_type, SqlCommandType::Update | SqlCommandType::Delete) {
            return None;
        }
        let rows = event.rows_affected;
        if rows > self.critical_threshold {
            Some(
                RiskScore::new(RiskLevel::Critical, 90, format!("{} rows affected, above the critical threshold ({})", rows, self.critical_threshold))
                    .with_impact_metric("rows_affected", rows as f64),
            )
        } else if rows > self.medium_threshold {
            Some(
                RiskScore::new(RiskLevel::Medium, 65, format!("{} rows affected, above the medium threshold ({})", rows, self.medium_threshold))
                    .with_impact_metric("rows_affected", rows as f64),
            )
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn unscoped_delete_with_rows_affected_is_critical() {
        let event = AuditEvent::new("DELETE FROM orders", SqlCommandType::Delete, "site:1", "ds", Utc::now()).with_execution(10, 50_000);
        let score = ActualImpactNoWhereChecker::default().audit(&event).unwrap();
        assert_eq!(score.severity, RiskLevel::Critical);
    }

    #[test]
    fn scoped_delete_is_silent() {
        let event = AuditEvent::new("DELETE FROM orders WHERE id = 1", SqlCommandType::Delete, "site:1", "ds", Utc::now()).with_execution(10, 1);
        assert!(ActualImpactNoWhereChecker::default().audit(&event).is_none());
    }

    #[test]
    fn zero_rows_affected_is_silent_even_without_where() {
        let event = AuditEvent::new("DELETE FROM orders", SqlCommandType::Delete, "site:1", "ds", Utc::now()).with_execution(10, 0);
        assert!(ActualImpactNoWhereChecker::default().audit(&event).is_none());
    }

    #[test]
    fn high_impact_mutation_thresholds() {
        let checker = HighImpactMutationChecker::default();
        let medium = AuditEvent::new("UPDATE t SET x=1 WHERE y>0", SqlCommandType::Update, "site:1", "ds", Utc::now()).with_execution(10, 5000);
        assert_eq!(checker.audit(&medium).unwrap().severity, RiskLevel::Medium);

        let critical = AuditEvent::new("DELETE FROM orders", SqlCommandType::Delete, "site:1", "ds", Utc::now()).with_execution(10, 50_000);
        assert_eq!(checker.audit(&critical).unwrap().severity, RiskLevel::Critical);
    }
}
