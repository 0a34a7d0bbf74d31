//! `LargeResult` and `UnboundedRead` (spec §4.9): result-set size checks.
//!
//! `AuditEvent` has no dedicated result-set-size field; for a `Select`,
//! `rowsAffected` carries the row count the host adapter observed (the same
//! convention the wire format's `-1` sentinel implies for statements where
//! the count doesn't apply).

use sqlguard_core::{result::RiskLevel, SqlCommandType};

use super::AuditChecker;
use crate::event::{AuditEvent, RiskScore};

const ID_LARGE_RESULT: &str = "LargeResult";
const ID_UNBOUNDED_READ: &str = "UnboundedRead";
const DEFAULT_LARGE_RESULT_CAP: i64 = 5000;
const DEFAULT_UNBOUNDED_READ_CAP: i64 = 10_000;

pub struct LargeResultChecker {
    cap: i64,
}

impl Default for LargeResultChecker {
    fn default() -> Self {
        Self { cap: DEFAULT_LARGE_RESULT_CAP }
    }
}

impl LargeResultChecker {
    #[must_use]
    pub fn new(cap: i64) -> Self {
        Self { cap }
    }
}

impl AuditChecker for LargeResultChecker {
    fn id(&self) -> &'static str {
        ID_LARGE_RESULT
    }

    fn audit(&self, event: &AuditEvent) -> Option<RiskScore> {
        if event.sql_type == SqlCommandType::Select && event.rows_affected > self.cap {
            return Some(
                RiskScore::new(RiskLevel::High, 70, format!("result set of {} rows exceeds the configured cap ({})", event.rows_affected, self.cap))
                    .with_impact_metric("result_rows", event.rows_affected as f64),
            );
        }
        None
    }
}

pub struct UnboundedReadChecker {
    hard_cap: i64,
}

impl Default for UnboundedReadChecker {
    fn default() -> Self {
        Self { hard_cap: DEFAULT_UNBOUNDED_READ_CAP }
    }
}

impl UnboundedReadChecker {
    #[must_use]
    pub fn new(hard_cap: i64) -> Self {
        Self { hard_cap }
    }
}

impl AuditChecker for UnboundedReadChecker {
    fn id(&self) -> &'static str {
        ID_UNBOUNDED_READ
    }

    fn audit(&self, event: &AuditEvent) -> Option<RiskScore> {
        if event.sql_type == SqlCommandType::Select && event.rows_affected > self.hard_cap {
            return Some(
                RiskScore::new(
                    RiskLevel::High,
                    85,
                    format!("unbounded SELECT returned {} rows, above the hard cap ({})", event.rows_affected, self.hard_cap),
                )
                .with_impact_metric("result_rows", event.rows_affected as f64),
            );
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn select_event(rows: i64) -> AuditEvent {
        AuditEvent::new("SELECT * FROM big_table", SqlCommandType::Select, "site:1", "ds", Utc::now()).with_execution(50, rows)
    }

    #[test]
    fn large_result_flagged() {
        assert!(LargeResultChecker::default().audit(&select_event(6000)).is_some());
    }

    #[test]
    fn under_cap_is_silent() {
        assert!(LargeResultChecker::default().audit(&select_event(100)).is_none());
    }

    #[test]
    fn unbounded_read_flagged_past_hard_cap() {
        assert!(UnboundedReadChecker::default().audit(&select_event(15_000)).is_some());
    }

    #[test]
    fn non_select_is_never_flagged() {
        let event = AuditEvent::new("UPDATE t SET x=1", SqlCommandType::Update, "site:1", "ds", Utc::now()).with_execution(10, 50_000);
        assert!(LargeResultChecker::default().audit(&event).is_none());
        assert!(UnboundedReadChecker::default().audit(&event).is_none());
    }
}
