//! Audit Checker Bank (spec §4.9): post-execution analyzers over a completed
//! `AuditEvent`, each producing an optional `RiskScore`.

mod error_pattern;
mod impact;
mod result_size;
mod slow_query;

pub use error_pattern::ErrorPatternChecker;
pub use impact::{ActualImpactNoWhereChecker, HighImpactMutationChecker};
pub use result_size::{LargeResultChecker, UnboundedReadChecker};
pub use slow_query::SlowQueryChecker;

use crate::event::{AuditEvent, CheckerResult, RiskScore};

/// One audit-side rule. Unlike prevention checkers these run after the
/// fact, against a completed execution record rather than a parsed
/// statement about to run.
pub trait AuditChecker: Send + Sync {
    fn id(&self) -> &'static str;

    /// `None` means "no finding" — the checker is silent for this event.
    fn audit(&self, event: &AuditEvent) -> Option<RiskScore>;
}

/// Sequential bank run within one worker (spec §4.10: "checkers in the bank
/// are run sequentially; each is cheap; parallelizing per-checker is not
/// worth the overhead").
pub struct AuditCheckerBank {
    checkers: Vec<Box<dyn AuditChecker>>,
}

impl AuditCheckerBank {
    #[must_use]
    pub fn new(checkers: Vec<Box<dyn AuditChecker>>) -> Self {
        Self { checkers }
    }

    #[must_use]
    pub fn default_bank() -> Self {
        Self::new(vec![
            Box::new(SlowQueryChecker::default()),
            Box::new(LargeResultChecker::default()),
            Box::new(UnboundedReadChecker::default()),
            Box::new(ActualImpactNoWhereChecker::default()),
            Box::new(HighImpactMutationChecker::default()),
            Box::new(ErrorPatternChecker),
        ])
    }

    /// Run every checker in declared order, preserving that order in the
    /// returned list (spec §5: "within one worker, checkers are applied in
    /// declared order and the report lists findings in that order").
    #[must_use]
    pub fn run(&self, event: &AuditEvent) -> Vec<CheckerResult> {
        self.checkers
            .iter()
            .filter_map(|checker| checker.audit(event).map(|risk_score| CheckerResult { checker_id: checker.id().to_string(), risk_score }))
            .collect()
    }
}
