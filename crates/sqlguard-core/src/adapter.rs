//! Interceptor Adapter Contract (spec §4.7): the uniform boundary by which
//! host hook points (ORM-level, pool-level, generic JDBC-style listeners)
//! feed the validation engine and carry pre-execution results to the
//! post-execution hook.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{context::normalize_for_hash, result::ValidationResult};

/// Policy applied by the host adapter when a `ValidationResult` is not
/// `Safe` (spec §4.7 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationStrategy {
    /// Fail the execution with a structured error; no SQL reaches the database.
    Block,
    /// Log at WARN and proceed with execution.
    Warn,
    /// Log at INFO and proceed with execution.
    Log,
}

/// Error raised to the host when `ViolationStrategy::Block` applies.
#[derive(Debug, Clone, thiserror::Error)]
#[error("SQL blocked by {} violation(s): {}", .result.violations().len(), summarize(&.result))]
pub struct ValidationBlockedError {
    pub result: ValidationResult,
}

fn summarize(result: &ValidationResult) -> String {
    result.violations().iter().map(|v| format!("{}[{}]", v.checker_id, v.level)).collect::<Vec<_>>().join(", ")
}

/// Derive the deterministic `statementId = {host-tag}:{datasource}:{short-hash(sql)}`.
///
/// `legacy_compat = true` omits the datasource segment, for hosts migrating
/// data recorded before standardization (spec §9 open question).
#[must_use]
pub fn derive_statement_id(host_tag: &str, datasource: &str, sql: &str, legacy_compat: bool) -> String {
    let hash = short_hash(sql);
    if legacy_compat {
        format!("{host_tag}:{hash}")
    } else {
        format!("{host_tag}:{datasource}:{hash}")
    }
}

/// First 16 hex characters of the SHA-256 of normalized SQL — enough entropy
/// to key a call site without producing an unwieldy identifier.
fn short_hash(sql: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_for_hash(sql).as_bytes());
    let full = hex::encode(hasher.finalize());
    full[..16].to_string()
}

thread_local! {
    static PENDING_RESULT: RefCell<Option<ValidationResult>> = const { RefCell::new(None) };
}

/// Scoped guard stashing the pre-execution `ValidationResult` in thread-local
/// state for hosts where pre- and post-execution hooks share a thread (e.g.
/// a generic JDBC listener). Cleared on drop — regardless of panic or normal
/// return — so no call site can ever observe a stale result (spec §4.7
/// "ThreadLocal coordination").
pub struct PendingResultGuard {
    _private: (),
}

impl PendingResultGuard {
    #[must_use]
    pub fn stash(result: ValidationResult) -> Self {
        PENDING_RESULT.with(|cell| *cell.borrow_mut() = Some(result));
        Self { _private: () }
    }

    /// Take the stashed result, if any, without ending the scope.
    #[must_use]
    pub fn take() -> Option<ValidationResult> {
        PENDING_RESULT.with(|cell| cell.borrow_mut().take())
    }
}

impl Drop for PendingResultGuard {
    fn drop(&mut self) {
        PENDING_RESULT.with(|cell| {
            cell.borrow_mut().take();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::RiskLevel;

    #[test]
    fn statement_id_is_deterministic() {
        let a = derive_statement_id("mybatis", "orders-db", "SELECT 1", false);
        let b = derive_statement_id("mybatis", "orders-db", "select   1", false);
        assert_eq!(a, b, "normalized-identical SQL yields identical statementId");
    }

    #[test]
    fn legacy_compat_omits_datasource() {
        let id = derive_statement_id("mybatis", "orders-db", "SELECT 1", true);
        assert!(!id.contains("orders-db"));
        assert!(id.starts_with("mybatis:"));
    }

    #[test]
    fn pending_result_is_cleared_on_guard_drop() {
        {
            let _guard = PendingResultGuard::stash(ValidationResult::new());
            assert!(PendingResultGuard::take().is_some());
        }
        assert!(PendingResultGuard::take().is_none());
    }

    #[test]
    fn validation_blocked_error_summarizes_violations() {
        use crate::result::Violation;
        let mut result = ValidationResult::new();
        result.push(Violation::new("NoWhereClause", RiskLevel::Critical, "no where"));
        let err = ValidationBlockedError { result };
        assert!(err.to_string().contains("NoWhereClause"));
    }
}
