//! Deduplication Filter (spec §4.5): per-thread bounded LRU suppressing
//! repeated reports from the same call site within a window.
//!
//! Deliberately per-thread: a shared, cross-thread filter would need locking
//! on the validation hot path. `thread_local!` keeps each thread's LRU
//! private, matching spec §9's "Dedup scope" design note.

use std::cell::RefCell;

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::result::{RiskLevel, Violation};

const DEFAULT_CAPACITY: usize = 256;

thread_local! {
    static DEDUP_CACHE: RefCell<LruCache<String, ()>> = RefCell::new(LruCache::new(
        std::num::NonZeroUsize::new(DEFAULT_CAPACITY).expect("default capacity is nonzero")
    ));
}

/// `hash(statementId, checkerId, riskLevel, message)` — the dedup key.
#[must_use]
pub fn fingerprint(statement_id: &str, checker_id: &str, level: RiskLevel, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(statement_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(checker_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(level.to_string().as_bytes());
    hasher.update([0u8]);
    hasher.update(message.as_bytes());
    hex::encode(hasher.finalize())
}

/// `true` if this fingerprint has not been seen in the current thread's
/// window (and records it as seen); `false` if it should be suppressed.
pub fn should_report(fingerprint: &str) -> bool {
    DEDUP_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if cache.contains(fingerprint) {
            cache.promote(fingerprint);
            false
        } else {
            cache.put(fingerprint.to_string(), ());
            true
        }
    })
}

/// Filter `violations` for `statement_id`, dropping any already seen on this
/// thread. Suppressed count is returned alongside the kept violations so the
/// engine can record it for metrics without it becoming a `Violation` entry.
#[must_use]
pub fn dedup_violations(statement_id: &str, violations: Vec<Violation>) -> (Vec<Violation>, usize) {
    let mut kept = Vec::with_capacity(violations.len());
    let mut suppressed = 0usize;
    for violation in violations {
        let fp = fingerprint(statement_id, &violation.checker_id, violation.level, &violation.message);
        if should_report(&fp) {
            kept.push(violation);
        } else {
            suppressed += 1;
        }
    }
    (kept, suppressed)
}

/// Reset this thread's dedup window. Exposed for tests and for long-lived
/// worker threads that want to bound memory across unrelated workloads.
pub fn clear() {
    DEDUP_CACHE.with(|cache| cache.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_fingerprint_is_suppressed_on_second_call() {
        clear();
        let fp = fingerprint("site:1", "NoWhereClause", RiskLevel::Critical, "msg");
        assert!(should_report(&fp));
        assert!(!should_report(&fp));
    }

    #[test]
    fn different_fingerprints_both_report() {
        clear();
        let a = fingerprint("site:1", "NoWhereClause", RiskLevel::Critical, "msg");
        let b = fingerprint("site:2", "NoWhereClause", RiskLevel::Critical, "msg");
        assert!(should_report(&a));
        assert!(should_report(&b));
    }

    #[test]
    fn dedup_violations_drops_repeats_within_one_call() {
        clear();
        let violations = vec![
            Violation::new("NoWhereClause", RiskLevel::Critical, "same message"),
            Violation::new("NoWhereClause", RiskLevel::Critical, "same message"),
        ];
        let (kept, suppressed) = dedup_violations("site:1", violations);
        assert_eq!(kept.len(), 1);
        assert_eq!(suppressed, 1);
    }
}
