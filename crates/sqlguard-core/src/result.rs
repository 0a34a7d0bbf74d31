//! Output of the prevention engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Ordered risk level. `Safe < Low < Medium < High < Critical`; the derived
/// `Ord` impl relies on declaration order, which is what §8 invariant I1
/// ("aggregation is the max") depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Safe => "SAFE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// A single finding produced by one checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub checker_id: String,
    pub level: RiskLevel,
    pub message: String,
    pub suggestion: Option<String>,
}

impl Violation {
    #[must_use]
    pub fn new(checker_id: impl Into<String>, level: RiskLevel, message: impl Into<String>) -> Self {
        Self {
            checker_id: checker_id.into(),
            level,
            message: message.into(),
            suggestion: None,
        }
    }

    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Outcome of a single `validate()` call.
///
/// `passed` and `risk_level` are both derived from `violations`; the list is
/// append-only within one validation call (monotonic risk, per spec
/// invariant on `ValidationResult`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    violations: Vec<Violation>,
    /// Open details map for checker-attached context (e.g. which table
    /// tripped a `DeniedTable` match).
    pub details: BTreeMap<String, String>,
}

impl ValidationResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a violation. Monotonic: `risk_level()` after this call is
    /// never lower than before it.
    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Max risk level across all accepted violations, or `Safe` if empty.
    #[must_use]
    pub fn risk_level(&self) -> RiskLevel {
        self.violations
            .iter()
            .map(|v| v.level)
            .max()
            .unwrap_or(RiskLevel::Safe)
    }

    pub fn insert_detail(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.details.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_is_safe_and_passed() {
        let result = ValidationResult::new();
        assert!(result.passed());
        assert_eq!(result.risk_level(), RiskLevel::Safe);
    }

    #[test]
    fn risk_level_is_max_over_violations() {
        let mut result = ValidationResult::new();
        result.push(Violation::new("c1", RiskLevel::Low, "low finding"));
        result.push(Violation::new("c2", RiskLevel::Critical, "critical finding"));
        result.push(Violation::new("c3", RiskLevel::Medium, "medium finding"));
        assert_eq!(result.risk_level(), RiskLevel::Critical);
        assert!(!result.passed());
    }

    #[test]
    fn risk_level_ordering() {
        assert!(RiskLevel::Safe < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }
}
