use sqlguard_core::result::RiskLevel;

use super::AuditChecker;
use crate::event::{AuditEvent, RiskScore};

const ID: &str = "SlowQuery";
const DEFAULT_SLOW_MS: i64 = 1000;
const DEFAULT_CRITICAL_MS: i64 = 5000;

pub struct SlowQueryChecker {
    slow_threshold_ms: i64,
    critical_threshold_ms: i64,
}

impl Default for SlowQueryChecker {
    fn default() -> Self {
        Self { slow_threshold_ms: DEFAULT_SLOW_MS, critical_threshold_ms: DEFAULT_CRITICAL_MS }
    }
}

impl SlowQueryChecker {
    #[must_use]
    pub fn new(slow_threshold_ms: i64, critical_threshold_ms: i64) -> Self {
        Self { slow_threshold_ms, critical_threshold_ms }
    }
}

impl AuditChecker for SlowQueryChecker {
    fn id(&self) -> &'static str {
        ID
    }

    fn audit(&self, event: &AuditEvent) -> Option<RiskScore> {
        let ms = event.execution_time_ms;
        if ms > self.critical_threshold_ms {
            Some(
                RiskScore::new(RiskLevel::Critical, 90, format!("execution took {ms}ms, above the critical threshold ({}ms)", self.critical_threshold_ms))
                    .with_impact_metric("execution_time_ms", ms as f64),
            )
        } else if ms > self.slow_threshold_ms {
            Some(
                RiskScore::new(RiskLevel::High, 75, format!("execution took {ms}ms, above the slow threshold ({}ms)", self.slow_threshold_ms))
                    .with_impact_metric("execution_time_ms", ms as f64),
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
    use sqlguard_core::SqlCommandType;

    fn event(execution_time_ms: i64) -> AuditEvent {
        AuditEvent::new("SELECT 1", SqlCommandType::Select, "site:1", "ds", Utc::now()).with_execution(execution_time_ms, 1)
    }

    #[test]
    fn below_threshold_is_silent() {
        assert!(SlowQueryChecker::default().audit(&event(200)).is_none());
    }

    #[test]
    fn above_slow_threshold_is_high() {
        let score = SlowQueryChecker::default().audit(&event(2000)).unwrap();
        assert_eq!(score.severity, RiskLevel::High);
    }

    #[test]
    fn above_critical_threshold_is_critical() {
        let score = SlowQueryChecker::default().audit(&event(6200)).unwrap();
        assert_eq!(score.severity, RiskLevel::Critical);
    }
}
