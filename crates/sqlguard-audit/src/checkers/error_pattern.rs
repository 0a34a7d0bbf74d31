//! `ErrorPattern` (spec §4.9): classify `errorMessage` by known failure shape.

use sqlguard_core::result::RiskLevel;

use super::AuditChecker;
use crate::event::{AuditEvent, RiskScore};

const ID: &str = "ErrorPattern";

pub struct ErrorPatternChecker;

impl AuditChecker for ErrorPatternChecker {
    fn id(&self) -> &'static str {
        ID
    }

    fn audit(&self, event: &AuditEvent) -> Option<RiskScore> {
        let message = event.error_message.as_ref()?;
        let lower = message.to_lowercase();

        if lower.contains("deadlock") {
            Some(RiskScore::new(RiskLevel::High, 85, "Deadlock detected"))
        } else if lower.contains("lock wait timeout") || lower.contains("lock-wait-timeout") {
            Some(RiskScore::new(RiskLevel::High, 80, "Lock wait timeout"))
        } else if lower.contains("connection timeout") || lower.contains("connection-timeout") {
            Some(RiskScore::new(RiskLevel::High, 75, "Connection timeout"))
        } else if lower.contains("syntax error") {
            Some(RiskScore::new(RiskLevel::Medium, 60, "Syntax error"))
        } else {
            Some(RiskScore::new(RiskLevel::Low, 40, "Unclassified execution error"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlguard_core::SqlCommandType;

    fn event_with_error(message: &str) -> AuditEvent {
        AuditEvent::new("UPDATE t SET x=1", SqlCommandType::Update, "site:1", "ds", Utc::now()).with_error(message)
    }

    #[test]
    fn deadlock_is_high() {
        let score = ErrorPatternChecker.audit(&event_with_error("Deadlock found when trying to get lock")).unwrap();
        assert_eq!(score.severity, RiskLevel::High);
        assert_eq!(score.justification, "Deadlock detected");
    }

    #[test]
    fn syntax_error_is_medium() {
        let score = ErrorPatternChecker.audit(&event_with_error("You have a syntax error in your SQL")).unwrap();
        assert_eq!(score.severity, RiskLevel::Medium);
    }

    #[test]
    fn unclassified_error_is_low() {
        let score = ErrorPatternChecker.audit(&event_with_error("some other failure")).unwrap();
        assert_eq!(score.severity, RiskLevel::Low);
    }

    #[test]
    fn no_error_message_is_silent() {
        let event = AuditEvent::new("SELECT 1", SqlCommandType::Select, "site:1", "ds", Utc::now());
        assert!(ErrorPatternChecker.audit(&event).is_none());
    }
}
