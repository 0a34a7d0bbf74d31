//! Canonical on-the-wire event and stored analytic record (spec §3, §6).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlguard_core::{context::normalize_for_hash, result::RiskLevel, SqlCommandType, ValidationResult};

/// Pre-execution violations carried along on the wire, summarized rather
/// than re-serializing the full internal `Violation` type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationsPayload {
    pub risk_level: RiskLevel,
    pub findings: Vec<ViolationSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationSummary {
    pub checker_id: String,
    pub level: RiskLevel,
    pub message: String,
}

impl From<&ValidationResult> for ViolationsPayload {
    fn from(result: &ValidationResult) -> Self {
        Self {
            risk_level: result.risk_level(),
            findings: result
                .violations()
                .iter()
                .map(|v| ViolationSummary { checker_id: v.checker_id.clone(), level: v.level, message: v.message.clone() })
                .collect(),
        }
    }
}

/// Canonical post-execution record (spec §6 wire format). Field order and
/// names are part of the stable contract: downstream consumers parse this
/// JSON directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub sql_id: String,
    pub sql: String,
    pub sql_type: SqlCommandType,
    pub statement_id: String,
    pub datasource: String,
    pub params: Option<BTreeMap<String, String>>,
    pub execution_time_ms: i64,
    /// -1 when not applicable (e.g. a `SELECT`).
    pub rows_affected: i64,
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub violations: Option<ViolationsPayload>,
}

impl AuditEvent {
    #[must_use]
    pub fn new(
        sql: impl Into<String>,
        sql_type: SqlCommandType,
        statement_id: impl Into<String>,
        datasource: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let sql = sql.into();
        let sql_id = compute_sql_id(&sql);
        Self {
            sql_id,
            sql,
            sql_type,
            statement_id: statement_id.into(),
            datasource: datasource.into(),
            params: None,
            execution_time_ms: 0,
            rows_affected: -1,
            error_message: None,
            timestamp,
            violations: None,
        }
    }

    #[must_use]
    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = Some(params);
        self
    }

    #[must_use]
    pub fn with_execution(mut self, execution_time_ms: i64, rows_affected: i64) -> Self {
        self.execution_time_ms = execution_time_ms;
        self.rows_affected = rows_affected;
        self
    }

    #[must_use]
    pub fn with_error(mut self, error_message: impl Into<String>) -> Self {
        self.error_message = Some(error_message.into());
        self
    }

    #[must_use]
    pub fn with_violations(mut self, result: &ValidationResult) -> Self {
        self.violations = Some(ViolationsPayload::from(result));
        self
    }
}

/// `sqlId`: stable hash of the normalized SQL, reproducible from `sql` alone.
#[must_use]
pub fn compute_sql_id(sql: &str) -> String {
    let normalized = normalize_for_hash(sql);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// A single checker's finding for one `AuditReport`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckerResult {
    pub checker_id: String,
    pub risk_score: RiskScore,
}

/// Output of one audit checker (spec §4.9).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskScore {
    pub severity: RiskLevel,
    /// 0-100.
    pub confidence: u8,
    pub justification: String,
    pub impact_metrics: Option<BTreeMap<String, f64>>,
}

impl RiskScore {
    #[must_use]
    pub fn new(severity: RiskLevel, confidence: u8, justification: impl Into<String>) -> Self {
        Self { severity, confidence: confidence.min(100), justification: justification.into(), impact_metrics: None }
    }

    #[must_use]
    pub fn with_impact_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.impact_metrics.get_or_insert_with(BTreeMap::new).insert(key.into(), value);
        self
    }
}

/// Stored, analyzed version of an `AuditEvent` (spec §3 "AuditReport").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub report_id: String,
    pub sql_id: String,
    pub event: AuditEvent,
    pub checker_results: Vec<CheckerResult>,
    pub aggregated_risk_score: RiskScore,
    pub created_at: DateTime<Utc>,
}

impl AuditReport {
    /// Build a report from an event and the bank's findings.
    ///
    /// `reportId = sqlId + day bucket of the event timestamp`, so re-delivery
    /// of the same event within the same day collides onto the same id and
    /// a storage adapter's idempotent upsert drops the duplicate (spec I7).
    #[must_use]
    pub fn new(event: AuditEvent, mut checker_results: Vec<CheckerResult>, created_at: DateTime<Utc>) -> Self {
        if checker_results.is_empty() {
            checker_results.push(CheckerResult {
                checker_id: "NoFindings".to_string(),
                risk_score: RiskScore::new(RiskLevel::Safe, 100, "no audit checker produced a finding"),
            });
        }
        let aggregated_risk_score = aggregate(&checker_results);
        let report_id = format!("{}:{}", event.sql_id, created_at.format("%Y%m%d"));
        Self { report_id, sql_id: event.sql_id.clone(), event, checker_results, aggregated_risk_score, created_at }
    }
}

fn aggregate(results: &[CheckerResult]) -> RiskScore {
    results
        .iter()
        .max_by_key(|r| r.risk_score.severity)
        .map(|r| r.risk_score.clone())
        .unwrap_or_else(|| RiskScore::new(RiskLevel::Safe, 100, "no findings"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_id_is_reproducible_from_sql() {
        assert_eq!(compute_sql_id("SELECT 1"), compute_sql_id("select   1"));
    }

    #[test]
    fn json_round_trip_preserves_null_fields() {
        let event = AuditEvent::new("SELECT 1", SqlCommandType::Select, "site:1", "ds", Utc::now());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"errorMessage\":null"));
        assert!(json.contains("\"violations\":null"));
        let round_tripped: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, round_tripped);
    }

    #[test]
    fn aggregated_severity_is_max_over_checker_results() {
        let event = AuditEvent::new("DELETE FROM orders", SqlCommandType::Delete, "site:1", "ds", Utc::now());
        let results = vec![
            CheckerResult { checker_id: "SlowQuery".to_string(), risk_score: RiskScore::new(RiskLevel::Low, 80, "fast enough") },
            CheckerResult {
                checker_id: "ActualImpactNoWhere".to_string(),
                risk_score: RiskScore::new(RiskLevel::Critical, 95, "no WHERE, rows affected"),
            },
        ];
        let report = AuditReport::new(event, results, Utc::now());
        assert_eq!(report.aggregated_risk_score.severity, RiskLevel::Critical);
    }

    #[test]
    fn empty_checker_results_yields_single_no_findings_entry() {
        let event = AuditEvent::new("SELECT 1", SqlCommandType::Select, "site:1", "ds", Utc::now());
        let report = AuditReport::new(event, Vec::new(), Utc::now());
        assert_eq!(report.checker_results.len(), 1);
        assert_eq!(report.aggregated_risk_score.severity, RiskLevel::Safe);
    }
}
