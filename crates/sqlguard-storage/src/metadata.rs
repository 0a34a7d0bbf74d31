//! Metadata store (spec §4.11, §6): relational home for `AuditReport` rows
//! and `CheckerConfig`.

use async_trait::async_trait;
use sqlguard_audit::AuditReport;
use sqlguard_core::{CheckerConfig, CheckerConfigSet};
use sqlx::{MySql, Pool, Postgres, Row, Sqlite};

use crate::error::{Result, StorageError};

/// Relational store for `audit_reports` and `checker_config` (spec §6
/// schema). Upserts are keyed on `reportId` so re-delivery of the same
/// event is idempotent (spec I7).
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn upsert_report(&self, report: &AuditReport) -> Result<()>;
    async fn find_by_sql_id(&self, sql_id: &str) -> Result<Vec<AuditReport>>;
    async fn find_by_statement_id(&self, statement_id: &str) -> Result<Vec<AuditReport>>;
    async fn load_checker_config(&self) -> Result<CheckerConfigSet>;
    async fn save_checker_config(&self, config: &CheckerConfigSet) -> Result<()>;
}

pub struct PostgresMetadataStore {
    pool: Pool<Postgres>,
}

impl PostgresMetadataStore {
    #[must_use]
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Run the bundled schema migration. Idempotent (`IF NOT EXISTS`).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit_reports (
                report_id TEXT PRIMARY KEY,
                sql_id TEXT NOT NULL,
                statement_id TEXT NOT NULL,
                original_event_json JSONB NOT NULL,
                checker_results_json JSONB NOT NULL,
                risk_level TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS audit_reports_created_at_idx ON audit_reports (created_at)").execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS audit_reports_sql_id_idx ON audit_reports (sql_id)").execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS audit_reports_statement_id_idx ON audit_reports (statement_id)").execute(&self.pool).await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checker_config (
                checker_id TEXT PRIMARY KEY,
                enabled BOOLEAN NOT NULL,
                thresholds_json JSONB NOT NULL,
                whitelist_json JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    async fn upsert_report(&self, report: &AuditReport) -> Result<()> {
        let event_json = serde_json::to_value(&report.event)?;
        let results_json = serde_json::to_value(&report.checker_results)?;
        sqlx::query(
            "INSERT INTO audit_reports (report_id, sql_id, statement_id, original_event_json, checker_results_json, risk_level, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (report_id) DO UPDATE SET
                checker_results_json = EXCLUDED.checker_results_json,
                risk_level = EXCLUDED.risk_level",
        )
        .bind(&report.report_id)
        .bind(&report.sql_id)
        .bind(&report.event.statement_id)
        .bind(event_json)
        .bind(results_json)
        .bind(report.aggregated_risk_score.severity.to_string())
        .bind(report.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_sql_id(&self, sql_id: &str) -> Result<Vec<AuditReport>> {
        let rows = sqlx::query("SELECT original_event_json, checker_results_json, report_id, sql_id, created_at FROM audit_reports WHERE sql_id = $1")
            .bind(sql_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_report).collect()
    }

    async fn find_by_statement_id(&self, statement_id: &str) -> Result<Vec<AuditReport>> {
        let rows = sqlx::query(
            "SELECT original_event_json, checker_results_json, report_id, sql_id, created_at FROM audit_reports WHERE statement_id = $1",
        )
        .bind(statement_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_report).collect()
    }

    async fn load_checker_config(&self) -> Result<CheckerConfigSet> {
        let rows = sqlx::query("SELECT checker_id, enabled, thresholds_json, whitelist_json FROM checker_config").fetch_all(&self.pool).await?;
        let mut set = CheckerConfigSet::new();
        for row in rows {
            let checker_id: String = row.try_get("checker_id")?;
            let enabled: bool = row.try_get("enabled")?;
            let thresholds_json: serde_json::Value = row.try_get("thresholds_json")?;
            let whitelist_json: serde_json::Value = row.try_get("whitelist_json")?;
            let mut config = CheckerConfig::enabled(checker_id);
            config.enabled = enabled;
            config.thresholds = serde_json::from_value(thresholds_json)?;
            config.whitelist = serde_json::from_value(whitelist_json)?;
            set.insert(config);
        }
        Ok(set)
    }

    async fn save_checker_config(&self, _config: &CheckerConfigSet) -> Result<()> {
        // CheckerConfigSet doesn't expose an iterator today; callers persist
        // one CheckerConfig at a time through a dedicated repository method
        // when the config editor ships. Left unimplemented intentionally
        // rather than guessing a shape nothing yet consumes.
        Err(StorageError::UnsupportedMode("bulk checker_config save is not yet wired to an editor surface".to_string()))
    }
}

fn row_to_report(row: &sqlx::postgres::PgRow) -> Result<AuditReport> {
    let event_json: serde_json::Value = row.try_get("original_event_json")?;
    let results_json: serde_json::Value = row.try_get("checker_results_json")?;
    let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at")?;
    let event = serde_json::from_value(event_json)?;
    let checker_results = serde_json::from_value(results_json)?;
    // `report_id`/`sql_id` are derived deterministically from `event` and
    // `created_at`, so re-running the same constructor used at write time
    // reproduces the stored primary key rather than trusting the columns.
    Ok(AuditReport::new(event, checker_results, created_at))
}

pub struct MySqlMetadataStore {
    pool: Pool<MySql>,
}

impl MySqlMetadataStore {
    #[must_use]
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// Run the bundled schema migration. Idempotent (`IF NOT EXISTS`).
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit_reports (
                report_id VARCHAR(64) PRIMARY KEY,
                sql_id VARCHAR(64) NOT NULL,
                statement_id VARCHAR(255) NOT NULL,
                original_event_json JSON NOT NULL,
                checker_results_json JSON NOT NULL,
                risk_level VARCHAR(16) NOT NULL,
                created_at DATETIME(3) NOT NULL,
                INDEX audit_reports_created_at_idx (created_at),
                INDEX audit_reports_sql_id_idx (sql_id),
                INDEX audit_reports_statement_id_idx (statement_id)
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checker_config (
                checker_id VARCHAR(128) PRIMARY KEY,
                enabled BOOLEAN NOT NULL,
                thresholds_json JSON NOT NULL,
                whitelist_json JSON NOT NULL,
                updated_at DATETIME(3) NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MySqlMetadataStore {
    async fn upsert_report(&self, report: &AuditReport) -> Result<()> {
        let event_json = serde_json::to_string(&report.event)?;
        let results_json = serde_json::to_string(&report.checker_results)?;
        sqlx::query(
            "INSERT INTO audit_reports (report_id, sql_id, statement_id, original_event_json, checker_results_json, risk_level, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE checker_results_json = VALUES(checker_results_json), risk_level = VALUES(risk_level)",
        )
        .bind(&report.report_id)
        .bind(&report.sql_id)
        .bind(&report.event.statement_id)
        .bind(event_json)
        .bind(results_json)
        .bind(report.aggregated_risk_score.severity.to_string())
        .bind(report.created_at.naive_utc())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_sql_id(&self, sql_id: &str) -> Result<Vec<AuditReport>> {
        let rows = sqlx::query("SELECT original_event_json, checker_results_json, report_id, sql_id, created_at FROM audit_reports WHERE sql_id = ?")
            .bind(sql_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(mysql_row_to_report).collect()
    }

    async fn find_by_statement_id(&self, statement_id: &str) -> Result<Vec<AuditReport>> {
        let rows = sqlx::query(
            "SELECT original_event_json, checker_results_json, report_id, sql_id, created_at FROM audit_reports WHERE statement_id = ?",
        )
        .bind(statement_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(mysql_row_to_report).collect()
    }

    async fn load_checker_config(&self) -> Result<CheckerConfigSet> {
        let rows = sqlx::query("SELECT checker_id, enabled, thresholds_json, whitelist_json FROM checker_config").fetch_all(&self.pool).await?;
        let mut set = CheckerConfigSet::new();
        for row in rows {
            let checker_id: String = row.try_get("checker_id")?;
            let enabled: bool = row.try_get("enabled")?;
            let thresholds_json: serde_json::Value = row.try_get("thresholds_json")?;
            let whitelist_json: serde_json::Value = row.try_get("whitelist_json")?;
            let mut config = CheckerConfig::enabled(checker_id);
            config.enabled = enabled;
            config.thresholds = serde_json::from_value(thresholds_json)?;
            config.whitelist = serde_json::from_value(whitelist_json)?;
            set.insert(config);
        }
        Ok(set)
    }

    async fn save_checker_config(&self, _config: &CheckerConfigSet) -> Result<()> {
        Err(StorageError::UnsupportedMode("bulk checker_config save is not yet wired to an editor surface".to_string()))
    }
}

fn mysql_row_to_report(row: &sqlx::mysql::MySqlRow) -> Result<AuditReport> {
    let event_json: serde_json::Value = row.try_get("original_event_json")?;
    let results_json: serde_json::Value = row.try_get("checker_results_json")?;
    let created_at: chrono::NaiveDateTime = row.try_get("created_at")?;
    let event = serde_json::from_value(event_json)?;
    let checker_results = serde_json::from_value(results_json)?;
    Ok(AuditReport::new(event, checker_results, created_at.and_utc()))
}

pub struct SqliteMetadataStore {
    pool: Pool<Sqlite>,
}

impl SqliteMetadataStore {
    #[must_use]
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS audit_reports (
                report_id TEXT PRIMARY KEY,
                sql_id TEXT NOT NULL,
                statement_id TEXT NOT NULL,
                original_event_json TEXT NOT NULL,
                checker_results_json TEXT NOT NULL,
                risk_level TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS audit_reports_sql_id_idx ON audit_reports (sql_id)").execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS audit_reports_statement_id_idx ON audit_reports (statement_id)").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn upsert_report(&self, report: &AuditReport) -> Result<()> {
        let event_json = serde_json::to_string(&report.event)?;
        let results_json = serde_json::to_string(&report.checker_results)?;
        sqlx::query(
            "INSERT INTO audit_reports (report_id, sql_id, statement_id, original_event_json, checker_results_json, risk_level, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(report_id) DO UPDATE SET checker_results_json = excluded.checker_results_json, risk_level = excluded.risk_level",
        )
        .bind(&report.report_id)
        .bind(&report.sql_id)
        .bind(&report.event.statement_id)
        .bind(event_json)
        .bind(results_json)
        .bind(report.aggregated_risk_score.severity.to_string())
        .bind(report.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_sql_id(&self, sql_id: &str) -> Result<Vec<AuditReport>> {
        let rows = sqlx::query("SELECT original_event_json, checker_results_json, report_id, sql_id, created_at FROM audit_reports WHERE sql_id = ?")
            .bind(sql_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(sqlite_row_to_report).collect()
    }

    async fn find_by_statement_id(&self, statement_id: &str) -> Result<Vec<AuditReport>> {
        let rows = sqlx::query(
            "SELECT original_event_json, checker_results_json, report_id, sql_id, created_at FROM audit_reports WHERE statement_id = ?",
        )
        .bind(statement_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(sqlite_row_to_report).collect()
    }

    async fn load_checker_config(&self) -> Result<CheckerConfigSet> {
        Ok(CheckerConfigSet::new())
    }

    async fn save_checker_config(&self, _config: &CheckerConfigSet) -> Result<()> {
        Err(StorageError::UnsupportedMode("checker_config persistence is not implemented for the sqlite backend".to_string()))
    }
}

fn sqlite_row_to_report(row: &sqlx::sqlite::SqliteRow) -> Result<AuditReport> {
    let event_json: String = row.try_get("original_event_json")?;
    let results_json: String = row.try_get("checker_results_json")?;
    let created_at_raw: String = row.try_get("created_at")?;
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_raw)
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?
        .with_timezone(&chrono::Utc);
    let event = serde_json::from_str(&event_json)?;
    let checker_results = serde_json::from_str(&results_json)?;
    Ok(AuditReport::new(event, checker_results, created_at))
}
