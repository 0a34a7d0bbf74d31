//! Log store (spec §4.11, §6): append-only home for raw `AuditEvent` rows,
//! queried by time range and pruned by the retention job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row as ClickHouseRow;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sqlguard_audit::AuditEvent;
use sqlx::{MySql, Pool, Postgres, Row, Sqlite};

use crate::error::{Result, StorageError};

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn log(&self, event: &AuditEvent) -> Result<()>;
    async fn log_batch(&self, events: &[AuditEvent]) -> Result<()>;
    async fn find_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<AuditEvent>>;
    async fn count_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64>;
    /// Delete everything with `timestamp < cutoff`. Returns rows deleted.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

pub struct PostgresLogStore {
    pool: Pool<Postgres>,
}

impl PostgresLogStore {
    #[must_use]
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sql_executions (
                id BIGSERIAL PRIMARY KEY,
                event_json JSONB NOT NULL,
                sql_id TEXT NOT NULL,
                timestamp TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS sql_executions_timestamp_idx ON sql_executions (timestamp)").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl LogStore for PostgresLogStore {
    async fn log(&self, event: &AuditEvent) -> Result<()> {
        let json = serde_json::to_value(event)?;
        sqlx::query("INSERT INTO sql_executions (event_json, sql_id, timestamp) VALUES ($1, $2, $3)")
            .bind(json)
            .bind(&event.sql_id)
            .bind(event.timestamp)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn log_batch(&self, events: &[AuditEvent]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for event in events {
            let json = serde_json::to_value(event)?;
            sqlx::query("INSERT INTO sql_executions (event_json, sql_id, timestamp) VALUES ($1, $2, $3)")
                .bind(json)
                .bind(&event.sql_id)
                .bind(event.timestamp)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query("SELECT event_json FROM sql_executions WHERE timestamp >= $1 AND timestamp < $2 ORDER BY timestamp")
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let json: serde_json::Value = row.try_get("event_json")?;
                Ok(serde_json::from_value(json)?)
            })
            .collect()
    }

    async fn count_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sql_executions WHERE timestamp >= $1 AND timestamp < $2")
            .bind(start)
            .bind(end)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sql_executions WHERE timestamp < $1").bind(cutoff).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

pub struct MySqlLogStore {
    pool: Pool<MySql>,
}

impl MySqlLogStore {
    #[must_use]
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sql_executions (
                id BIGINT AUTO_INCREMENT PRIMARY KEY,
                event_json JSON NOT NULL,
                sql_id VARCHAR(64) NOT NULL,
                timestamp DATETIME(3) NOT NULL,
                INDEX sql_executions_timestamp_idx (timestamp)
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LogStore for MySqlLogStore {
    async fn log(&self, event: &AuditEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;
        sqlx::query("INSERT INTO sql_executions (event_json, sql_id, timestamp) VALUES (?, ?, ?)")
            .bind(json)
            .bind(&event.sql_id)
            .bind(event.timestamp.naive_utc())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn log_batch(&self, events: &[AuditEvent]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for event in events {
            let json = serde_json::to_string(event)?;
            sqlx::query("INSERT INTO sql_executions (event_json, sql_id, timestamp) VALUES (?, ?, ?)")
                .bind(json)
                .bind(&event.sql_id)
                .bind(event.timestamp.naive_utc())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query("SELECT event_json FROM sql_executions WHERE timestamp >= ? AND timestamp < ? ORDER BY timestamp")
            .bind(start.naive_utc())
            .bind(end.naive_utc())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let json: serde_json::Value = row.try_get("event_json")?;
                Ok(serde_json::from_value(json)?)
            })
            .collect()
    }

    async fn count_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sql_executions WHERE timestamp >= ? AND timestamp < ?")
            .bind(start.naive_utc())
            .bind(end.naive_utc())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sql_executions WHERE timestamp < ?").bind(cutoff.naive_utc()).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

pub struct SqliteLogStore {
    pool: Pool<Sqlite>,
}

impl SqliteLogStore {
    #[must_use]
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sql_executions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_json TEXT NOT NULL,
                sql_id TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS sql_executions_timestamp_idx ON sql_executions (timestamp)").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    async fn log(&self, event: &AuditEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;
        sqlx::query("INSERT INTO sql_executions (event_json, sql_id, timestamp) VALUES (?, ?, ?)")
            .bind(json)
            .bind(&event.sql_id)
            .bind(event.timestamp.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn log_batch(&self, events: &[AuditEvent]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for event in events {
            let json = serde_json::to_string(event)?;
            sqlx::query("INSERT INTO sql_executions (event_json, sql_id, timestamp) VALUES (?, ?, ?)")
                .bind(json)
                .bind(&event.sql_id)
                .bind(event.timestamp.to_rfc3339())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query("SELECT event_json FROM sql_executions WHERE timestamp >= ? AND timestamp < ? ORDER BY timestamp")
            .bind(start.to_rfc3339())
            .bind(end.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let json: String = row.try_get("event_json")?;
                Ok(serde_json::from_str(&json)?)
            })
            .collect()
    }

    async fn count_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sql_executions WHERE timestamp >= ? AND timestamp < ?")
            .bind(start.to_rfc3339())
            .bind(end.to_rfc3339())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sql_executions WHERE timestamp < ?").bind(cutoff.to_rfc3339()).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Row shape for the ClickHouse `sql_executions` table. ClickHouse has no
/// native JSON column in the configurations this adapter targets, so the
/// event is stored as its serialized form alongside a few columns pulled out
/// for range queries.
#[derive(Debug, Serialize, Deserialize, ClickHouseRow)]
struct ClickHouseEventRow {
    sql_id: String,
    timestamp: i64,
    event_json: String,
}

pub struct ClickHouseLogStore {
    client: clickhouse::Client,
}

impl ClickHouseLogStore {
    #[must_use]
    pub fn new(client: clickhouse::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogStore for ClickHouseLogStore {
    async fn log(&self, event: &AuditEvent) -> Result<()> {
        self.log_batch(std::slice::from_ref(event)).await
    }

    async fn log_batch(&self, events: &[AuditEvent]) -> Result<()> {
        use clickhouse::inserter::Inserter;
        let mut inserter: Inserter<ClickHouseEventRow> = self.client.inserter("sql_executions");
        for event in events {
            let row = ClickHouseEventRow {
                sql_id: event.sql_id.clone(),
                timestamp: event.timestamp.timestamp_millis(),
                event_json: serde_json::to_string(event)?,
            };
            inserter.write(&row).await?;
        }
        inserter.end().await?;
        Ok(())
    }

    async fn find_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<AuditEvent>> {
        let rows: Vec<ClickHouseEventRow> = self
            .client
            .query("SELECT sql_id, timestamp, event_json FROM sql_executions WHERE timestamp >= ? AND timestamp < ? ORDER BY timestamp")
            .bind(start.timestamp_millis())
            .bind(end.timestamp_millis())
            .fetch_all()
            .await?;
        rows.iter().map(|row| Ok(serde_json::from_str(&row.event_json)?)).collect()
    }

    async fn count_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let count: u64 = self
            .client
            .query("SELECT count() FROM sql_executions WHERE timestamp >= ? AND timestamp < ?")
            .bind(start.timestamp_millis())
            .bind(end.timestamp_millis())
            .fetch_one()
            .await?;
        Ok(count as i64)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        // ClickHouse deletes are async mutations; this issues the mutation
        // and reports the number of rows it targeted rather than waiting for
        // the background merge to finish applying it.
        let count = self.count_by_time_range(DateTime::<Utc>::MIN_UTC, cutoff).await?;
        self.client
            .query("ALTER TABLE sql_executions DELETE WHERE timestamp < ?")
            .bind(cutoff.timestamp_millis())
            .execute()
            .await?;
        Ok(count.max(0) as u64)
    }
}

/// Elasticsearch access goes over raw HTTP rather than a dedicated client
/// crate; indices are bucketed per day (`sql-audit-YYYY.MM.DD`) so the
/// retention job can drop whole indices instead of issuing delete-by-query.
pub struct ElasticsearchLogStore {
    client: Client,
    base_url: String,
}

impl ElasticsearchLogStore {
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self { client, base_url: base_url.into() }
    }

    fn index_for(&self, timestamp: DateTime<Utc>) -> String {
        format!("sql-audit-{}", timestamp.format("%Y.%m.%d"))
    }
}

#[async_trait]
impl LogStore for ElasticsearchLogStore {
    async fn log(&self, event: &AuditEvent) -> Result<()> {
        let index = self.index_for(event.timestamp);
        let url = format!("{}/{}/_doc", self.base_url, index);
        let response = self.client.post(url).json(event).send().await?;
        if !response.status().is_success() {
            return Err(StorageError::WriteFailed(format!("elasticsearch index returned {}", response.status())));
        }
        Ok(())
    }

    async fn log_batch(&self, events: &[AuditEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let mut bulk_body = String::new();
        for event in events {
            let index = self.index_for(event.timestamp);
            bulk_body.push_str(&serde_json::to_string(&serde_json::json!({"index": {"_index": index}}))?);
            bulk_body.push('\n');
            bulk_body.push_str(&serde_json::to_string(event)?);
            bulk_body.push('\n');
        }
        let url = format!("{}/_bulk", self.base_url);
        let response = self.client.post(url).header("Content-Type", "application/x-ndjson").body(bulk_body).send().await?;
        if !response.status().is_success() {
            return Err(StorageError::WriteFailed(format!("elasticsearch bulk insert returned {}", response.status())));
        }
        Ok(())
    }

    async fn find_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<AuditEvent>> {
        let url = format!("{}/sql-audit-*/_search", self.base_url);
        let body = serde_json::json!({
            "query": {"range": {"timestamp": {"gte": start.to_rfc3339(), "lt": end.to_rfc3339()}}},
            "sort": [{"timestamp": "asc"}],
            "size": 10_000,
        });
        let response = self.client.post(url).json(&body).send().await?;
        let parsed: serde_json::Value = response.json().await?;
        let hits = parsed["hits"]["hits"].as_array().cloned().unwrap_or_default();
        hits.into_iter()
            .map(|hit| {
                serde_json::from_value(hit["_source"].clone())
                    .map_err(StorageError::from)
            })
            .collect()
    }

    async fn count_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<i64> {
        let url = format!("{}/sql-audit-*/_count", self.base_url);
        let body = serde_json::json!({
            "query": {"range": {"timestamp": {"gte": start.to_rfc3339(), "lt": end.to_rfc3339()}}},
        });
        let response = self.client.post(url).json(&body).send().await?;
        let parsed: serde_json::Value = response.json().await?;
        Ok(parsed["count"].as_i64().unwrap_or(0))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let count = self.count_by_time_range(DateTime::<Utc>::MIN_UTC, cutoff).await?;
        let url = format!("{}/sql-audit-*/_delete_by_query", self.base_url);
        let body = serde_json::json!({
            "query": {"range": {"timestamp": {"lt": cutoff.to_rfc3339()}}},
        });
        let response = self.client.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(StorageError::WriteFailed(format!("elasticsearch delete_by_query returned {}", response.status())));
        }
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_name_buckets_per_day() {
        let client = Client::new();
        let store = ElasticsearchLogStore::new(client, "http://localhost:9200");
        let timestamp = DateTime::parse_from_rfc3339("2026-07-28T10:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(store.index_for(timestamp), "sql-audit-2026.07.28");
    }
}
