//! `StorageMode` (spec §4.11): selects the metadata-store + log-store pair.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::{mysql::MySqlPoolOptions, postgres::PgPoolOptions, sqlite::SqlitePoolOptions};

use crate::{
    error::{Result, StorageError},
    log_store::{ClickHouseLogStore, ElasticsearchLogStore, LogStore, MySqlLogStore, PostgresLogStore, SqliteLogStore},
    metadata::{MetadataStore, MySqlMetadataStore, PostgresMetadataStore, SqliteMetadataStore},
};

/// Exactly one metadata adapter and one log adapter are active at a time;
/// the adapter interface is identical across modes (spec §4.11
/// "Selection").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageMode {
    /// MySQL metadata + Elasticsearch log store.
    MysqlEs,
    /// MySQL for both metadata and log (smaller deployments).
    MysqlOnly,
    /// PostgreSQL metadata + ClickHouse log store (the production default).
    #[serde(rename = "full")]
    FullPgClickhouse,
    /// PostgreSQL for both metadata and log.
    #[serde(rename = "postgresql-only")]
    PgOnly,
    /// SQLite for both — single-process/dev deployments.
    Sqlite,
    /// Elasticsearch for both metadata and log.
    #[serde(rename = "elasticsearch")]
    EsOnly,
}

impl StorageMode {
    #[must_use]
    pub const fn uses_clickhouse_log_store(self) -> bool {
        matches!(self, Self::FullPgClickhouse)
    }

    #[must_use]
    pub const fn uses_elasticsearch_log_store(self) -> bool {
        matches!(self, Self::MysqlEs | Self::EsOnly)
    }

    #[must_use]
    pub const fn uses_sqlite(self) -> bool {
        matches!(self, Self::Sqlite)
    }

    #[must_use]
    pub const fn uses_mysql(self) -> bool {
        matches!(self, Self::MysqlEs | Self::MysqlOnly)
    }
}

/// Connection strings for every backend a [`StorageMode`] might select.
/// Only the fields the active mode actually needs must be populated; unused
/// ones are ignored (spec §4.11 "exactly one metadata adapter and one log
/// adapter are active").
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    pub mode: Option<StorageMode>,
    pub postgres_url: Option<String>,
    pub mysql_url: Option<String>,
    pub sqlite_path: Option<String>,
    pub clickhouse_url: Option<String>,
    pub elasticsearch_url: Option<String>,
}

fn required(value: &Option<String>, field: &str) -> Result<String> {
    value.clone().ok_or_else(|| StorageError::UnsupportedMode(format!("storage mode requires `{field}` to be configured")))
}

/// Build the (metadata, log) adapter pair for `mode`, running each adapter's
/// schema migration before returning it. Exactly one branch of this match
/// runs per process, matching spec §4.11's "single runtime flag" selection.
pub async fn build(mode: StorageMode, config: &StorageConfig) -> Result<(Arc<dyn MetadataStore>, Arc<dyn LogStore>)> {
    match mode {
        StorageMode::FullPgClickhouse | StorageMode::PgOnly => {
            let pg_url = required(&config.postgres_url, "postgres_url")?;
            let pool = PgPoolOptions::new().max_connections(10).connect(&pg_url).await?;
            let metadata = PostgresMetadataStore::new(pool.clone());
            metadata.migrate().await?;

            let log_store: Arc<dyn LogStore> = if mode.uses_clickhouse_log_store() {
                let ch_url = required(&config.clickhouse_url, "clickhouse_url")?;
                let client = clickhouse::Client::default().with_url(ch_url);
                Arc::new(ClickHouseLogStore::new(client))
            } else {
                let log_store = PostgresLogStore::new(pool);
                log_store.migrate().await?;
                Arc::new(log_store)
            };
            Ok((Arc::new(metadata), log_store))
        },
        StorageMode::MysqlEs | StorageMode::MysqlOnly => {
            let mysql_url = required(&config.mysql_url, "mysql_url")?;
            let pool = MySqlPoolOptions::new().max_connections(10).connect(&mysql_url).await?;
            let metadata = MySqlMetadataStore::new(pool.clone());
            metadata.migrate().await?;

            let log_store: Arc<dyn LogStore> = if mode.uses_elasticsearch_log_store() {
                let es_url = required(&config.elasticsearch_url, "elasticsearch_url")?;
                Arc::new(ElasticsearchLogStore::new(reqwest::Client::new(), es_url))
            } else {
                let log_store = MySqlLogStore::new(pool);
                log_store.migrate().await?;
                Arc::new(log_store)
            };
            Ok((Arc::new(metadata), log_store))
        },
        StorageMode::Sqlite => {
            let path = required(&config.sqlite_path, "sqlite_path")?;
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&format!("sqlite://{path}?mode=rwc"))
                .await?;
            let metadata = SqliteMetadataStore::new(pool.clone());
            metadata.migrate().await?;
            let log_store = SqliteLogStore::new(pool);
            log_store.migrate().await?;
            Ok((Arc::new(metadata), Arc::new(log_store)))
        },
        StorageMode::EsOnly => {
            let es_url = required(&config.elasticsearch_url, "elasticsearch_url")?;
            Err(StorageError::UnsupportedMode(format!(
                "elasticsearch-only mode has no relational metadata backend yet; point audit.storage.mode at mysql-es or full instead (elasticsearch_url={es_url} noted for when one ships)"
            )))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_strings_match_documented_values() {
        let cases = [
            (StorageMode::MysqlEs, "\"mysql-es\""),
            (StorageMode::MysqlOnly, "\"mysql-only\""),
            (StorageMode::FullPgClickhouse, "\"full\""),
            (StorageMode::PgOnly, "\"postgresql-only\""),
            (StorageMode::Sqlite, "\"sqlite\""),
            (StorageMode::EsOnly, "\"elasticsearch\""),
        ];
        for (mode, expected) in cases {
            assert_eq!(serde_json::to_string(&mode).unwrap(), expected);
            let round_tripped: StorageMode = serde_json::from_str(expected).unwrap();
            assert_eq!(round_tripped, mode);
        }
    }

    #[test]
    fn log_store_backend_selection_is_mutually_exclusive() {
        assert!(StorageMode::FullPgClickhouse.uses_clickhouse_log_store());
        assert!(!StorageMode::FullPgClickhouse.uses_elasticsearch_log_store());
        assert!(StorageMode::MysqlEs.uses_elasticsearch_log_store());
        assert!(StorageMode::EsOnly.uses_elasticsearch_log_store());
        assert!(StorageMode::Sqlite.uses_sqlite());
        assert!(!StorageMode::PgOnly.uses_sqlite());
        assert!(StorageMode::MysqlOnly.uses_mysql());
        assert!(!StorageMode::PgOnly.uses_mysql());
    }

    #[tokio::test]
    async fn build_rejects_sqlite_mode_with_no_path_configured() {
        let err = build(StorageMode::Sqlite, &StorageConfig::default()).await.unwrap_err();
        assert!(matches!(err, StorageError::UnsupportedMode(_)));
    }

    #[tokio::test]
    async fn build_wires_up_sqlite_mode_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlguard.db");
        let config = StorageConfig { sqlite_path: Some(path.to_string_lossy().to_string()), ..Default::default() };
        let (metadata, log_store) = build(StorageMode::Sqlite, &config).await.unwrap();

        let now = chrono::Utc::now();
        assert_eq!(log_store.count_by_time_range(now - chrono::Duration::hours(1), now + chrono::Duration::hours(1)).await.unwrap(), 0);
        assert!(metadata.find_by_sql_id("nonexistent").await.unwrap().is_empty());
    }
}
