//! Hierarchical process configuration (spec §6 "Configuration"), loaded from
//! a TOML file with `${VAR}`-style environment variable expansion — the
//! same shape the teacher's config module uses, generalized to this
//! platform's keys.

use std::{collections::BTreeMap, path::Path, sync::LazyLock};

use serde::{Deserialize, Serialize};
use sqlguard_core::{CheckerConfig, CheckerConfigSet, ViolationStrategy};
use sqlguard_storage::{StorageConfig, StorageMode};

use crate::error::{Result, ServerError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SqlGuardConfig {
    #[serde(rename = "sql-guard")]
    pub prevention: PreventionConfig,
    pub audit: AuditConfig,
}

impl Default for SqlGuardConfig {
    fn default() -> Self {
        Self { prevention: PreventionConfig::default(), audit: AuditConfig::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PreventionConfig {
    pub enabled: bool,
    pub active_strategy: ViolationStrategy,
    pub parser: ParserSettings,
    pub dedup: DedupSettings,
    pub checkers: BTreeMap<String, CheckerSettings>,
}

impl Default for PreventionConfig {
    fn default() -> Self {
        Self { enabled: true, active_strategy: ViolationStrategy::Warn, parser: ParserSettings::default(), dedup: DedupSettings::default(), checkers: BTreeMap::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ParserSettings {
    pub cache_size: usize,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self { cache_size: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DedupSettings {
    pub window_size: usize,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self { window_size: 256 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CheckerSettings {
    pub enabled: Option<bool>,
    pub thresholds: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AuditConfig {
    pub storage: StorageSettings,
    pub broker: BrokerSettings,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { storage: StorageSettings::default(), broker: BrokerSettings::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageSettings {
    pub mode: StorageMode,
    pub retention_days: i64,
    pub retention: RetentionSettings,
    pub postgres_url: Option<String>,
    pub mysql_url: Option<String>,
    pub sqlite_path: Option<String>,
    pub clickhouse_url: Option<String>,
    pub elasticsearch_url: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            mode: StorageMode::Sqlite,
            retention_days: 90,
            retention: RetentionSettings::default(),
            postgres_url: None,
            mysql_url: None,
            sqlite_path: Some("sqlguard.db".to_string()),
            clickhouse_url: None,
            elasticsearch_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RetentionSettings {
    pub cron: String,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self { cron: "0 0 3 * * *".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BrokerSettings {
    pub brokers: String,
    pub topic: String,
    pub group: String,
    pub workers: usize,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self { brokers: "localhost:9092".to_string(), topic: "sql-audit-events".to_string(), group: "sqlguard-audit".to_string(), workers: 4 }
    }
}

impl SqlGuardConfig {
    /// Load configuration from a TOML file, expanding `${VAR}` references
    /// against the process environment first.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|err| ServerError::Config(format!("failed to read {}: {err}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|err| ServerError::Config(format!("invalid configuration: {err}")))
    }

    /// Project the `[sql-guard.checkers.*]` table into the `CheckerConfigSet`
    /// the validation engine reads snapshots from.
    #[must_use]
    pub fn to_checker_config_set(&self) -> CheckerConfigSet {
        let mut set = CheckerConfigSet::new();
        for (checker_id, settings) in &self.prevention.checkers {
            let mut config = CheckerConfig::enabled(checker_id.clone());
            config.enabled = settings.enabled.unwrap_or(true);
            config.thresholds = settings.thresholds.clone();
            set.insert(config);
        }
        set
    }

    #[must_use]
    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            mode: Some(self.audit.storage.mode),
            postgres_url: self.audit.storage.postgres_url.clone(),
            mysql_url: self.audit.storage.mysql_url.clone(),
            sqlite_path: self.audit.storage.sqlite_path.clone(),
            clickhouse_url: self.audit.storage.clickhouse_url.clone(),
            elasticsearch_url: self.audit.storage.elasticsearch_url.clone(),
        }
    }
}

/// Supports `${VAR}` syntax, same contract as the teacher's config loader.
fn expand_env_vars(content: &str) -> String {
    static ENV_VAR_REGEX: LazyLock<regex::Regex> =
        LazyLock::new(|| regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex is valid"));

    let mut result = content.to_string();
    for capture in ENV_VAR_REGEX.captures_iter(content) {
        let full_match = capture.get(0).expect("group 0 always matches").as_str();
        let var_name = capture.get(1).expect("pattern has one capture group").as_str();
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(full_match, &value);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible_for_a_single_process_deployment() {
        let config = SqlGuardConfig::default();
        assert!(config.prevention.enabled);
        assert_eq!(config.prevention.active_strategy, ViolationStrategy::Warn);
        assert_eq!(config.audit.storage.mode, StorageMode::Sqlite);
    }

    #[test]
    fn expands_env_var_references() {
        std::env::set_var("SQLGUARD_TEST_DB_URL", "postgres://example/test");
        let toml = r#"
            [audit.storage]
            mode = "postgresql-only"
            postgres-url = "${SQLGUARD_TEST_DB_URL}"
        "#;
        let config = SqlGuardConfig::from_toml(toml).unwrap();
        assert_eq!(config.audit.storage.postgres_url.as_deref(), Some("postgres://example/test"));
        std::env::remove_var("SQLGUARD_TEST_DB_URL");
    }

    #[test]
    fn checker_overrides_round_trip_into_a_checker_config_set() {
        let toml = r#"
            [sql-guard.checkers.NoWhereClause]
            enabled = true

            [sql-guard.checkers.DeepPagination]
            enabled = false
            thresholds = { max_offset = "2000" }
        "#;
        let config = SqlGuardConfig::from_toml(toml).unwrap();
        let set = config.to_checker_config_set();
        assert!(set.is_enabled("NoWhereClause"));
        assert!(!set.is_enabled("DeepPagination"));
        assert_eq!(set.get("DeepPagination").unwrap().thresholds.get("max_offset").map(String::as_str), Some("2000"));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(SqlGuardConfig::from_toml("not = [valid").is_err());
    }
}
