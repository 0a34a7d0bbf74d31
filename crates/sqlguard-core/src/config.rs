//! Per-checker runtime configuration (spec §3 "CheckerConfig", §5 policy).
//!
//! `CheckerConfig` is shared, read-mostly state. Updates swap the entire
//! value atomically (copy-on-write); checkers read a snapshot at the start
//! of each validation rather than locking per-field.

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A single whitelist/denylist rule entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEntry {
    pub rule_id: String,
    pub pattern: String,
    pub reason: String,
}

/// Runtime configuration for one checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckerConfig {
    pub checker_id: String,
    pub enabled: bool,
    pub thresholds: BTreeMap<String, String>,
    pub whitelist: Vec<RuleEntry>,
}

impl CheckerConfig {
    #[must_use]
    pub fn enabled(checker_id: impl Into<String>) -> Self {
        Self {
            checker_id: checker_id.into(),
            enabled: true,
            thresholds: BTreeMap::new(),
            whitelist: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.thresholds.insert(key.into(), value.into());
        self
    }

    /// Parse a threshold as `T`, falling back to `default` when absent or
    /// unparseable (a malformed config value must never panic the hot path).
    #[must_use]
    pub fn threshold_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.thresholds.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    #[must_use]
    pub fn threshold_flag(&self, key: &str, default: bool) -> bool {
        self.thresholds.get(key).map(|v| v == "true").unwrap_or(default)
    }
}

/// Full set of checker configurations, addressable by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckerConfigSet {
    configs: BTreeMap<String, CheckerConfig>,
}

impl CheckerConfigSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, config: CheckerConfig) {
        self.configs.insert(config.checker_id.clone(), config);
    }

    #[must_use]
    pub fn get(&self, checker_id: &str) -> Option<&CheckerConfig> {
        self.configs.get(checker_id)
    }

    #[must_use]
    pub fn is_enabled(&self, checker_id: &str) -> bool {
        self.configs.get(checker_id).is_none_or(|c| c.enabled)
    }
}

/// Shared, hot-reloadable configuration.
///
/// Updates are published wholesale through a `watch` channel — callers that
/// need the current snapshot call [`CheckerConfigStore::snapshot`], which
/// never blocks on a writer mid-update (copy-on-write, per spec §5).
#[derive(Clone)]
pub struct CheckerConfigStore {
    tx: watch::Sender<Arc<CheckerConfigSet>>,
}

impl CheckerConfigStore {
    #[must_use]
    pub fn new(initial: CheckerConfigSet) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx }
    }

    /// Current configuration snapshot. Cheap: an `Arc` clone.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CheckerConfigSet> {
        self.tx.borrow().clone()
    }

    /// Atomically replace the whole configuration set.
    pub fn replace(&self, new_config: CheckerConfigSet) {
        let _ = self.tx.send(Arc::new(new_config));
    }

    /// A receiver that observes every future `replace` call, for components
    /// (e.g. the audit pipeline) that want to react to config changes
    /// rather than poll.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<CheckerConfigSet>> {
        self.tx.subscribe()
    }
}

impl Default for CheckerConfigStore {
    fn default() -> Self {
        Self::new(CheckerConfigSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_or_falls_back_on_missing_or_bad_value() {
        let config = CheckerConfig::enabled("DeepPagination").with_threshold("max_offset", "not-a-number");
        assert_eq!(config.threshold_or::<u64>("max_offset", 5000), 5000);
        assert_eq!(config.threshold_or::<u64>("missing", 42), 42);
    }

    #[test]
    fn unconfigured_checker_defaults_to_enabled() {
        let set = CheckerConfigSet::new();
        assert!(set.is_enabled("NoWhereClause"));
    }

    #[test]
    fn store_replace_is_visible_to_new_snapshots() {
        let store = CheckerConfigStore::default();
        assert!(store.snapshot().is_enabled("NoWhereClause"));

        let mut updated = CheckerConfigSet::new();
        let mut disabled = CheckerConfig::enabled("NoWhereClause");
        disabled.enabled = false;
        updated.insert(disabled);
        store.replace(updated);

        assert!(!store.snapshot().is_enabled("NoWhereClause"));
    }
}
