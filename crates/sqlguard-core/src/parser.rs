//! SQL Parser Facade + LRU cache (spec §4.1).
//!
//! Parses raw SQL once per normalized text and memoizes the resulting AST.
//! Concurrent `parse_cached` calls for the same key share one parse: the
//! first caller to register an in-flight slot does the parsing, the rest
//! block on [`std::sync::OnceLock`] and clone the winner's result.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use parking_lot::Mutex;
use sqlparser::{ast::Statement, dialect::GenericDialect, parser::Parser};

use crate::{
    context::normalize_for_hash,
    error::{CoreError, Result},
};

/// The statements produced by parsing one piece of SQL text.
///
/// Multiple top-level statements mean the text contained `;`-separated
/// statements — exactly what `MultiStatement` (spec §4.4) looks for.
#[derive(Debug)]
pub struct ParsedStatement {
    pub statements: Vec<Statement>,
}

impl ParsedStatement {
    #[must_use]
    pub fn is_multi_statement(&self) -> bool {
        self.statements.len() > 1
    }

    #[must_use]
    pub fn first(&self) -> Option<&Statement> {
        self.statements.first()
    }
}

/// Shared, read-only handle into the parser cache.
///
/// Cloning is cheap (`Arc` bump); equality is reference equality within the
/// cache's lifetime, matching spec invariant I2
/// (`parseCached(sql) == parseCached(sql)`).
#[derive(Debug, Clone)]
pub struct StatementHandle(Arc<ParsedStatement>);

impl StatementHandle {
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.0.statements
    }

    #[must_use]
    pub fn is_multi_statement(&self) -> bool {
        self.0.is_multi_statement()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Statement> {
        self.0.first()
    }
}

impl PartialEq for StatementHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Point-in-time snapshot of cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

impl CacheStats {
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

type ParseOutcome = std::result::Result<StatementHandle, CoreError>;

/// Bounded, thread-safe, LRU-evicted cache of parsed statements.
pub struct ParserCache {
    entries: Mutex<lru::LruCache<String, StatementHandle>>,
    in_flight: DashMap<String, Arc<OnceLock<ParseOutcome>>>,
    hits: std::sync::atomic::AtomicU64,
    misses: std::sync::atomic::AtomicU64,
}

impl ParserCache {
    /// Create a cache with the given capacity (spec default ~1000 entries).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = std::num::NonZeroUsize::new(capacity.max(1))
            .unwrap_or(std::num::NonZeroUsize::new(1).expect("1 is nonzero"));
        Self {
            entries: Mutex::new(lru::LruCache::new(capacity)),
            in_flight: DashMap::new(),
            hits: std::sync::atomic::AtomicU64::new(0),
            misses: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Parse `sql`, or return the cached handle if this normalized text was
    /// seen before. Parse errors are never cached (spec §4.1).
    pub fn parse_cached(&self, sql: &str) -> Result<StatementHandle> {
        let key = normalize_for_hash(sql);

        if let Some(handle) = self.entries.lock().get(&key).cloned() {
            self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Ok(handle);
        }
        self.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let slot = self
            .in_flight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(OnceLock::new()))
            .clone();

        let outcome = slot.get_or_init(|| Self::parse_sql(sql)).clone();
        self.in_flight.remove(&key);

        match outcome {
            Ok(handle) => {
                self.entries.lock().put(key, handle.clone());
                Ok(handle)
            },
            Err(err) => Err(err),
        }
    }

    fn parse_sql(sql: &str) -> ParseOutcome {
        let dialect = GenericDialect {};
        Parser::parse_sql(&dialect, sql)
            .map(|statements| StatementHandle(Arc::new(ParsedStatement { statements })))
            .map_err(|err| CoreError::ParseError {
                message: err.to_string(),
                position: None,
            })
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(std::sync::atomic::Ordering::Relaxed),
            misses: self.misses.load(std::sync::atomic::Ordering::Relaxed),
            size: self.entries.lock().len(),
        }
    }

    /// Drop all cached entries. Outstanding [`StatementHandle`] clones held
    /// by callers remain valid (they own their own `Arc`).
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for ParserCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;

    #[test]
    fn parses_and_caches() {
        let cache = ParserCache::new(10);
        let h1 = cache.parse_cached("SELECT * FROM users").unwrap();
        let h2 = cache.parse_cached("select * from users").unwrap();
        assert_eq!(h1, h2, "normalized-identical SQL shares the cached handle");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn parse_error_is_not_cached() {
        let cache = ParserCache::new(10);
        assert!(cache.parse_cached("SELEKT GARBAGE FROM").is_err());
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn detects_multi_statement() {
        let cache = ParserCache::new(10);
        let handle = cache.parse_cached("SELECT 1; SELECT 2;").unwrap();
        assert!(handle.is_multi_statement());
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = ParserCache::new(2);
        cache.parse_cached("SELECT 1").unwrap();
        cache.parse_cached("SELECT 2").unwrap();
        cache.parse_cached("SELECT 3").unwrap();
        assert_eq!(cache.stats().size, 2);
    }

    #[test]
    fn concurrent_parse_of_same_key_shares_one_result() {
        let cache = Arc::new(ParserCache::new(10));
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                cache.parse_cached("SELECT * FROM accounts WHERE id = 1").unwrap()
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for pair in results.windows(2) {
            assert_eq!(pair[0], pair[1], "all concurrent callers observe the same parse");
        }
    }
}
