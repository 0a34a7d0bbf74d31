//! Two-tier pluggable storage for the audit pipeline (spec §4.11, §4.12).
//!
//! A [`mode::StorageMode`] selects one metadata adapter ([`metadata`]) and
//! one log adapter ([`log_store`]); the interface is the same regardless of
//! which backend is active. [`retention`] periodically prunes the log store.

pub mod error;
pub mod log_store;
pub mod metadata;
pub mod mode;
pub mod retention;

pub use error::{Result, StorageError};
pub use log_store::{ClickHouseLogStore, ElasticsearchLogStore, LogStore, MySqlLogStore, PostgresLogStore, SqliteLogStore};
pub use metadata::{MetadataStore, MySqlMetadataStore, PostgresMetadataStore, SqliteMetadataStore};
pub use mode::{build, StorageConfig, StorageMode};
pub use retention::{RetentionConfig, RetentionJob};
