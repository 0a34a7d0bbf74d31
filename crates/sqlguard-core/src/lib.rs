//! Prevention-layer SQL validation: parse once, cache the AST, run a bank of
//! stateless checkers, and return a deterministic [`result::ValidationResult`].
//!
//! This crate is the hot-path half of the platform — it must never block on
//! I/O. Everything async (the audit pipeline, storage) lives in sibling
//! crates that depend on this one for [`context::SqlContext`] and
//! [`result::Violation`].

pub mod adapter;
pub mod checkers;
pub mod config;
pub mod context;
pub mod dedup;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod parser;
pub mod result;
pub mod visitor;

pub use adapter::{PendingResultGuard, ValidationBlockedError, ViolationStrategy};
pub use checkers::{Checker, CheckerBank};
pub use config::{CheckerConfig, CheckerConfigSet, CheckerConfigStore};
pub use context::{ExecutionLayer, RowBounds, SqlCommandType, SqlContext};
pub use dialect::{Dialect, DialectAdapter, RewriteOutcome};
pub use engine::ValidationEngine;
pub use error::{CoreError, Result};
pub use parser::{CacheStats, ParserCache, StatementHandle};
pub use result::{RiskLevel, ValidationResult, Violation};
pub use visitor::{dispatch, StatementVisitor};
