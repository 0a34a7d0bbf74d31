//! Audit event model, audit checker bank (spec §4.9), and pluggable
//! audit-event sinks (spec §4.8). Depends on `sqlguard-core` only for shared
//! types (`RiskLevel`, `SqlCommandType`, `ValidationResult`) — the audit path
//! runs asynchronously and never calls back into the synchronous validator.

pub mod checkers;
pub mod error;
pub mod event;
pub mod writer;

pub use checkers::{AuditChecker, AuditCheckerBank};
pub use error::{AuditError, Result};
pub use event::{AuditEvent, AuditReport, CheckerResult, RiskScore, ViolationsPayload};
pub use writer::{AuditEventWriter, FileAuditWriter, SyslogAuditWriter};
