//! Audit Pipeline (spec §4.10): broker ingress, a bounded worker pool, and
//! the checkpoint/dead-letter machinery that makes the whole thing
//! restartable at-least-once.
//!
//! This crate never calls back into `sqlguard-core`'s synchronous validator;
//! it only consumes the `AuditEvent`/`AuditReport` types from
//! `sqlguard-audit` and the storage traits from `sqlguard-storage`.

pub mod checkpoint;
pub mod dlq;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod transport;
pub mod worker;
pub mod writer;

pub use checkpoint::{CheckpointState, CheckpointStore, InMemoryCheckpointStore, PostgresCheckpointStore};
pub use dlq::{BrokerDeadLetterQueue, DeadLetter, DeadLetterQueue, InMemoryDeadLetterQueue};
pub use error::{PipelineError, Result};
pub use metrics::{PipelineMetrics, PipelineMetricsSnapshot, WorkerMetrics};
pub use pipeline::AuditPipeline;
pub use transport::{DeliveredEvent, EventTransport, InMemoryTransport, KafkaTransport};
pub use worker::{AuditWorkerPool, WorkerPoolConfig};
pub use writer::BrokerAuditWriter;
