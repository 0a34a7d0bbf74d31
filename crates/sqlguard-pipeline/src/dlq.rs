//! Dead-letter queue for events that exhaust every checker-processing retry
//! (spec §4.10: errors are "re-queued or dead-lettered per policy").

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlguard_audit::AuditEvent;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub event: AuditEvent,
    pub reason: String,
    pub attempts: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeadLetterQueue: Send + Sync {
    async fn push(&self, event: AuditEvent, reason: String, attempts: u32) -> Result<()>;
    async fn drain(&self) -> Result<Vec<DeadLetter>>;
    async fn len(&self) -> Result<usize>;
}

/// In-memory dead-letter queue. Adequate for single-process deployments and
/// tests; production deployments should back this with the broker's own DLQ
/// topic via [`BrokerDeadLetterQueue`] instead.
#[derive(Default)]
pub struct InMemoryDeadLetterQueue {
    entries: Mutex<Vec<DeadLetter>>,
}

impl InMemoryDeadLetterQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterQueue for InMemoryDeadLetterQueue {
    async fn push(&self, event: AuditEvent, reason: String, attempts: u32) -> Result<()> {
        self.entries.lock().unwrap().push(DeadLetter { event, reason, attempts, dead_lettered_at: Utc::now() });
        Ok(())
    }

    async fn drain(&self) -> Result<Vec<DeadLetter>> {
        Ok(std::mem::take(&mut *self.entries.lock().unwrap()))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.lock().unwrap().len())
    }
}

/// Publishes dead letters onto a dedicated broker topic rather than holding
/// them in process memory, so they survive a pipeline restart.
pub struct BrokerDeadLetterQueue {
    transport: std::sync::Arc<dyn crate::transport::EventTransport>,
}

impl BrokerDeadLetterQueue {
    #[must_use]
    pub fn new(transport: std::sync::Arc<dyn crate::transport::EventTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl DeadLetterQueue for BrokerDeadLetterQueue {
    async fn push(&self, event: AuditEvent, reason: String, attempts: u32) -> Result<()> {
        tracing::warn!(sql_id = %event.sql_id, reason = %reason, attempts, "dead-lettering audit event");
        self.transport.publish(&event).await
    }

    async fn drain(&self) -> Result<Vec<DeadLetter>> {
        // The broker-backed queue is consumed by a separate operator
        // tool/topic reader, not by this process; draining in place would
        // require a second consumer group and is out of scope here.
        Ok(Vec::new())
    }

    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use sqlguard_core::SqlCommandType;

    use super::*;

    #[tokio::test]
    async fn in_memory_dlq_accumulates_and_drains() {
        let dlq = InMemoryDeadLetterQueue::new();
        let event = AuditEvent::new("SELECT 1", SqlCommandType::Select, "site:1", "ds", Utc::now());
        dlq.push(event, "checker panicked".to_string(), 3).await.unwrap();
        assert_eq!(dlq.len().await.unwrap(), 1);
        let drained = dlq.drain().await.unwrap();
        assert_eq!(drained.len(), 1);
        assert_eq!(dlq.len().await.unwrap(), 0);
    }
}
