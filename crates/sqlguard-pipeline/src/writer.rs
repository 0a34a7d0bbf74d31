//! Broker-backed `AuditEventWriter` (spec §4.8). `sqlguard-audit` ships the
//! file and syslog sinks directly; this one is kept here instead so that
//! crate doesn't need to depend on `rdkafka`.

use std::sync::Arc;

use async_trait::async_trait;
use sqlguard_audit::{error::AuditError, event::AuditEvent, writer::AuditEventWriter};

use crate::transport::EventTransport;

pub struct BrokerAuditWriter {
    transport: Arc<dyn EventTransport>,
}

impl BrokerAuditWriter {
    #[must_use]
    pub fn new(transport: Arc<dyn EventTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl AuditEventWriter for BrokerAuditWriter {
    async fn write(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.transport.publish(event).await.map_err(|err| AuditError::WriteFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sqlguard_core::SqlCommandType;

    use super::*;
    use crate::transport::InMemoryTransport;

    #[tokio::test]
    async fn write_publishes_onto_the_transport() {
        let transport = Arc::new(InMemoryTransport::new());
        let writer = BrokerAuditWriter::new(transport.clone());
        let event = AuditEvent::new("SELECT 1", SqlCommandType::Select, "site:1", "ds", Utc::now());
        writer.write(&event).await.unwrap();
        let delivered = transport.recv().await.unwrap();
        assert_eq!(delivered.event.sql_id, event.sql_id);
    }
}
