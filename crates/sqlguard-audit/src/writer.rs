//! Audit Event Writer (spec §4.8): `write`/`write_batch` that never
//! propagates into the execution path.
//!
//! Local append-only and syslog sinks are provided here; the broker-producer
//! sink lives in `sqlguard-pipeline` (it needs `rdkafka`, which this crate
//! does not depend on).

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::{
    io::AsyncWriteExt,
    net::UdpSocket,
    sync::Mutex,
};
use tracing::warn;

use crate::{
    error::{AuditError, Result},
    event::AuditEvent,
};

#[async_trait]
pub trait AuditEventWriter: Send + Sync {
    async fn write(&self, event: &AuditEvent) -> Result<()>;

    /// Default: sequential `write`. Sinks with a genuine bulk API (the
    /// broker producer, a search-index bulk endpoint) override this.
    async fn write_batch(&self, events: &[AuditEvent]) -> Result<()> {
        for event in events {
            self.write(event).await?;
        }
        Ok(())
    }
}

/// Local append-only JSON-lines writer — the fallback sink when the broker
/// is unreachable, and a reasonable default for local development.
pub struct FileAuditWriter {
    path: PathBuf,
    file: Mutex<Option<tokio::fs::File>>,
}

impl FileAuditWriter {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), file: Mutex::new(None) }
    }

    async fn open(&self) -> std::io::Result<tokio::fs::File> {
        tokio::fs::OpenOptions::new().create(true).append(true).open(&self.path).await
    }
}

#[async_trait]
impl AuditEventWriter for FileAuditWriter {
    async fn write(&self, event: &AuditEvent) -> Result<()> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        let mut guard = self.file.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await.map_err(|e| AuditError::WriteFailed(e.to_string()))?);
        }
        let file = guard.as_mut().expect("populated above");
        file.write_all(&line).await.map_err(|e| AuditError::WriteFailed(e.to_string()))?;
        file.flush().await.map_err(|e| AuditError::WriteFailed(e.to_string()))
    }
}

/// Fire-and-forget UDP syslog sink (RFC 3164-style), for operators who
/// already centralize logs through syslog rather than a dedicated broker.
pub struct SyslogAuditWriter {
    socket: UdpSocket,
    target: String,
    facility_severity: u8,
}

impl SyslogAuditWriter {
    /// `target` is a `host:port` syslog receiver address.
    pub async fn connect(target: impl Into<String>) -> Result<Self> {
        let target = target.into();
        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(|e| AuditError::WriteFailed(e.to_string()))?;
        socket.connect(&target).await.map_err(|e| AuditError::WriteFailed(e.to_string()))?;
        // facility = local0 (16), severity = info (6): (16 * 8) + 6 = 134.
        Ok(Self { socket, target, facility_severity: 134 })
    }
}

#[async_trait]
impl AuditEventWriter for SyslogAuditWriter {
    async fn write(&self, event: &AuditEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let message = format!("<{}>1 {} sqlguard audit - - {payload}", self.facility_severity, event.timestamp.to_rfc3339());
        if let Err(err) = self.socket.send(message.as_bytes()).await {
            warn!(target = %self.target, error = %err, "syslog audit sink write failed");
            return Err(AuditError::WriteFailed(err.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlguard_core::SqlCommandType;

    #[tokio::test]
    async fn file_writer_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let writer = FileAuditWriter::new(&path);

        let event = AuditEvent::new("SELECT 1", SqlCommandType::Select, "site:1", "ds", Utc::now());
        writer.write(&event).await.unwrap();
        writer.write(&event).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
