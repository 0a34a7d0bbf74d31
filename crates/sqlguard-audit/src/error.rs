//! Error types for the audit model and its sinks.

pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("failed to encode audit event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("audit sink write failed: {0}")]
    WriteFailed(String),

    #[error("audit sink is degraded and spooling to disk: {0}")]
    Degraded(String),
}

impl AuditError {
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Encode(_) => "audit_encode_error",
            Self::WriteFailed(_) => "audit_write_failed",
            Self::Degraded(_) => "audit_sink_degraded",
        }
    }
}
