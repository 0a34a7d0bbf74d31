//! Error types for the broker/worker tier.

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("broker transport error: {0}")]
    Transport(String),

    #[error("checkpoint store error: {0}")]
    Checkpoint(String),

    #[error("dead-letter queue error: {0}")]
    DeadLetter(String),

    #[error("worker pool already running")]
    AlreadyRunning,

    #[error("shutdown deadline exceeded with work still in flight")]
    ShutdownDeadlineExceeded,

    #[error(transparent)]
    Audit(#[from] sqlguard_audit::error::AuditError),

    #[error(transparent)]
    Storage(#[from] sqlguard_storage::error::StorageError),

    #[error("failed to (de)serialize pipeline message: {0}")]
    Codec(#[from] serde_json::Error),
}

impl PipelineError {
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "pipeline_transport_error",
            Self::Checkpoint(_) => "pipeline_checkpoint_error",
            Self::DeadLetter(_) => "pipeline_dead_letter_error",
            Self::AlreadyRunning => "pipeline_already_running",
            Self::ShutdownDeadlineExceeded => "pipeline_shutdown_deadline_exceeded",
            Self::Audit(_) => "pipeline_audit_error",
            Self::Storage(_) => "pipeline_storage_error",
            Self::Codec(_) => "pipeline_codec_error",
        }
    }
}

impl From<rdkafka::error::KafkaError> for PipelineError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        Self::Checkpoint(err.to_string())
    }
}
