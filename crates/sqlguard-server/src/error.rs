//! Error type for the server binary's own wiring concerns. Collaborator
//! errors (storage, pipeline, audit) are wrapped rather than flattened so the
//! originating layer stays visible in logs.

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] sqlguard_storage::StorageError),

    #[error(transparent)]
    Pipeline(#[from] sqlguard_pipeline::PipelineError),

    #[error("retention schedule error: {0}")]
    Retention(#[from] cron::error::Error),
}
