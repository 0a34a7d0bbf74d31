//! Error types for the storage tier.

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage query failed: {0}")]
    QueryFailed(String),

    #[error("storage write failed: {0}")]
    WriteFailed(String),

    #[error("failed to (de)serialize stored record: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unsupported storage mode configuration: {0}")]
    UnsupportedMode(String),
}

impl StorageError {
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "storage_unavailable",
            Self::QueryFailed(_) => "storage_query_failed",
            Self::WriteFailed(_) => "storage_write_failed",
            Self::Codec(_) => "storage_codec_error",
            Self::UnsupportedMode(_) => "storage_unsupported_mode",
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        Self::QueryFailed(err.to_string())
    }
}

impl From<clickhouse::error::Error> for StorageError {
    fn from(err: clickhouse::error::Error) -> Self {
        Self::QueryFailed(err.to_string())
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        Self::QueryFailed(err.to_string())
    }
}
