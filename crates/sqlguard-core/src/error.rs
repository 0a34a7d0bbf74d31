//! Error types for the validation engine.

/// Result type for core validation operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the prevention-layer pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    /// SQL failed to parse. Position is best-effort: not every dialect error
    /// carries a usable location.
    #[error("failed to parse SQL: {message}")]
    ParseError {
        message: String,
        position: Option<usize>,
    },

    /// The validator rejected the statement under `ViolationStrategy::Block`.
    #[error("validation blocked: {}", summarize(.violations))]
    ValidationBlocked { violations: Vec<crate::result::Violation> },

    /// `CheckerConfig` failed to validate (unknown checker id, malformed
    /// threshold value, etc).
    #[error("invalid checker configuration: {0}")]
    ConfigInvalid(String),
}

fn summarize(violations: &[crate::result::Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}[{}]", v.checker_id, v.level))
        .collect::<Vec<_>>()
        .join(", ")
}

impl CoreError {
    /// Stable machine-readable error code, for dashboards and alerting.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "parse_error",
            Self::ValidationBlocked { .. } => "validation_blocked",
            Self::ConfigInvalid(_) => "config_invalid",
        }
    }
}
