use courier_common::error::AppError;
use thiserror::Error;

/// One field that failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every problem found while validating a set of raw sender properties.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("Unknown sender type '{0}'")]
    UnknownSenderType(String),

    #[error("Protocol '{protocol}' is not supported by channel type {channel_type}")]
    UnsupportedProtocol {
        channel_type: String,
        protocol: String,
    },

    #[error("Channel type {0} requires a 'protocol' property")]
    ProtocolRequired(String),

    #[error("Properties must be a JSON object")]
    NotAnObject,

    #[error("{}", join_violations(.0))]
    Fields(Vec<FieldViolation>),
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConfigValidationError {
    /// The individual field problems, empty for structural errors.
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            ConfigValidationError::Fields(violations) => violations,
            _ => &[],
        }
    }
}

/// Errors surfaced by the notifier crate outside of `MessageResponse`.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Invalid sender configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    #[error("Failed to build sender: {0}")]
    Build(String),

    #[error("Rate limiter error: {0}")]
    RateLimiter(#[from] redis::RedisError),

    #[error("{0}")]
    Validation(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),
}

impl From<NotifierError> for AppError {
    fn from(err: NotifierError) -> Self {
        match err {
            NotifierError::InvalidConfig(e) => AppError::Validation(e.to_string()),
            NotifierError::Validation(msg) => AppError::Validation(msg),
            NotifierError::Build(msg) => AppError::Internal(msg),
            NotifierError::RateLimiter(e) => AppError::Redis(e),
            NotifierError::RateLimited(msg) => AppError::RateLimited(msg),
        }
    }
}
