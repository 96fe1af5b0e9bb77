use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Invalid lease token")]
    InvalidLeaseToken,

    #[error("Lease has expired")]
    LeaseExpired,

    #[error("Job is already in terminal state")]
    JobAlreadyTerminal,

    #[error("Job execution failed: {0}")]
    JobFailed(#[from] JobError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Job type not registered: {0}")]
    JobTypeNotRegistered(String),

    #[error("Worker shutdown")]
    WorkerShutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Message fragments that mark a failure as permanent.
///
/// Matching is a case-sensitive substring test, kept for errors that only
/// reach the queue as free text.
pub const PERMANENT_PATTERNS: [&str; 4] = [
    "not found",
    "invalid id",
    "unauthorized",
    "permission denied",
];

/// Job execution outcome - determines retry behavior
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// Retryable error - will schedule retry if attempts remain
    #[error("Retryable error: {0}")]
    Retryable(String),

    /// Permanent error - fail immediately, no retry
    #[error("Permanent error: {0}")]
    Permanent(String),
}

/// Retry class of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Permanent,
    Transient,
}

impl ErrorClass {
    /// Classify a free-text failure message.
    pub fn of_message(message: &str) -> Self {
        if PERMANENT_PATTERNS.iter().any(|p| message.contains(p)) {
            Self::Permanent
        } else {
            Self::Transient
        }
    }
}

impl JobError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Build an error whose class is inferred from its message text
    pub fn from_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        match ErrorClass::of_message(&msg) {
            ErrorClass::Permanent => Self::Permanent(msg),
            ErrorClass::Transient => Self::Retryable(msg),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Retryable(_) => ErrorClass::Transient,
            Self::Permanent(_) => ErrorClass::Permanent,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
