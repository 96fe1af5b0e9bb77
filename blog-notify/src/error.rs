use blog_queue::JobError;
use thiserror::Error;

/// Failures reaching the record store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by a mail dispatcher
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailError {
    /// Delivery may succeed later (connection reset, rate limit)
    #[error("mail delivery failed: {0}")]
    Transient(String),

    /// Delivery will never succeed (malformed address, unknown template)
    #[error("mail delivery refused: {0}")]
    Permanent(String),

    /// The dispatcher could not say which; classified from the text
    #[error("{0}")]
    Unclassified(String),
}

/// Reasons a notification job fails and goes back to the queue
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mail(#[from] MailError),

    /// The dispatcher returned `false` without an error
    #[error("mail dispatcher declined {template} for {recipient}")]
    Rejected { template: String, recipient: String },
}

impl From<NotifyError> for JobError {
    fn from(err: NotifyError) -> Self {
        let message = err.to_string();
        match err {
            NotifyError::Mail(MailError::Transient(_)) | NotifyError::Rejected { .. } => {
                JobError::retryable(message)
            }
            NotifyError::Mail(MailError::Permanent(_)) => JobError::permanent(message),
            NotifyError::Mail(MailError::Unclassified(_)) | NotifyError::Store(_) => {
                JobError::from_message(message)
            }
        }
    }
}

/// Invalid configuration values
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },
}
