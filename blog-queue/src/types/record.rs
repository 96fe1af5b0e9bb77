use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobMessage, LeaseToken};

/// Job lifecycle.
///
/// ```text
/// Pending --lease--> Running
/// Running --ok--> Succeeded
/// Running --transient, retries left--> FailedRetryable --due--> Pending
/// Running --permanent or retries exhausted--> FailedPermanent
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobState {
    /// Waiting for `next_run_at`
    Pending,

    /// Leased by a worker until `lease_until`
    Running { lease_until: DateTime<Utc> },

    Succeeded { completed_at: DateTime<Utc> },

    /// Failed, will become pending again at `retry_at`
    FailedRetryable { retry_at: DateTime<Utc>, error: String },

    /// Failed for good and handed to the dead-letter sink
    FailedPermanent { failed_at: DateTime<Utc>, error: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::FailedPermanent { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running { .. } => "running",
            Self::Succeeded { .. } => "succeeded",
            Self::FailedRetryable { .. } => "failed_retryable",
            Self::FailedPermanent { .. } => "failed_permanent",
        }
    }
}

/// Job record - mutable runtime state stored by backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,

    /// Immutable submission data
    pub message: JobMessage,

    pub state: JobState,

    /// Executions started so far (0 until first lease)
    pub attempt: u32,

    /// Earliest time the job may be leased again
    pub next_run_at: DateTime<Utc>,

    /// Enqueue order, used to break priority ties
    pub seq: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_error: Option<String>,

    /// Current lease token (if running)
    pub lease_token: Option<LeaseToken>,
}

impl JobRecord {
    pub fn new(job_id: JobId, message: JobMessage, seq: u64) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            next_run_at: message.run_at,
            message,
            state: JobState::Pending,
            attempt: 0,
            seq,
            created_at: now,
            updated_at: now,
            last_error: None,
            lease_token: None,
        }
    }

    /// Whether a worker may lease the job at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match &self.state {
            JobState::Pending => self.next_run_at <= now,
            JobState::FailedRetryable { retry_at, .. } => *retry_at <= now,
            _ => false,
        }
    }

    /// Whether a failure of the current attempt may still be retried
    pub fn has_retries_left(&self) -> bool {
        self.attempt <= self.message.max_retries
    }

    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.state, JobState::Running { lease_until } if lease_until < now)
    }

    /// Move a due retry back to pending
    pub fn promote(&mut self) {
        if let JobState::FailedRetryable { retry_at, .. } = self.state {
            self.next_run_at = retry_at;
            self.state = JobState::Pending;
            self.updated_at = Utc::now();
        }
    }

    pub fn start_running(&mut self, lease_token: LeaseToken, lease_until: DateTime<Utc>) {
        self.attempt += 1;
        self.state = JobState::Running { lease_until };
        self.lease_token = Some(lease_token);
        self.updated_at = Utc::now();
    }

    pub fn succeed(&mut self) {
        self.state = JobState::Succeeded { completed_at: Utc::now() };
        self.lease_token = None;
        self.updated_at = Utc::now();
    }

    pub fn schedule_retry(&mut self, retry_at: DateTime<Utc>, error: String) {
        self.state = JobState::FailedRetryable { retry_at, error: error.clone() };
        self.next_run_at = retry_at;
        self.last_error = Some(error);
        self.lease_token = None;
        self.updated_at = Utc::now();
    }

    pub fn fail_permanently(&mut self, error: String) {
        self.state = JobState::FailedPermanent { failed_at: Utc::now(), error: error.clone() };
        self.last_error = Some(error);
        self.lease_token = None;
        self.updated_at = Utc::now();
    }

    /// Extend or shorten the lease of a running job
    pub fn set_lease_until(&mut self, until: DateTime<Utc>) {
        if let JobState::Running { ref mut lease_until } = self.state {
            *lease_until = until;
            self.updated_at = Utc::now();
        }
    }
}

/// A job that has been leased for processing
#[derive(Debug, Clone)]
pub struct LeasedJob {
    pub record: JobRecord,

    /// Lease token for acknowledgment
    pub lease_token: LeaseToken,

    pub lease_until: DateTime<Utc>,
}

impl LeasedJob {
    pub fn job_id(&self) -> &JobId {
        &self.record.job_id
    }

    pub fn message(&self) -> &JobMessage {
        &self.record.message
    }

    pub fn attempt(&self) -> u32 {
        self.record.attempt
    }
}
