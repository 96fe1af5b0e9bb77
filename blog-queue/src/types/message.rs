use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobPriority;
use crate::retry::DEFAULT_MAX_RETRIES;

/// Job message - immutable submission data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMessage {
    /// Job type identifier for dispatch
    pub job_type: String,

    /// JSON-encoded job payload
    pub payload: Vec<u8>,

    /// Target queue name
    pub queue: String,

    pub priority: JobPriority,

    /// Retries allowed after the first execution
    pub max_retries: u32,

    /// When the job first becomes eligible for processing
    pub run_at: DateTime<Utc>,
}

impl JobMessage {
    pub fn new(job_type: impl Into<String>, payload: Vec<u8>, queue: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            queue: queue.into(),
            priority: JobPriority::default(),
            max_retries: DEFAULT_MAX_RETRIES,
            run_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay the first execution
    pub fn with_run_at(mut self, run_at: DateTime<Utc>) -> Self {
        self.run_at = run_at;
        self
    }
}
