//! Dead-letter sinks: where permanently failed jobs are surfaced to operators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;

use crate::{JobId, JobRecord, JobState};

/// Snapshot of a job that will never run again
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub job_id: JobId,
    pub job_type: String,
    pub queue: String,
    pub attempts: u32,
    pub error: String,
    /// Payload as stored, for manual replay
    pub payload: String,
    pub failed_at: DateTime<Utc>,
}

impl From<&JobRecord> for DeadLetter {
    fn from(record: &JobRecord) -> Self {
        let (error, failed_at) = match &record.state {
            JobState::FailedPermanent { error, failed_at } => (error.clone(), *failed_at),
            _ => (record.last_error.clone().unwrap_or_default(), record.updated_at),
        };
        Self {
            job_id: record.job_id.clone(),
            job_type: record.message.job_type.clone(),
            queue: record.message.queue.clone(),
            attempts: record.attempt,
            error,
            payload: String::from_utf8_lossy(&record.message.payload).into_owned(),
            failed_at,
        }
    }
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn dead_letter(&self, record: &JobRecord);
}

/// Writes every dead letter to the error log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDeadLetterSink;

#[async_trait]
impl DeadLetterSink for TracingDeadLetterSink {
    async fn dead_letter(&self, record: &JobRecord) {
        let letter = DeadLetter::from(record);
        error!(
            job_id = %letter.job_id,
            job_type = %letter.job_type,
            queue = %letter.queue,
            attempts = letter.attempts,
            payload = %letter.payload,
            "Job dead-lettered: {}",
            letter.error
        );
    }
}

/// Keeps dead letters in memory so they can be listed and inspected
#[derive(Debug, Default)]
pub struct MemoryDeadLetterQueue {
    entries: Mutex<Vec<DeadLetter>>,
}

impl MemoryDeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<DeadLetter> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterQueue {
    async fn dead_letter(&self, record: &JobRecord) {
        // Operators still see it in the log.
        TracingDeadLetterSink.dead_letter(record).await;
        self.entries.lock().push(DeadLetter::from(record));
    }
}
