pub mod memory;
pub mod reaper;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;
use serde::Serialize;

use crate::{JobEvent, JobId, JobMessage, JobRecord, JobState, LeasedJob, QueueResult, types::LeaseToken};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Per-state job counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub succeeded: usize,
    pub failed_retryable: usize,
    pub failed_permanent: usize,
}

impl QueueStats {
    /// Jobs that may still be executed
    pub fn outstanding(&self) -> usize {
        self.pending + self.running + self.failed_retryable
    }

    pub(crate) fn count(&mut self, state: &JobState) {
        match state {
            JobState::Pending => self.pending += 1,
            JobState::Running { .. } => self.running += 1,
            JobState::Succeeded { .. } => self.succeeded += 1,
            JobState::FailedRetryable { .. } => self.failed_retryable += 1,
            JobState::FailedPermanent { .. } => self.failed_permanent += 1,
        }
    }
}

/// Storage primitives for the queue.
///
/// Every state transition on a job is atomic. A lease token is issued on
/// dequeue and must be presented by every acknowledgement, so no two workers
/// can finish the same execution.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    async fn enqueue(&self, message: JobMessage) -> QueueResult<JobId>;

    /// Lease the best due job from `queues`, if any.
    /// Leasing increments the job's attempt count.
    async fn dequeue(&self, queues: &[&str], lease: Duration) -> QueueResult<Option<LeasedJob>>;

    async fn ack_complete(&self, job_id: &JobId, lease_token: &LeaseToken) -> QueueResult<()>;

    /// Record a failed execution. `retry_at` comes from the adapter's retry
    /// policy; `None` fails the job permanently. Returns the updated record.
    async fn ack_fail(
        &self,
        job_id: &JobId,
        lease_token: &LeaseToken,
        error: String,
        retry_at: Option<DateTime<Utc>>,
    ) -> QueueResult<JobRecord>;

    /// Renew a running job's lease to `now + lease`. Fails once the lease
    /// has expired or passed to another worker. Returns the new deadline.
    async fn heartbeat_extend(
        &self,
        job_id: &JobId,
        lease_token: &LeaseToken,
        lease: Duration,
    ) -> QueueResult<DateTime<Utc>>;

    /// Give an interrupted execution back without spending a retry
    async fn release(&self, job_id: &JobId, lease_token: &LeaseToken, reason: String) -> QueueResult<()>;

    /// Reclaim running jobs whose lease expired before `now`.
    /// Returns the reclaimed records in their new state.
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> QueueResult<Vec<JobRecord>>;

    /// Forget succeeded jobs that completed before `before`.
    /// Returns how many were removed.
    async fn purge_succeeded(&self, before: DateTime<Utc>) -> QueueResult<usize>;

    async fn get_record(&self, job_id: &JobId) -> QueueResult<JobRecord>;

    async fn get_state(&self, job_id: &JobId) -> QueueResult<JobState> {
        Ok(self.get_record(job_id).await?.state)
    }

    async fn stats(&self) -> QueueResult<QueueStats>;

    /// Event stream for observability (boxed for stable Rust)
    fn event_stream(&self) -> BoxStream<JobEvent>;
}
