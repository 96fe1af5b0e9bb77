use std::cmp::Reverse;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    backend::{BoxStream, QueueBackend, QueueStats},
    types::LeaseToken,
    JobEvent, JobId, JobMessage, JobRecord, JobState, LeasedJob, QueueError, QueueResult,
};

#[derive(Default)]
struct MemoryState {
    /// Job records indexed by job_id
    jobs: HashMap<JobId, JobRecord>,

    /// queue name -> ids of jobs that are not terminal yet
    queues: HashMap<String, VecDeque<JobId>>,

    next_seq: u64,
}

impl MemoryState {
    fn record_mut(&mut self, job_id: &JobId) -> QueueResult<&mut JobRecord> {
        self.jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))
    }

    /// Look up a running job and check the caller still holds its lease
    fn leased_mut(&mut self, job_id: &JobId, token: &LeaseToken, now: DateTime<Utc>) -> QueueResult<&mut JobRecord> {
        let record = self.record_mut(job_id)?;
        if record.state.is_terminal() {
            return Err(QueueError::JobAlreadyTerminal);
        }
        if record.lease_token.as_ref() != Some(token) {
            return Err(QueueError::InvalidLeaseToken);
        }
        if record.lease_expired(now) {
            return Err(QueueError::LeaseExpired);
        }
        Ok(record)
    }

    fn unindex(&mut self, job_id: &JobId, queue: &str) {
        if let Some(ids) = self.queues.get_mut(queue) {
            ids.retain(|id| id != job_id);
        }
    }
}

/// In-memory backend for tests, development and single-process deployments.
///
/// All state lives behind one lock, so lease and acknowledgement transitions
/// are atomic with respect to concurrent workers.
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<RwLock<MemoryState>>,
    event_broadcaster: broadcast::Sender<JobEvent>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (event_broadcaster, _) = broadcast::channel(1000);
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            event_broadcaster,
        }
    }

    fn emit(&self, event: JobEvent) {
        // No subscribers is fine.
        let _ = self.event_broadcaster.send(event);
    }

    /// Force a running job's lease to expire (test helper)
    pub fn force_lease_expiry(&self, job_id: &JobId) -> QueueResult<()> {
        let mut state = self.state.write();
        let record = state.record_mut(job_id)?;
        record.set_lease_until(Utc::now() - chrono::Duration::seconds(1));
        Ok(())
    }

    /// Make a pending or retrying job due right now (test helper)
    pub fn make_due(&self, job_id: &JobId) -> QueueResult<()> {
        let now = Utc::now();
        let mut state = self.state.write();
        let record = state.record_mut(job_id)?;
        match record.state {
            JobState::Pending => record.next_run_at = now,
            JobState::FailedRetryable { ref mut retry_at, .. } => {
                *retry_at = now;
                record.next_run_at = now;
            }
            _ => {}
        }
        Ok(())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn enqueue(&self, message: JobMessage) -> QueueResult<JobId> {
        let job_id = JobId::new();
        let queue = message.queue.clone();
        let job_type = message.job_type.clone();

        {
            let mut state = self.state.write();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.jobs.insert(job_id.clone(), JobRecord::new(job_id.clone(), message, seq));
            state.queues.entry(queue.clone()).or_default().push_back(job_id.clone());
        }

        self.emit(JobEvent::Enqueued {
            job_id: job_id.clone(),
            queue,
            job_type,
            at: Utc::now(),
        });
        Ok(job_id)
    }

    async fn dequeue(&self, queues: &[&str], lease: Duration) -> QueueResult<Option<LeasedJob>> {
        let now = Utc::now();
        let lease_until = now + chrono::Duration::from_std(lease).map_err(|e| QueueError::Internal(e.to_string()))?;

        let leased = {
            let mut state = self.state.write();

            // Highest priority first, then earliest due time, then enqueue order.
            let best = queues
                .iter()
                .filter_map(|name| state.queues.get(*name))
                .flatten()
                .filter_map(|id| state.jobs.get(id))
                .filter(|record| record.is_due(now))
                .max_by_key(|record| (record.message.priority, Reverse(record.next_run_at), Reverse(record.seq)))
                .map(|record| record.job_id.clone());

            let Some(job_id) = best else {
                return Ok(None);
            };

            let record = state.record_mut(&job_id)?;
            record.promote();
            let lease_token = LeaseToken::new();
            record.start_running(lease_token.clone(), lease_until);

            LeasedJob {
                record: record.clone(),
                lease_token,
                lease_until,
            }
        };

        debug!(job_id = %leased.job_id(), attempt = leased.attempt(), "leased job");
        self.emit(JobEvent::Leased {
            job_id: leased.job_id().clone(),
            attempt: leased.attempt(),
            lease_until,
            at: now,
        });
        Ok(Some(leased))
    }

    async fn ack_complete(&self, job_id: &JobId, lease_token: &LeaseToken) -> QueueResult<()> {
        let now = Utc::now();
        {
            let mut state = self.state.write();
            let record = state.leased_mut(job_id, lease_token, now)?;
            record.succeed();
            let queue = record.message.queue.clone();
            state.unindex(job_id, &queue);
        }

        self.emit(JobEvent::Succeeded {
            job_id: job_id.clone(),
            at: now,
        });
        Ok(())
    }

    async fn ack_fail(
        &self,
        job_id: &JobId,
        lease_token: &LeaseToken,
        error: String,
        retry_at: Option<DateTime<Utc>>,
    ) -> QueueResult<JobRecord> {
        let now = Utc::now();
        let updated = {
            let mut state = self.state.write();
            let record = state.leased_mut(job_id, lease_token, now)?;
            match retry_at {
                Some(at) => record.schedule_retry(at, error.clone()),
                None => record.fail_permanently(error.clone()),
            }
            let updated = record.clone();
            if updated.state.is_terminal() {
                state.unindex(job_id, &updated.message.queue);
            }
            updated
        };

        let event = match retry_at {
            Some(retry_at) => JobEvent::Retrying {
                job_id: job_id.clone(),
                retry_at,
                error,
                at: now,
            },
            None => JobEvent::DeadLettered {
                job_id: job_id.clone(),
                error,
                at: now,
            },
        };
        self.emit(event);
        Ok(updated)
    }

    async fn heartbeat_extend(&self, job_id: &JobId, lease_token: &LeaseToken, lease: Duration) -> QueueResult<DateTime<Utc>> {
        let now = Utc::now();
        let lease_until = now + chrono::Duration::from_std(lease).map_err(|e| QueueError::Internal(e.to_string()))?;

        let mut state = self.state.write();
        let record = state.leased_mut(job_id, lease_token, now)?;
        record.set_lease_until(lease_until);
        debug!(%job_id, %lease_until, "lease renewed");
        Ok(lease_until)
    }

    async fn release(&self, job_id: &JobId, lease_token: &LeaseToken, reason: String) -> QueueResult<()> {
        let now = Utc::now();
        {
            let mut state = self.state.write();
            let record = state.leased_mut(job_id, lease_token, now)?;
            record.attempt = record.attempt.saturating_sub(1);
            record.schedule_retry(now, reason.clone());
        }

        self.emit(JobEvent::Retrying {
            job_id: job_id.clone(),
            retry_at: now,
            error: reason,
            at: now,
        });
        Ok(())
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> QueueResult<Vec<JobRecord>> {
        let reclaimed = {
            let mut state = self.state.write();
            let expired: Vec<JobId> = state
                .jobs
                .values()
                .filter(|record| record.lease_expired(now))
                .map(|record| record.job_id.clone())
                .collect();

            let mut reclaimed = Vec::with_capacity(expired.len());
            for job_id in expired {
                let record = state.record_mut(&job_id)?;
                if record.has_retries_left() {
                    record.schedule_retry(now, "Lease expired".to_string());
                } else {
                    record.fail_permanently(format!("Lease expired after {} attempts", record.attempt));
                }
                let record = record.clone();
                if record.state.is_terminal() {
                    state.unindex(&job_id, &record.message.queue);
                }
                reclaimed.push(record);
            }
            reclaimed
        };

        for record in &reclaimed {
            let event = match &record.state {
                JobState::FailedRetryable { retry_at, error } => JobEvent::Retrying {
                    job_id: record.job_id.clone(),
                    retry_at: *retry_at,
                    error: error.clone(),
                    at: now,
                },
                JobState::FailedPermanent { error, .. } => JobEvent::DeadLettered {
                    job_id: record.job_id.clone(),
                    error: error.clone(),
                    at: now,
                },
                _ => continue,
            };
            self.emit(event);
        }
        Ok(reclaimed)
    }

    async fn purge_succeeded(&self, before: DateTime<Utc>) -> QueueResult<usize> {
        let mut state = self.state.write();
        let len = state.jobs.len();
        state
            .jobs
            .retain(|_, record| !matches!(record.state, JobState::Succeeded { completed_at } if completed_at < before));
        Ok(len - state.jobs.len())
    }

    async fn get_record(&self, job_id: &JobId) -> QueueResult<JobRecord> {
        self.state
            .read()
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| QueueError::JobNotFound(job_id.to_string()))
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let state = self.state.read();
        let mut stats = QueueStats::default();
        for record in state.jobs.values() {
            stats.count(&record.state);
        }
        Ok(stats)
    }

    fn event_stream(&self) -> BoxStream<JobEvent> {
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};
        let stream = BroadcastStream::new(self.event_broadcaster.subscribe()).filter_map(|result| result.ok());
        Box::pin(stream)
    }
}
