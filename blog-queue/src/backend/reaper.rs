use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::{backend::QueueBackend, dead_letter::DeadLetterSink, JobState, QueueResult};

/// Periodically reclaims jobs whose worker stopped renewing the lease.
///
/// A reclaimed job is due again immediately unless it has used up its
/// retries, in which case it is failed and dead-lettered. Each cycle also
/// drops succeeded records older than the retention window.
pub struct LeaseReaper {
    backend: Arc<dyn QueueBackend>,
    dead_letters: Arc<dyn DeadLetterSink>,
    interval: Duration,
    retention: Duration,
}

impl LeaseReaper {
    pub fn new(backend: Arc<dyn QueueBackend>, dead_letters: Arc<dyn DeadLetterSink>) -> Self {
        Self {
            backend,
            dead_letters,
            interval: Duration::from_secs(30),
            retention: Duration::from_secs(3600),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Run until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        // `interval` panics on a zero period.
        let mut ticker = interval(self.interval.max(Duration::from_millis(1)));
        info!("Starting lease reaper with interval: {:?}", self.interval);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.reap_expired_leases().await {
                        warn!("Error during lease reaping: {}", e);
                    }
                    if let Err(e) = self.purge_succeeded().await {
                        warn!("Error purging succeeded jobs: {}", e);
                    }
                }
            }
        }
        debug!("Lease reaper stopped");
    }

    /// Run one reaper cycle, returning how many jobs were reclaimed
    pub async fn reap_expired_leases(&self) -> QueueResult<usize> {
        let reclaimed = self.backend.reclaim_expired(Utc::now()).await?;

        for record in &reclaimed {
            match &record.state {
                JobState::FailedPermanent { .. } => {
                    warn!(job_id = %record.job_id, attempts = record.attempt, "Lease expired with no retries left");
                    self.dead_letters.dead_letter(record).await;
                }
                _ => debug!(job_id = %record.job_id, "Reclaimed expired lease"),
            }
        }

        if !reclaimed.is_empty() {
            info!("Reclaimed {} expired leases", reclaimed.len());
        }
        Ok(reclaimed.len())
    }

    /// Drop succeeded records that finished more than `retention` ago
    pub async fn purge_succeeded(&self) -> QueueResult<usize> {
        // A window too large for chrono keeps everything.
        let Some(cutoff) = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return Ok(0);
        };
        let purged = self.backend.purge_succeeded(cutoff).await?;
        if purged > 0 {
            debug!("Purged {} succeeded jobs", purged);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::dead_letter::MemoryDeadLetterQueue;
    use crate::JobMessage;

    const LEASE: Duration = Duration::from_secs(30);

    fn setup() -> (MemoryBackend, Arc<MemoryDeadLetterQueue>, LeaseReaper) {
        let backend = MemoryBackend::new();
        let dlq = Arc::new(MemoryDeadLetterQueue::new());
        let reaper = LeaseReaper::new(Arc::new(backend.clone()), dlq.clone());
        (backend, dlq, reaper)
    }

    #[tokio::test]
    async fn expired_lease_becomes_due_again() {
        let (backend, dlq, reaper) = setup();
        let job_id = backend.enqueue(JobMessage::new("t", vec![], "q")).await.unwrap();
        backend.dequeue(&["q"], LEASE).await.unwrap().unwrap();

        assert_eq!(reaper.reap_expired_leases().await.unwrap(), 0);
        backend.force_lease_expiry(&job_id).unwrap();
        assert_eq!(reaper.reap_expired_leases().await.unwrap(), 1);

        let retry = backend.dequeue(&["q"], LEASE).await.unwrap().unwrap();
        assert_eq!(retry.attempt(), 2);
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn expired_lease_on_last_attempt_is_dead_lettered() {
        let (backend, dlq, reaper) = setup();
        let job_id = backend
            .enqueue(JobMessage::new("t", vec![], "q").with_max_retries(0))
            .await
            .unwrap();
        backend.dequeue(&["q"], LEASE).await.unwrap().unwrap();
        backend.force_lease_expiry(&job_id).unwrap();

        reaper.reap_expired_leases().await.unwrap();

        let state = backend.get_state(&job_id).await.unwrap();
        assert!(matches!(state, JobState::FailedPermanent { .. }));
        assert_eq!(dlq.entries()[0].job_id, job_id);
        assert!(backend.dequeue(&["q"], LEASE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn succeeded_jobs_are_purged_after_retention() {
        let (backend, _dlq, reaper) = setup();
        let done = backend.enqueue(JobMessage::new("t", vec![], "q")).await.unwrap();
        let leased = backend.dequeue(&["q"], LEASE).await.unwrap().unwrap();
        backend.ack_complete(&done, &leased.lease_token).await.unwrap();
        let waiting = backend.enqueue(JobMessage::new("t", vec![], "q")).await.unwrap();

        assert_eq!(reaper.purge_succeeded().await.unwrap(), 0);

        let reaper = reaper.with_retention(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(reaper.purge_succeeded().await.unwrap(), 1);

        assert!(backend.get_record(&done).await.is_err());
        assert!(backend.get_record(&waiting).await.is_ok());
    }
}
