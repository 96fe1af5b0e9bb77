use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_test::{assert_err, assert_ok};

use blog_queue::{
    backend::memory::MemoryBackend, Job, JobError, JobEvent, JobMessage, JobState, MemoryDeadLetterQueue,
    QueueAdapter, QueueBackend, QueueConfig, QueueError, RetryPolicy,
};

const LEASE: Duration = Duration::from_secs(30);

fn message() -> JobMessage {
    JobMessage::new("test_job", b"{}".to_vec(), "default")
}

/// Counts executions and fails according to `mode`
#[derive(Clone, Default)]
struct Tally {
    runs: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    peak_running: Arc<AtomicUsize>,
}

#[derive(Serialize, Deserialize)]
enum Mode {
    Succeed,
    Transient,
    Permanent,
    Hang,
    /// Outlives several lease periods
    Slow(u64),
}

#[derive(Serialize, Deserialize)]
struct CountedJob {
    mode: Mode,
}

#[async_trait]
impl Job for CountedJob {
    type Context = Tally;
    type Output = usize;

    const JOB_TYPE: &'static str = "counted";
    const QUEUE: &'static str = "counted";

    async fn execute(&self, ctx: Tally) -> Result<usize, JobError> {
        let run = ctx.runs.fetch_add(1, Ordering::SeqCst) + 1;
        match self.mode {
            Mode::Slow(millis) => {
                let running = ctx.running.fetch_add(1, Ordering::SeqCst) + 1;
                ctx.peak_running.fetch_max(running, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(millis)).await;
                ctx.running.fetch_sub(1, Ordering::SeqCst);
                Ok(run)
            }
            Mode::Succeed => Ok(run),
            Mode::Transient => Err(JobError::from_message("smtp connection reset")),
            Mode::Permanent => Err(JobError::from_message("recipient not found")),
            Mode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(run)
            }
        }
    }
}

/// Registered after workers are already busy
#[derive(Serialize, Deserialize)]
struct LateJob;

#[async_trait]
impl Job for LateJob {
    type Context = Tally;
    type Output = ();

    const JOB_TYPE: &'static str = "late";
    const QUEUE: &'static str = "counted";

    async fn execute(&self, ctx: Tally) -> Result<(), JobError> {
        ctx.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn counted_adapter(config: QueueConfig) -> (QueueAdapter<MemoryBackend>, Arc<MemoryDeadLetterQueue>) {
    let dlq = Arc::new(MemoryDeadLetterQueue::new());
    let adapter = QueueAdapter::with_config(MemoryBackend::new(), config).with_dead_letter_sink(dlq.clone());
    adapter.register_job::<CountedJob>().await.unwrap();
    (adapter, dlq)
}

/// A1. Dequeue leases atomically: concurrent pollers never share a job
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dequeue_hands_out_one_lease() {
    let backend = Arc::new(MemoryBackend::new());
    let job_id = backend.enqueue(message()).await.unwrap();

    let pollers = (0..16).map(|_| {
        let backend = backend.clone();
        tokio::spawn(async move { backend.dequeue(&["default"], LEASE).await.unwrap() })
    });
    let leases: Vec<_> = futures::future::join_all(pollers)
        .await
        .into_iter()
        .filter_map(|joined| joined.unwrap())
        .collect();

    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].job_id(), &job_id);
    assert!(leases[0].lease_until > Utc::now());

    let record = backend.get_record(&job_id).await.unwrap();
    assert!(record.state.is_running());
    assert_eq!(record.lease_token.as_ref(), Some(&leases[0].lease_token));
}

/// A2. Only the lease holder can acknowledge
#[tokio::test]
async fn only_lease_holder_can_ack() {
    let backend = MemoryBackend::new();
    let job_id = backend.enqueue(message()).await.unwrap();
    let leased = backend.dequeue(&["default"], LEASE).await.unwrap().unwrap();

    let forged = blog_queue::LeaseToken::new();
    let result = backend.ack_complete(&job_id, &forged).await;
    assert!(matches!(result, Err(QueueError::InvalidLeaseToken)));

    assert_ok!(backend.ack_complete(&job_id, &leased.lease_token).await);
    let again = assert_err!(backend.ack_complete(&job_id, &leased.lease_token).await);
    assert!(matches!(again, QueueError::JobAlreadyTerminal));
}

/// A3. An expired lease can no longer be acknowledged
#[tokio::test]
async fn expired_lease_cannot_ack() {
    let backend = MemoryBackend::new();
    let job_id = backend.enqueue(message()).await.unwrap();
    let leased = backend.dequeue(&["default"], LEASE).await.unwrap().unwrap();

    backend.force_lease_expiry(&job_id).unwrap();
    let result = backend
        .ack_fail(&job_id, &leased.lease_token, "boom".into(), None)
        .await;
    assert!(matches!(result, Err(QueueError::LeaseExpired)));
}

/// B1. Delayed jobs are not leased before they are due
#[tokio::test]
async fn delayed_job_waits_for_run_at() {
    let backend = MemoryBackend::new();
    let later = Utc::now() + chrono::Duration::seconds(120);
    let job_id = backend.enqueue(message().with_run_at(later)).await.unwrap();

    assert!(backend.dequeue(&["default"], LEASE).await.unwrap().is_none());
    backend.make_due(&job_id).unwrap();
    assert!(backend.dequeue(&["default"], LEASE).await.unwrap().is_some());
}

/// C1. Transient failures back off 60s, 300s, 1500s and then dead-letter
#[tokio::test]
async fn transient_failures_exhaust_retries_then_dead_letter() {
    let (adapter, dlq) = counted_adapter(QueueConfig::default()).await;
    let tally = Tally::default();
    let job_id = adapter.enqueue(CountedJob { mode: Mode::Transient }).await.unwrap();

    let expected_delays = [60, 300, 1500];
    for (attempt, delay) in expected_delays.iter().enumerate() {
        assert!(adapter.run_next(tally.clone(), &["counted"]).await.unwrap());

        let record = adapter.backend().get_record(&job_id).await.unwrap();
        assert_eq!(record.attempt as usize, attempt + 1);
        let JobState::FailedRetryable { retry_at, .. } = record.state else {
            panic!("expected retryable state, got {:?}", record.state);
        };
        let waited = (retry_at - record.updated_at).num_seconds();
        assert!((delay - 1..=*delay).contains(&waited), "attempt {} waited {}", attempt + 1, waited);

        // Not due yet.
        assert!(!adapter.run_next(tally.clone(), &["counted"]).await.unwrap());
        adapter.backend().make_due(&job_id).unwrap();
    }

    // Fourth and final execution.
    assert!(adapter.run_next(tally.clone(), &["counted"]).await.unwrap());
    let state = adapter.backend().get_state(&job_id).await.unwrap();
    assert!(matches!(state, JobState::FailedPermanent { .. }));
    assert_eq!(tally.runs.load(Ordering::SeqCst), 4);

    let letters = dlq.entries();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].attempts, 4);
    assert_eq!(letters[0].error, "smtp connection reset");

    // Never dispatched again.
    adapter.backend().make_due(&job_id).unwrap();
    assert!(!adapter.run_next(tally.clone(), &["counted"]).await.unwrap());
    assert_eq!(adapter.metrics().jobs_retried(), 3);
    assert_eq!(adapter.metrics().jobs_dead_lettered(), 1);
}

/// C2. Permanent failures are not retried
#[tokio::test]
async fn permanent_failure_dead_letters_on_first_attempt() {
    let (adapter, dlq) = counted_adapter(QueueConfig::default()).await;
    let tally = Tally::default();
    let job_id = adapter.enqueue(CountedJob { mode: Mode::Permanent }).await.unwrap();

    adapter.run_next(tally.clone(), &["counted"]).await.unwrap();

    let record = adapter.backend().get_record(&job_id).await.unwrap();
    assert!(matches!(record.state, JobState::FailedPermanent { .. }));
    assert_eq!(record.attempt, 1);
    assert_eq!(dlq.len(), 1);
    assert_eq!(adapter.metrics().jobs_retried(), 0);
}

/// D1. A worker pool runs every job exactly once when nothing fails
#[test_log::test(tokio::test)]
async fn worker_pool_drains_queue() {
    let config = QueueConfig {
        workers: 4,
        poll_interval: Duration::from_millis(10),
        ..QueueConfig::default()
    };
    let (adapter, dlq) = counted_adapter(config).await;
    let tally = Tally::default();

    for _ in 0..20 {
        adapter.enqueue(CountedJob { mode: Mode::Succeed }).await.unwrap();
    }

    let workers = adapter.start_workers(tally.clone(), vec!["counted".to_string()]).await.unwrap();
    assert!(adapter.wait_until_idle(Duration::from_secs(5)).await.unwrap());
    workers.shutdown().await.unwrap();

    assert_eq!(tally.runs.load(Ordering::SeqCst), 20);
    assert_eq!(adapter.backend().stats().await.unwrap().succeeded, 20);
    assert!(dlq.is_empty());
}

/// D2. Shutdown interrupts an in-flight job and leaves it retryable
#[tokio::test]
async fn shutdown_releases_in_flight_job() {
    let config = QueueConfig {
        workers: 1,
        poll_interval: Duration::from_millis(10),
        ..QueueConfig::default()
    };
    let (adapter, _dlq) = counted_adapter(config).await;
    let tally = Tally::default();
    let job_id = adapter.enqueue(CountedJob { mode: Mode::Hang }).await.unwrap();

    let workers = adapter.start_workers(tally.clone(), vec!["counted".to_string()]).await.unwrap();
    while tally.runs.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    tokio::time::timeout(Duration::from_secs(5), workers.shutdown())
        .await
        .expect("shutdown should not wait for the hung job")
        .unwrap();

    let record = adapter.backend().get_record(&job_id).await.unwrap();
    assert!(matches!(record.state, JobState::FailedRetryable { .. }));
    assert_eq!(record.attempt, 0);
    assert_eq!(record.last_error.as_deref(), Some("Interrupted by worker shutdown"));
}

/// D3. A job that outlives its lease keeps it by renewal and runs once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_job_renews_lease_and_runs_once() {
    let config = QueueConfig {
        workers: 2,
        poll_interval: Duration::from_millis(5),
        lease_duration: Duration::from_millis(50),
        reaper_interval: Duration::from_millis(10),
        heartbeat_interval: Duration::from_millis(15),
        ..QueueConfig::default()
    };
    let (adapter, dlq) = counted_adapter(config).await;
    let tally = Tally::default();
    let job_id = adapter.enqueue(CountedJob { mode: Mode::Slow(400) }).await.unwrap();

    let workers = adapter.start_workers(tally.clone(), vec!["counted".to_string()]).await.unwrap();
    assert!(adapter.wait_until_idle(Duration::from_secs(5)).await.unwrap());
    assert_ok!(workers.shutdown().await);

    assert_eq!(tally.peak_running.load(Ordering::SeqCst), 1);
    assert_eq!(tally.runs.load(Ordering::SeqCst), 1);
    let record = adapter.backend().get_record(&job_id).await.unwrap();
    assert!(matches!(record.state, JobState::Succeeded { .. }));
    assert_eq!(record.attempt, 1);
    assert!(dlq.is_empty());
}

/// D4. Renewal extends a live lease and is refused once it has expired
#[tokio::test]
async fn heartbeat_extends_only_a_live_lease() {
    let backend = MemoryBackend::new();
    let job_id = backend.enqueue(message()).await.unwrap();
    let leased = backend.dequeue(&["default"], Duration::from_secs(1)).await.unwrap().unwrap();

    let renewed = assert_ok!(backend.heartbeat_extend(&job_id, &leased.lease_token, LEASE).await);
    assert!(renewed > leased.lease_until);
    let forged = blog_queue::LeaseToken::new();
    let err = assert_err!(backend.heartbeat_extend(&job_id, &forged, LEASE).await);
    assert!(matches!(err, QueueError::InvalidLeaseToken));

    backend.force_lease_expiry(&job_id).unwrap();
    let err = assert_err!(backend.heartbeat_extend(&job_id, &leased.lease_token, LEASE).await);
    assert!(matches!(err, QueueError::LeaseExpired));
}

/// D5. Registering a job type does not wait for running jobs
#[tokio::test]
async fn registration_proceeds_while_a_job_runs() {
    let config = QueueConfig {
        workers: 1,
        poll_interval: Duration::from_millis(5),
        ..QueueConfig::default()
    };
    let (adapter, _dlq) = counted_adapter(config).await;
    let tally = Tally::default();
    adapter.enqueue(CountedJob { mode: Mode::Hang }).await.unwrap();

    let workers = adapter.start_workers(tally.clone(), vec!["counted".to_string()]).await.unwrap();
    while tally.runs.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let registered = tokio::time::timeout(Duration::from_secs(1), adapter.register_job::<LateJob>()).await;
    assert_ok!(assert_ok!(registered));
    assert_ok!(workers.shutdown().await);
}

/// E1. Retry ceiling and delays come from the configured policy
#[tokio::test]
async fn configured_policy_applies_to_jobs_without_override() {
    let config = QueueConfig {
        retry_policy: RetryPolicy::immediate(1),
        ..QueueConfig::default()
    };
    let (adapter, dlq) = counted_adapter(config).await;
    let tally = Tally::default();
    let job_id = adapter.enqueue(CountedJob { mode: Mode::Transient }).await.unwrap();

    assert!(adapter.run_next(tally.clone(), &["counted"]).await.unwrap());
    assert!(adapter.run_next(tally.clone(), &["counted"]).await.unwrap());
    assert!(!adapter.run_next(tally.clone(), &["counted"]).await.unwrap());

    let state = adapter.backend().get_state(&job_id).await.unwrap();
    assert!(matches!(state, JobState::FailedPermanent { .. }));
    assert_eq!(tally.runs.load(Ordering::SeqCst), 2);
    assert_eq!(dlq.len(), 1);
}

/// F1. Lifecycle events are broadcast in order
#[tokio::test]
async fn events_follow_lifecycle() {
    let backend = MemoryBackend::new();
    let mut events = backend.event_stream();

    let job_id = backend.enqueue(message()).await.unwrap();
    let leased = backend.dequeue(&["default"], LEASE).await.unwrap().unwrap();
    backend
        .ack_fail(&job_id, &leased.lease_token, "flaky".into(), Some(Utc::now()))
        .await
        .unwrap();

    let mut names = Vec::new();
    for _ in 0..3 {
        let event: JobEvent = tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended");
        assert_eq!(event.job_id(), &job_id);
        names.push(event.event_name());
    }
    assert_eq!(names, vec!["enqueued", "leased", "retrying"]);
}
