use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::{
    backend::{reaper::LeaseReaper, QueueBackend},
    dead_letter::{DeadLetterSink, TracingDeadLetterSink},
    job::{registry::AnyContext, JobRegistry},
    observability::LiveMetrics,
    retry::RetryPolicy,
    Job, JobError, JobId, JobMessage, QueueError, QueueResult,
};

/// Configuration for queue adapter
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Concurrent worker tasks started by `start_workers`
    pub workers: usize,
    /// Sleep between polls when no job is due
    pub poll_interval: Duration,
    /// Lease duration for jobs
    pub lease_duration: Duration,
    /// How often expired leases are reclaimed
    pub reaper_interval: Duration,
    /// How often a running job renews its lease
    pub heartbeat_interval: Duration,
    /// How long succeeded records are kept before the reaper drops them
    pub succeeded_retention: Duration,
    pub retry_policy: RetryPolicy,
}

impl QueueConfig {
    /// Renewal period actually used by workers. Capped at half the lease so
    /// a renewal always lands before the lease runs out.
    pub fn effective_heartbeat(&self) -> Duration {
        self.heartbeat_interval
            .min(self.lease_duration / 2)
            .max(Duration::from_millis(1))
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_millis(250),
            lease_duration: Duration::from_secs(300), // 5 minutes
            reaper_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            succeeded_retention: Duration::from_secs(3600),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// Handle for managing worker lifecycle
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    join_handles: Vec<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Stop all workers. A job in flight is released back to the queue as
    /// retryable rather than finished.
    pub async fn shutdown(self) -> QueueResult<()> {
        let _ = self.shutdown_tx.send(true);
        for joined in join_all(self.join_handles).await {
            joined.map_err(|e| QueueError::Internal(format!("Worker join error: {}", e)))?;
        }
        info!("All workers stopped");
        Ok(())
    }
}

/// Front door of the queue: job registration, enqueueing and worker pool
pub struct QueueAdapter<B: QueueBackend + ?Sized> {
    backend: Arc<B>,
    job_registry: Arc<RwLock<JobRegistry>>,
    metrics: Arc<LiveMetrics>,
    dead_letters: Arc<dyn DeadLetterSink>,
    config: QueueConfig,
}

impl<B: QueueBackend + 'static> QueueAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, QueueConfig::default())
    }

    pub fn with_config(backend: B, config: QueueConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            job_registry: Arc::new(RwLock::new(JobRegistry::new())),
            metrics: Arc::new(LiveMetrics::new()),
            dead_letters: Arc::new(TracingDeadLetterSink),
            config,
        }
    }

    /// Share a metrics registry with other components
    pub fn with_metrics(mut self, metrics: Arc<LiveMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = sink;
        self
    }

    /// Register a job type for processing
    pub async fn register_job<J: Job>(&self) -> QueueResult<()> {
        self.job_registry.write().await.register::<J>()?;
        info!("Registered job type: {}", J::JOB_TYPE);
        Ok(())
    }

    /// Store a job for asynchronous execution
    #[instrument(skip(self, job), fields(job_type = J::JOB_TYPE, queue = J::QUEUE))]
    pub async fn enqueue<J: Job>(&self, job: J) -> QueueResult<JobId> {
        let max_retries = J::MAX_RETRIES.unwrap_or(self.config.retry_policy.max_retries());
        let message = JobMessage::new(J::JOB_TYPE, serde_json::to_vec(&job)?, J::QUEUE)
            .with_priority(J::PRIORITY)
            .with_max_retries(max_retries);

        let job_id = self.backend.enqueue(message).await?;
        self.metrics.record_enqueued(J::JOB_TYPE);

        info!("Enqueued job {} of type {}", job_id, J::JOB_TYPE);
        Ok(job_id)
    }

    /// Start the worker pool and lease reaper for `queues`
    #[instrument(skip(self, context), fields(queues = ?queues, workers = self.config.workers))]
    pub async fn start_workers<C>(&self, context: C, queues: Vec<String>) -> QueueResult<WorkerHandle>
    where
        C: Clone + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let context: AnyContext = Arc::new(context);
        let mut join_handles = Vec::with_capacity(self.config.workers + 1);

        for index in 0..self.config.workers.max(1) {
            let worker = Worker {
                adapter: self.erased(),
                context: context.clone(),
                queues: queues.clone(),
            };
            let shutdown = shutdown_rx.clone();
            join_handles.push(tokio::spawn(
                worker.run(shutdown).instrument(info_span!("worker", index)),
            ));
        }

        let reaper = LeaseReaper::new(self.backend.clone(), self.dead_letters.clone())
            .with_interval(self.config.reaper_interval)
            .with_retention(self.config.succeeded_retention);
        join_handles.push(tokio::spawn(reaper.run(shutdown_rx)));

        info!("Started {} workers", self.config.workers.max(1));
        Ok(WorkerHandle {
            shutdown_tx,
            join_handles,
        })
    }

    /// Process at most one due job on the calling task.
    ///
    /// Returns whether a job was found. Useful for deterministic tests and
    /// one-shot tooling.
    pub async fn run_next<C>(&self, context: C, queues: &[&str]) -> QueueResult<bool>
    where
        C: Clone + Send + Sync + 'static,
    {
        let worker = Worker {
            adapter: self.erased(),
            context: Arc::new(context),
            queues: queues.iter().map(|q| q.to_string()).collect(),
        };
        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        worker.process_next_job(&mut shutdown_rx).await
    }

    /// Poll until no job is pending, running or waiting for a retry
    pub async fn wait_until_idle(&self, timeout: Duration) -> QueueResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.backend.stats().await?.outstanding() == 0 {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.config.poll_interval.min(Duration::from_millis(50))).await;
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn metrics(&self) -> &Arc<LiveMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn erased(&self) -> QueueAdapter<dyn QueueBackend> {
        QueueAdapter {
            backend: self.backend.clone() as Arc<dyn QueueBackend>,
            job_registry: self.job_registry.clone(),
            metrics: self.metrics.clone(),
            dead_letters: self.dead_letters.clone(),
            config: self.config.clone(),
        }
    }
}

impl<B: QueueBackend + ?Sized> Clone for QueueAdapter<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            job_registry: self.job_registry.clone(),
            metrics: self.metrics.clone(),
            dead_letters: self.dead_letters.clone(),
            config: self.config.clone(),
        }
    }
}

/// Worker for processing jobs from queues
struct Worker {
    adapter: QueueAdapter<dyn QueueBackend>,
    context: AnyContext,
    queues: Vec<String>,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Worker started for queues: {:?}", self.queues);

        loop {
            // A dropped handle counts as a shutdown request.
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }

            match self.process_next_job(&mut shutdown).await {
                Ok(true) => continue,
                Ok(false) => self.idle(&mut shutdown, self.adapter.config.poll_interval).await,
                Err(e) => {
                    error!("Error processing job: {}", e);
                    self.idle(&mut shutdown, Duration::from_secs(1)).await;
                }
            }
        }

        info!("Worker stopped");
    }

    async fn idle(&self, shutdown: &mut watch::Receiver<bool>, period: Duration) {
        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => {}
            _ = tokio::time::sleep(period) => {}
        }
    }

    /// Lease and run one job. Returns false when nothing was due.
    async fn process_next_job(&self, shutdown: &mut watch::Receiver<bool>) -> QueueResult<bool> {
        let adapter = &self.adapter;
        let queue_refs: Vec<&str> = self.queues.iter().map(String::as_str).collect();

        let Some(leased) = adapter.backend.dequeue(&queue_refs, adapter.config.lease_duration).await? else {
            return Ok(false);
        };

        let job_id = leased.job_id().clone();
        let job_type = leased.message().job_type.clone();
        let attempt = leased.attempt();
        let span = info_span!("job", %job_id, %job_type, attempt);

        // Registration must not wait behind running jobs.
        let handler = adapter.job_registry.read().await.handler(&job_type);
        let execution = async {
            match handler {
                Ok(handler) => handler.execute(leased.message(), self.context.clone()).await,
                Err(e) => Err(JobError::permanent(e.to_string())),
            }
        }
        .instrument(span);
        tokio::pin!(execution);

        let period = adapter.config.effective_heartbeat();
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                result = &mut execution => break Some(result),
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break None,
                _ = heartbeat.tick() => {
                    let renewed = adapter
                        .backend
                        .heartbeat_extend(&job_id, &leased.lease_token, adapter.config.lease_duration)
                        .await;
                    if let Err(e) = renewed {
                        // The job may already be running elsewhere; stop this copy.
                        warn!("Job {} lost its lease, abandoning execution: {}", job_id, e);
                        return Ok(true);
                    }
                }
            }
        };

        match outcome {
            None => {
                adapter
                    .backend
                    .release(&job_id, &leased.lease_token, "Interrupted by worker shutdown".to_string())
                    .await?;
                warn!("Job {} interrupted by shutdown, released for retry", job_id);
            }

            Some(Ok(output)) => {
                adapter.backend.ack_complete(&job_id, &leased.lease_token).await?;
                adapter.metrics.record_succeeded(&job_type);
                debug!(%output, "job output");
                info!("Job {} completed successfully", job_id);
            }

            Some(Err(job_error)) => {
                let policy = &adapter.config.retry_policy;
                let retry_at = policy.next_retry_at(&job_error, attempt, leased.message().max_retries, Utc::now());

                let record = adapter
                    .backend
                    .ack_fail(&job_id, &leased.lease_token, job_error.message().to_string(), retry_at)
                    .await?;

                match retry_at {
                    Some(retry_at) => {
                        adapter.metrics.record_retried(&job_type);
                        warn!("Job {} failed, will retry at {}: {}", job_id, retry_at, job_error);
                    }
                    None => {
                        adapter.metrics.record_dead_lettered(&job_type);
                        error!("Job {} failed permanently after {} attempts: {}", job_id, attempt, job_error);
                        adapter.dead_letters.dead_letter(&record).await;
                    }
                }
            }
        }

        Ok(true)
    }
}
