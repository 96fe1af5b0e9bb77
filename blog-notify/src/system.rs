use std::sync::Arc;

use blog_queue::backend::memory::MemoryBackend;
use blog_queue::observability::MetricsSnapshot;
use blog_queue::{
    JobId, LiveMetrics, MemoryDeadLetterQueue, QueueAdapter, QueueBackend, QueueConfig, QueueResult, QueueStats,
    WorkerHandle,
};
use tracing::info;

use crate::job::{NotificationContext, NotificationJob};
use crate::mailer::MailDispatcher;
use crate::params::NotificationParams;
use crate::store::RecordStore;
use crate::triggers::NotificationTriggers;

/// Notification queue, workers and collaborators wired together
pub struct NotificationSystem {
    adapter: QueueAdapter<MemoryBackend>,
    context: NotificationContext,
    metrics: Arc<LiveMetrics>,
    dead_letters: Arc<MemoryDeadLetterQueue>,
    workers: Option<WorkerHandle>,
}

impl NotificationSystem {
    pub async fn new(
        config: QueueConfig,
        store: Arc<dyn RecordStore>,
        mailer: Arc<dyn MailDispatcher>,
    ) -> QueueResult<Self> {
        let metrics = Arc::new(LiveMetrics::new());
        let dead_letters = Arc::new(MemoryDeadLetterQueue::new());

        let adapter = QueueAdapter::with_config(MemoryBackend::new(), config)
            .with_metrics(metrics.clone())
            .with_dead_letter_sink(dead_letters.clone());
        adapter.register_job::<NotificationJob>().await?;

        let context = NotificationContext {
            store,
            mailer,
            metrics: metrics.clone(),
        };

        Ok(Self {
            adapter,
            context,
            metrics,
            dead_letters,
            workers: None,
        })
    }

    /// Enqueue hooks for the web handlers
    pub fn triggers(&self) -> NotificationTriggers<MemoryBackend> {
        NotificationTriggers::new(self.adapter.clone(), self.context.store.clone())
    }

    pub async fn enqueue(&self, params: NotificationParams) -> QueueResult<JobId> {
        self.adapter.enqueue(NotificationJob::new(params)).await
    }

    /// Start the worker pool; a second call is a no-op
    pub async fn start(&mut self) -> QueueResult<()> {
        if self.workers.is_some() {
            return Ok(());
        }
        let queues = vec![<NotificationJob as blog_queue::Job>::QUEUE.to_string()];
        let handle = self.adapter.start_workers(self.context.clone(), queues).await?;
        self.workers = Some(handle);
        info!("Notification system started");
        Ok(())
    }

    /// Stop the workers, releasing any in-flight notification
    pub async fn shutdown(&mut self) -> QueueResult<()> {
        if let Some(handle) = self.workers.take() {
            handle.shutdown().await?;
            info!("Notification system stopped");
        }
        Ok(())
    }

    /// Run one due notification on the calling task
    pub async fn run_next(&self) -> QueueResult<bool> {
        self.adapter
            .run_next(self.context.clone(), &[<NotificationJob as blog_queue::Job>::QUEUE])
            .await
    }

    pub async fn stats(&self) -> QueueResult<QueueStats> {
        self.adapter.backend().stats().await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn live_metrics(&self) -> &Arc<LiveMetrics> {
        &self.metrics
    }

    pub fn dead_letters(&self) -> &Arc<MemoryDeadLetterQueue> {
        &self.dead_letters
    }

    pub fn adapter(&self) -> &QueueAdapter<MemoryBackend> {
        &self.adapter
    }
}
