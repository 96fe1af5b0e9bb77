//! # blog-queue: background jobs with leases, retries and dead letters
//!
//! Jobs are plain serde types implementing [`Job`]. The [`QueueAdapter`]
//! serializes them into a [`QueueBackend`], and a pool of workers leases due
//! jobs, runs them with a shared context and acknowledges the outcome.
//!
//! - Each lease carries a token, so a job never runs on two workers at once.
//! - Failures are [`JobError::Retryable`] or [`JobError::Permanent`]. Retryable
//!   failures back off per [`RetryPolicy`] (60s, 300s, 1500s by default).
//! - Jobs that run out of retries are handed to a [`DeadLetterSink`].
//! - Shutdown releases in-flight jobs back to the queue as retryable.
//!
//! ```rust,no_run
//! use blog_queue::prelude::*;
//! use blog_queue::backend::memory::MemoryBackend;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping {
//!     target: String,
//! }
//!
//! #[async_trait]
//! impl Job for Ping {
//!     type Context = ();
//!     type Output = ();
//!     const JOB_TYPE: &'static str = "ping";
//!
//!     async fn execute(&self, _ctx: ()) -> Result<(), JobError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn demo() -> QueueResult<()> {
//! let adapter = QueueAdapter::new(MemoryBackend::new());
//! adapter.register_job::<Ping>().await?;
//! adapter.enqueue(Ping { target: "db".into() }).await?;
//! let workers = adapter.start_workers((), vec!["default".to_string()]).await?;
//! workers.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod backend;
pub mod dead_letter;
pub mod error;
pub mod job;
pub mod observability;
pub mod retry;
pub mod types;

pub use adapter::{QueueAdapter, QueueConfig, WorkerHandle};
pub use backend::{QueueBackend, QueueStats};
pub use dead_letter::{DeadLetter, DeadLetterSink, MemoryDeadLetterQueue, TracingDeadLetterSink};
pub use error::{ErrorClass, JobError, QueueError, QueueResult};
pub use job::{Job, JobRegistry};
pub use observability::{LiveMetrics, MetricsSink};
pub use retry::RetryPolicy;
pub use types::{JobEvent, JobId, JobMessage, JobPriority, JobRecord, JobState, LeaseToken, LeasedJob};

pub mod prelude {
    pub use crate::{
        Job, JobError, JobId, JobPriority, JobState, QueueAdapter, QueueBackend, QueueConfig, QueueResult,
        RetryPolicy, WorkerHandle,
    };

    pub use async_trait::async_trait;
}
