pub mod registry;

pub use registry::{JobHandler, JobRegistry};

use crate::{JobError, JobPriority};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// A unit of background work.
///
/// The payload is the serialized job value itself. Its dependencies come in
/// through `Context`, which the worker pool is started with.
#[async_trait]
pub trait Job: Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Dependencies handed to every execution
    type Context: Send + Sync + Clone + 'static;

    /// Value produced by a successful execution
    type Output: Send + Sync + Serialize + 'static;

    /// Job type identifier for dispatch
    const JOB_TYPE: &'static str;

    /// Queue the job is routed to
    const QUEUE: &'static str = "default";

    const PRIORITY: JobPriority = JobPriority::NORMAL;

    /// Retries allowed after the first execution.
    /// `None` defers to the adapter's retry policy.
    const MAX_RETRIES: Option<u32> = None;

    async fn execute(&self, ctx: Self::Context) -> Result<Self::Output, JobError>;
}
