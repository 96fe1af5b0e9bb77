use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Job, JobError, JobMessage, QueueError, QueueResult};

/// Shared, type-erased execution context
pub type AnyContext = Arc<dyn Any + Send + Sync>;

/// Type-erased job handler for runtime dispatch
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Decode the message payload and run the job
    async fn execute(&self, message: &JobMessage, context: AnyContext) -> Result<serde_json::Value, JobError>;

    fn job_type(&self) -> &'static str;
}

struct TypedHandler<J: Job> {
    _job: PhantomData<fn() -> J>,
}

#[async_trait]
impl<J: Job> JobHandler for TypedHandler<J> {
    async fn execute(&self, message: &JobMessage, context: AnyContext) -> Result<serde_json::Value, JobError> {
        // A payload that no longer decodes will not decode on retry either.
        let job: J = serde_json::from_slice(&message.payload)
            .map_err(|e| JobError::permanent(format!("Failed to deserialize {}: {}", J::JOB_TYPE, e)))?;

        let ctx = context
            .downcast_ref::<J::Context>()
            .ok_or_else(|| JobError::permanent(format!("Invalid context type for {}", J::JOB_TYPE)))?
            .clone();

        let output = job.execute(ctx).await?;

        serde_json::to_value(&output)
            .map_err(|e| JobError::permanent(format!("Failed to serialize output: {}", e)))
    }

    fn job_type(&self) -> &'static str {
        J::JOB_TYPE
    }
}

/// Maps job type names to handlers
#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<J: Job>(&mut self) -> QueueResult<()> {
        if self.handlers.contains_key(J::JOB_TYPE) {
            return Err(QueueError::Internal(format!("Job type '{}' already registered", J::JOB_TYPE)));
        }
        self.handlers.insert(J::JOB_TYPE, Arc::new(TypedHandler::<J> { _job: PhantomData }));
        Ok(())
    }

    pub fn handler(&self, job_type: &str) -> QueueResult<Arc<dyn JobHandler>> {
        self.handlers
            .get(job_type)
            .cloned()
            .ok_or_else(|| QueueError::JobTypeNotRegistered(job_type.to_string()))
    }

    /// Execute a job by message
    pub async fn execute_job(&self, message: &JobMessage, context: AnyContext) -> Result<serde_json::Value, JobError> {
        let handler = self
            .handler(&message.job_type)
            .map_err(|e| JobError::permanent(e.to_string()))?;
        handler.execute(message, context).await
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }
}
