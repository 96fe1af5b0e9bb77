use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// Lifecycle events broadcast by a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    Enqueued {
        job_id: JobId,
        queue: String,
        job_type: String,
        at: DateTime<Utc>,
    },

    Leased {
        job_id: JobId,
        attempt: u32,
        lease_until: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    Retrying {
        job_id: JobId,
        retry_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    Succeeded {
        job_id: JobId,
        at: DateTime<Utc>,
    },

    /// Failed permanently and sent to the dead-letter sink
    DeadLettered {
        job_id: JobId,
        error: String,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Leased { .. } => "leased",
            Self::Retrying { .. } => "retrying",
            Self::Succeeded { .. } => "succeeded",
            Self::DeadLettered { .. } => "dead_lettered",
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Enqueued { job_id, .. }
            | Self::Leased { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Succeeded { job_id, .. }
            | Self::DeadLettered { job_id, .. } => job_id,
        }
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Enqueued { at, .. }
            | Self::Leased { at, .. }
            | Self::Retrying { at, .. }
            | Self::Succeeded { at, .. }
            | Self::DeadLettered { at, .. } => at,
        }
    }
}
