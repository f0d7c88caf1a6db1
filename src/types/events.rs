use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, JobStatus};

/// Payload published on a job's progress topic on every update
///
/// Ephemeral broadcast: no delivery guarantee, no replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
}

/// Global lifecycle events for external consumers (alerting, audit)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// A record was created and enqueued
    Submitted {
        job_id: JobId,
        job_type: String,
        at: DateTime<Utc>,
    },

    /// A job exhausted its retries or was unresolvable
    DeadLettered {
        job_id: JobId,
        job_type: String,
        error: String,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::DeadLettered { .. } => "dead_lettered",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Submitted { job_id, .. } => job_id,
            Self::DeadLettered { job_id, .. } => job_id,
        }
    }
}
