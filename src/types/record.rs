use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JobId, WorkerId};

/// Job status lifecycle
///
/// Queued -> Running -> {Completed, Failed, RetryScheduled};
/// RetryScheduled jobs sit back in their type queue until claimed again.
/// Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in its type queue
    Queued,

    /// Owned by exactly one worker
    Running,

    /// Finished successfully
    Completed,

    /// Failed permanently (dead-lettered)
    Failed,

    /// Failed an attempt and re-enqueued for another one
    RetryScheduled,
}

impl JobStatus {
    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if the job may be claimed from a queue
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Queued | Self::RetryScheduled)
    }

    /// Get the status name as a string
    pub fn name(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::RetryScheduled => "retry_scheduled",
        }
    }
}

/// Job record - the canonical representation of one unit of work
///
/// Created once by submission, mutated only by the worker that currently
/// owns it, never deleted by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier (immutable)
    pub job_id: JobId,

    /// Job type name for dispatch (open set)
    pub job_type: String,

    /// Current job status
    pub status: JobStatus,

    /// Completion percentage, 0 to 100
    pub progress: u8,

    /// Human-readable status message
    pub message: String,

    /// Opaque type-specific payload
    pub payload: Value,

    /// Attempts consumed so far; never decreases
    pub retry_count: u32,

    /// Worker owning the record while running
    pub worker_id: Option<WorkerId>,

    /// Type-specific result blob attached on success
    pub result: Option<Value>,

    /// When the record was created
    pub created_at: DateTime<Utc>,

    /// When the record was last updated
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a new queued record
    pub fn new(job_id: JobId, job_type: String, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            job_type,
            status: JobStatus::Queued,
            progress: 0,
            message: "Job queued".to_string(),
            payload,
            retry_count: 0,
            worker_id: None,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the record is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Overwrite the mutable status fields and bump updated_at
    pub fn apply_update(
        &mut self,
        status: JobStatus,
        progress: u8,
        message: &str,
        worker_id: Option<&WorkerId>,
    ) {
        self.status = status;
        self.progress = progress.min(100);
        self.message = message.to_string();
        self.worker_id = worker_id.cloned();
        self.updated_at = Utc::now();
    }
}

/// A job removed from its queue for exclusive processing
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    /// The claimed job id
    pub job_id: JobId,

    /// Snapshot of the record at claim time
    pub record: JobRecord,
}
