use std::sync::Arc;

use tracing::{error, warn};

use crate::{
    error::{StoreError, StoreResult},
    store::JobStore,
    types::{JobId, JobStatus, WorkerId},
};

/// Outcome of handling a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Re-enqueued at the tail of its type queue
    Requeued { attempt: u32 },

    /// Moved to the dead-letter queue
    DeadLettered,
}

/// Decides re-enqueue vs dead-letter when an attempt fails
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Handle a failed attempt.
    ///
    /// Below the retry budget: atomically increment retry_count, mark the
    /// record RetryScheduled and append the id to the tail of its type queue
    /// so retries never jump ahead of fresh submissions. Otherwise mark it
    /// Failed with the terminal error and dead-letter it. No inter-attempt
    /// delay: a retried job may be reclaimed immediately.
    pub async fn handle_failure(
        &self,
        store: &Arc<dyn JobStore>,
        job_id: &JobId,
        worker_id: &WorkerId,
        error_message: &str,
    ) -> StoreResult<RetryOutcome> {
        let record = store
            .get(job_id)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;

        if record.retry_count < self.max_retries {
            let attempt = store.increment_retry(job_id).await?;
            store
                .update(
                    job_id,
                    JobStatus::RetryScheduled,
                    0,
                    &format!("Retry {}/{} scheduled", attempt, self.max_retries),
                    Some(worker_id),
                )
                .await?;
            store.requeue(job_id).await?;

            warn!("job {} scheduled for retry {}", job_id, attempt);
            Ok(RetryOutcome::Requeued { attempt })
        } else {
            store
                .update(
                    job_id,
                    JobStatus::Failed,
                    0,
                    &format!("Failed after {} retries: {}", self.max_retries, error_message),
                    Some(worker_id),
                )
                .await?;
            store.push_dead_letter(job_id).await?;

            error!("job {} moved to dead-letter queue", job_id);
            Ok(RetryOutcome::DeadLettered)
        }
    }

    /// Dead-letter a job whose type cannot be resolved, bypassing retry.
    pub async fn dead_letter_unresolvable(
        &self,
        store: &Arc<dyn JobStore>,
        job_id: &JobId,
        worker_id: &WorkerId,
        reason: &str,
    ) -> StoreResult<()> {
        store
            .update(job_id, JobStatus::Failed, 0, reason, Some(worker_id))
            .await?;
        store.push_dead_letter(job_id).await?;

        error!("job {} dead-lettered without retry: {}", job_id, reason);
        Ok(())
    }
}
