pub mod registry;

pub use registry::ProcessorRegistry;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::{
    error::{ProcessorError, StoreResult},
    store::JobStore,
    types::{JobId, JobStatus, WorkerId},
};

/// Contract for the external collaborators that perform the actual work
///
/// Return `Ok(false)` for expected, recoverable business failures (no data
/// in range, empty result set). Raise an error only for unexpected
/// conditions. Both paths feed the retry ladder; see DESIGN.md.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Job type name this processor handles
    fn job_type(&self) -> &str;

    /// Execute one job. Progress reports go through the handle zero or more
    /// times during the run.
    async fn process(
        &self,
        job_id: &JobId,
        payload: &Value,
        progress: &ProgressHandle,
    ) -> Result<bool, ProcessorError>;
}

/// Forwards processor progress reports to the job record
///
/// Handed to the processor by the dispatcher; scoped to one job and the
/// worker that owns it.
pub struct ProgressHandle {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    worker_id: WorkerId,
}

impl ProgressHandle {
    pub(crate) fn new(store: Arc<dyn JobStore>, job_id: JobId, worker_id: WorkerId) -> Self {
        Self {
            store,
            job_id,
            worker_id,
        }
    }

    /// Report progress. A failed write is logged and absorbed; it never
    /// interrupts the processor.
    pub async fn report(&self, percent: u8, message: &str) {
        if let Err(e) = self
            .store
            .update(
                &self.job_id,
                JobStatus::Running,
                percent,
                message,
                Some(&self.worker_id),
            )
            .await
        {
            warn!("progress update for {} failed: {}", self.job_id, e);
        }
    }

    /// Attach the type-specific result blob to the record.
    pub async fn attach_result(&self, result: Value) -> StoreResult<()> {
        self.store.attach_result(&self.job_id, result).await
    }

    /// Persist a separate artifact keyed by the job id.
    pub async fn put_artifact(&self, artifact: Value) -> StoreResult<()> {
        self.store.put_artifact(&self.job_id, artifact).await
    }
}
