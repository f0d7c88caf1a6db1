pub mod memory;

use async_trait::async_trait;
use futures_core::Stream;
use serde_json::Value;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::{
    error::StoreResult,
    types::{ClaimedJob, JobEvent, JobId, JobRecord, JobStatus, ProgressEvent, WorkerId},
};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Contract for the shared state store
///
/// The store is the only coordination channel between workers. Its `claim`
/// is the sole mutual-exclusion primitive: a job id is delivered to exactly
/// one waiting claimer.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomically create the record and append its id to its type queue.
    ///
    /// Submitting an id that already exists overwrites the record and
    /// enqueues the id again.
    async fn submit(&self, record: JobRecord) -> StoreResult<()>;

    /// Blocking pop across the given type queues with a bounded wait.
    ///
    /// Returns `None` on timeout. A popped id with no backing record is
    /// logged and discarded without surfacing an error.
    async fn claim(&self, queues: &[&str], wait: Duration) -> StoreResult<Option<ClaimedJob>>;

    /// Load a record by id.
    async fn get(&self, job_id: &JobId) -> StoreResult<Option<JobRecord>>;

    /// Overwrite status/progress/message/worker_id/updated_at and publish a
    /// progress event on the job's topic.
    async fn update(
        &self,
        job_id: &JobId,
        status: JobStatus,
        progress: u8,
        message: &str,
        worker_id: Option<&WorkerId>,
    ) -> StoreResult<()>;

    /// Atomic fetch-and-increment of retry_count; returns the new value.
    async fn increment_retry(&self, job_id: &JobId) -> StoreResult<u32>;

    /// Append an existing id to the tail of its type queue.
    async fn requeue(&self, job_id: &JobId) -> StoreResult<()>;

    /// Append an id to the dead-letter queue and emit a dead-letter event.
    async fn push_dead_letter(&self, job_id: &JobId) -> StoreResult<()>;

    /// List records, newest first, optionally filtered by type.
    async fn list(&self, job_type: Option<&str>, limit: usize) -> StoreResult<Vec<JobRecord>>;

    /// Number of ids waiting in a type queue.
    async fn queue_len(&self, job_type: &str) -> StoreResult<usize>;

    /// Number of ids in the dead-letter queue.
    async fn dead_letter_len(&self) -> StoreResult<usize>;

    /// Snapshot of the dead-letter queue contents, oldest first.
    async fn dead_letter_ids(&self) -> StoreResult<Vec<JobId>>;

    /// Refresh a worker's TTL-bounded heartbeat.
    async fn heartbeat(&self, worker_id: &WorkerId, ttl: Duration) -> StoreResult<()>;

    /// Workers whose heartbeat has not expired.
    async fn live_workers(&self) -> StoreResult<Vec<WorkerId>>;

    /// Attach a type-specific result blob to the record.
    async fn attach_result(&self, job_id: &JobId, result: Value) -> StoreResult<()>;

    /// Persist an artifact keyed by job id; format is owned by the processor.
    async fn put_artifact(&self, job_id: &JobId, artifact: Value) -> StoreResult<()>;

    /// Fetch an artifact by job id.
    async fn get_artifact(&self, job_id: &JobId) -> StoreResult<Option<Value>>;

    /// Subscribe to a job's ephemeral progress topic.
    fn subscribe_progress(&self, job_id: &JobId) -> broadcast::Receiver<ProgressEvent>;

    /// Global lifecycle event stream (boxed for stable Rust).
    fn events(&self) -> BoxStream<JobEvent>;
}
