use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    error::StoreResult,
    store::{BoxStream, JobStore},
    types::{JobEvent, JobId, JobRecord, ProgressEvent},
};

/// Default cap for list queries
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Thin submission and query facade over the store
///
/// The request/response front end wraps this; it owns no state of its own.
#[derive(Clone)]
pub struct JobClient {
    store: Arc<dyn JobStore>,
}

impl JobClient {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Atomically create a queued record and enqueue its id.
    ///
    /// The id is `type:business-key:epoch-seconds`; identical submissions
    /// within the same second collide (the later one wins).
    pub async fn submit(
        &self,
        job_type: &str,
        business_key: &str,
        payload: Value,
    ) -> StoreResult<JobId> {
        let job_id = JobId::from_parts(job_type, business_key, Utc::now().timestamp());
        let record = JobRecord::new(job_id.clone(), job_type.to_string(), payload);
        self.store.submit(record).await?;

        info!("created {} job: {}", job_type, job_id);
        Ok(job_id)
    }

    /// Fetch the full record for a job, or None when unknown.
    pub async fn status(&self, job_id: &JobId) -> StoreResult<Option<JobRecord>> {
        self.store.get(job_id).await
    }

    /// List recent jobs, newest first, optionally filtered by type.
    pub async fn list(
        &self,
        job_type: Option<&str>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<JobRecord>> {
        self.store
            .list(job_type, limit.unwrap_or(DEFAULT_LIST_LIMIT))
            .await
    }

    /// Subscribe to a job's ephemeral progress topic.
    pub fn subscribe_progress(&self, job_id: &JobId) -> broadcast::Receiver<ProgressEvent> {
        self.store.subscribe_progress(job_id)
    }

    /// Global lifecycle event stream.
    pub fn events(&self) -> BoxStream<JobEvent> {
        self.store.events()
    }

    /// Fetch the artifact persisted for a job, if any.
    pub async fn artifact(&self, job_id: &JobId) -> StoreResult<Option<Value>> {
        self.store.get_artifact(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::types::JobStatus;
    use serde_json::json;

    fn client() -> JobClient {
        JobClient::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn submitted_job_is_immediately_resolvable() {
        let client = client();
        let job_id = client
            .submit("migration", "run10_inst643", json!({"run_id": 10}))
            .await
            .unwrap();

        let record = client.status(&job_id).await.unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.progress, 0);
        assert_eq!(record.retry_count, 0);
        assert!(job_id.as_str().starts_with("migration:run10_inst643:"));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let client = client();
        let record = client.status(&JobId::from("migration:nope:0")).await.unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn list_filters_by_type_and_caps() {
        let client = client();
        for i in 0..3 {
            client
                .submit("migration", &format!("run{}_inst1", i), json!({}))
                .await
                .unwrap();
        }
        client.submit("backtest", "nw1", json!({})).await.unwrap();

        let migrations = client.list(Some("migration"), None).await.unwrap();
        assert_eq!(migrations.len(), 3);
        assert!(migrations.iter().all(|r| r.job_type == "migration"));

        let capped = client.list(None, Some(2)).await.unwrap();
        assert_eq!(capped.len(), 2);
    }
}
