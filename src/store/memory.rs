use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{broadcast, Notify};
use tracing::warn;

use crate::{
    error::{StoreError, StoreResult},
    store::{BoxStream, JobStore},
    types::{ClaimedJob, JobEvent, JobId, JobRecord, JobStatus, ProgressEvent, WorkerId},
};

const EVENT_CHANNEL_CAPACITY: usize = 1000;
const PROGRESS_TOPIC_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy)]
struct HeartbeatEntry {
    refreshed_at: Instant,
    ttl: Duration,
}

/// In-process store for testing, development and single-node deployments
///
/// Lock order: `queues` before `jobs`; `dead_letter` only after `jobs` is
/// released or read-held last. No lock is held across an await point.
pub struct MemoryStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,

    /// job_type -> FIFO of pending ids
    queues: RwLock<HashMap<String, VecDeque<JobId>>>,

    dead_letter: RwLock<VecDeque<JobId>>,

    heartbeats: RwLock<HashMap<WorkerId, HeartbeatEntry>>,

    artifacts: RwLock<HashMap<JobId, Value>>,

    /// Per-job ephemeral progress topics, created lazily
    progress_topics: RwLock<HashMap<JobId, broadcast::Sender<ProgressEvent>>>,

    event_broadcaster: broadcast::Sender<JobEvent>,

    /// Wakes claimers when an id lands in any queue
    signal: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (event_broadcaster, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            jobs: RwLock::new(HashMap::new()),
            queues: RwLock::new(HashMap::new()),
            dead_letter: RwLock::new(VecDeque::new()),
            heartbeats: RwLock::new(HashMap::new()),
            artifacts: RwLock::new(HashMap::new()),
            progress_topics: RwLock::new(HashMap::new()),
            event_broadcaster,
            signal: Notify::new(),
        }
    }

    /// Pop the first claimable id across the given queues, in listed order.
    ///
    /// Ids without a backing record are discarded here so the claim loop
    /// never faults on them.
    fn try_claim(&self, queues: &[&str]) -> Option<ClaimedJob> {
        let mut queue_map = self.queues.write();
        for name in queues {
            let Some(queue) = queue_map.get_mut(*name) else {
                continue;
            };
            while let Some(job_id) = queue.pop_front() {
                let jobs = self.jobs.read();
                match jobs.get(&job_id) {
                    Some(record) => {
                        return Some(ClaimedJob {
                            job_id: job_id.clone(),
                            record: record.clone(),
                        });
                    }
                    None => {
                        warn!("discarding queue entry without record: {}", job_id);
                    }
                }
            }
        }
        None
    }

    fn progress_sender(&self, job_id: &JobId) -> broadcast::Sender<ProgressEvent> {
        let mut topics = self.progress_topics.write();
        topics
            .entry(job_id.clone())
            .or_insert_with(|| broadcast::channel(PROGRESS_TOPIC_CAPACITY).0)
            .clone()
    }

    /// Push an id into a queue directly, bypassing record creation.
    ///
    /// Test helper for exercising the missing-record claim path.
    pub fn inject_queue_entry(&self, job_type: &str, job_id: JobId) {
        self.queues
            .write()
            .entry(job_type.to_string())
            .or_default()
            .push_back(job_id);
        self.signal.notify_one();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn submit(&self, record: JobRecord) -> StoreResult<()> {
        let job_id = record.job_id.clone();
        let job_type = record.job_type.clone();

        {
            let mut queues = self.queues.write();
            let mut jobs = self.jobs.write();
            jobs.insert(job_id.clone(), record);
            queues
                .entry(job_type.clone())
                .or_default()
                .push_back(job_id.clone());
        }
        self.signal.notify_one();

        let event = JobEvent::Submitted {
            job_id,
            job_type,
            at: Utc::now(),
        };
        let _ = self.event_broadcaster.send(event);

        Ok(())
    }

    async fn claim(&self, queues: &[&str], wait: Duration) -> StoreResult<Option<ClaimedJob>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(claimed) = self.try_claim(queues) {
                return Ok(Some(claimed));
            }
            if tokio::time::timeout_at(deadline, self.signal.notified())
                .await
                .is_err()
            {
                return Ok(None);
            }
        }
    }

    async fn get(&self, job_id: &JobId) -> StoreResult<Option<JobRecord>> {
        Ok(self.jobs.read().get(job_id).cloned())
    }

    async fn update(
        &self,
        job_id: &JobId,
        status: JobStatus,
        progress: u8,
        message: &str,
        worker_id: Option<&WorkerId>,
    ) -> StoreResult<()> {
        {
            let mut jobs = self.jobs.write();
            let record = jobs
                .get_mut(job_id)
                .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
            record.apply_update(status, progress, message, worker_id);
        }

        let event = ProgressEvent {
            job_id: job_id.clone(),
            status,
            progress: progress.min(100),
            message: message.to_string(),
        };
        let _ = self.progress_sender(job_id).send(event);

        Ok(())
    }

    async fn increment_retry(&self, job_id: &JobId) -> StoreResult<u32> {
        let mut jobs = self.jobs.write();
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        record.retry_count += 1;
        record.updated_at = Utc::now();
        Ok(record.retry_count)
    }

    async fn requeue(&self, job_id: &JobId) -> StoreResult<()> {
        let mut queues = self.queues.write();
        let job_type = {
            let jobs = self.jobs.read();
            jobs.get(job_id)
                .map(|record| record.job_type.clone())
                .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?
        };
        queues
            .entry(job_type)
            .or_default()
            .push_back(job_id.clone());
        drop(queues);
        self.signal.notify_one();
        Ok(())
    }

    async fn push_dead_letter(&self, job_id: &JobId) -> StoreResult<()> {
        let (job_type, error) = {
            let jobs = self.jobs.read();
            let record = jobs
                .get(job_id)
                .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
            (record.job_type.clone(), record.message.clone())
        };

        self.dead_letter.write().push_back(job_id.clone());

        let event = JobEvent::DeadLettered {
            job_id: job_id.clone(),
            job_type,
            error,
            at: Utc::now(),
        };
        let _ = self.event_broadcaster.send(event);

        Ok(())
    }

    async fn list(&self, job_type: Option<&str>, limit: usize) -> StoreResult<Vec<JobRecord>> {
        let jobs = self.jobs.read();
        let mut records: Vec<JobRecord> = jobs
            .values()
            .filter(|record| job_type.map_or(true, |t| record.job_type == t))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn queue_len(&self, job_type: &str) -> StoreResult<usize> {
        Ok(self
            .queues
            .read()
            .get(job_type)
            .map(VecDeque::len)
            .unwrap_or(0))
    }

    async fn dead_letter_len(&self) -> StoreResult<usize> {
        Ok(self.dead_letter.read().len())
    }

    async fn dead_letter_ids(&self) -> StoreResult<Vec<JobId>> {
        Ok(self.dead_letter.read().iter().cloned().collect())
    }

    async fn heartbeat(&self, worker_id: &WorkerId, ttl: Duration) -> StoreResult<()> {
        self.heartbeats.write().insert(
            worker_id.clone(),
            HeartbeatEntry {
                refreshed_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn live_workers(&self) -> StoreResult<Vec<WorkerId>> {
        let heartbeats = self.heartbeats.read();
        Ok(heartbeats
            .iter()
            .filter(|(_, entry)| entry.refreshed_at.elapsed() < entry.ttl)
            .map(|(worker_id, _)| worker_id.clone())
            .collect())
    }

    async fn attach_result(&self, job_id: &JobId, result: Value) -> StoreResult<()> {
        let mut jobs = self.jobs.write();
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        record.result = Some(result);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn put_artifact(&self, job_id: &JobId, artifact: Value) -> StoreResult<()> {
        self.artifacts.write().insert(job_id.clone(), artifact);
        Ok(())
    }

    async fn get_artifact(&self, job_id: &JobId) -> StoreResult<Option<Value>> {
        Ok(self.artifacts.read().get(job_id).cloned())
    }

    fn subscribe_progress(&self, job_id: &JobId) -> broadcast::Receiver<ProgressEvent> {
        self.progress_sender(job_id).subscribe()
    }

    fn events(&self) -> BoxStream<JobEvent> {
        let receiver = self.event_broadcaster.subscribe();
        use tokio_stream::{wrappers::BroadcastStream, StreamExt};
        let stream = BroadcastStream::new(receiver).filter_map(|result| result.ok());

        Box::pin(stream)
    }
}
