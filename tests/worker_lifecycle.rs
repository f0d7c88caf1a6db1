use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use tick_queue::{
    BoxStream, BreakerConfig, CircuitBreaker, ClaimedJob, JobClient, JobEvent, JobId, JobRecord,
    JobStatus, JobStore, MemoryStore, Processor, ProcessorError, ProcessorRegistry, ProgressEvent,
    ProgressHandle, StoreError, StoreResult, Worker, WorkerConfig, WorkerError, WorkerId,
};

fn fast_config() -> WorkerConfig {
    WorkerConfig {
        claim_timeout: Duration::from_millis(100),
        error_backoff: Duration::from_millis(10),
        circuit_open_backoff: Duration::from_millis(30),
        ..WorkerConfig::default()
    }
}

fn worker_with(
    store: Arc<dyn JobStore>,
    registry: ProcessorRegistry,
    config: WorkerConfig,
) -> Worker {
    let breaker = CircuitBreaker::new("store", BreakerConfig::default());
    Worker::new(store, Arc::new(registry), breaker, config)
}

async fn wait_until<F, Fut>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Stub migration processor: reports fixed progress steps, attaches a
/// result, succeeds.
struct StubMigrationProcessor;

#[async_trait]
impl Processor for StubMigrationProcessor {
    fn job_type(&self) -> &str {
        "migration"
    }

    async fn process(
        &self,
        _job_id: &JobId,
        payload: &Value,
        progress: &ProgressHandle,
    ) -> Result<bool, ProcessorError> {
        for (percent, message) in [
            (0u8, "loading ticks"),
            (30, "converting chunks"),
            (60, "writing partitions"),
            (100, "finalizing"),
        ] {
            progress.report(percent, message).await;
        }
        progress
            .attach_result(json!({
                "run_id": payload["run"],
                "instrument_id": payload["inst"],
                "total_rows": 120_000,
            }))
            .await?;
        Ok(true)
    }
}

/// Processor that always raises.
struct CrashingProcessor {
    job_type: String,
}

#[async_trait]
impl Processor for CrashingProcessor {
    fn job_type(&self) -> &str {
        &self.job_type
    }

    async fn process(
        &self,
        _job_id: &JobId,
        _payload: &Value,
        _progress: &ProgressHandle,
    ) -> Result<bool, ProcessorError> {
        Err(ProcessorError::failed("engine crashed"))
    }
}

/// Processor that reports an expected business failure.
struct NoDataProcessor;

#[async_trait]
impl Processor for NoDataProcessor {
    fn job_type(&self) -> &str {
        "backtest"
    }

    async fn process(
        &self,
        _job_id: &JobId,
        _payload: &Value,
        _progress: &ProgressHandle,
    ) -> Result<bool, ProcessorError> {
        Ok(false)
    }
}

/// Processor that takes a while, for shutdown tests.
struct SlowProcessor {
    started: Arc<AtomicBool>,
}

#[async_trait]
impl Processor for SlowProcessor {
    fn job_type(&self) -> &str {
        "migration"
    }

    async fn process(
        &self,
        _job_id: &JobId,
        _payload: &Value,
        progress: &ProgressHandle,
    ) -> Result<bool, ProcessorError> {
        self.started.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;
        progress.report(100, "done").await;
        Ok(true)
    }
}

/// Store wrapper that injects claim failures while the flag is set.
struct FlakyStore {
    inner: MemoryStore,
    fail_claims: AtomicBool,
    failed_claims: AtomicU32,
}

impl FlakyStore {
    fn new(failing: bool) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_claims: AtomicBool::new(failing),
            failed_claims: AtomicU32::new(0),
        }
    }

    fn set_failing(&self, failing: bool) {
        self.fail_claims.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobStore for FlakyStore {
    async fn submit(&self, record: JobRecord) -> StoreResult<()> {
        self.inner.submit(record).await
    }

    async fn claim(&self, queues: &[&str], wait: Duration) -> StoreResult<Option<ClaimedJob>> {
        if self.fail_claims.load(Ordering::SeqCst) {
            self.failed_claims.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected store outage".to_string()));
        }
        self.inner.claim(queues, wait).await
    }

    async fn get(&self, job_id: &JobId) -> StoreResult<Option<JobRecord>> {
        self.inner.get(job_id).await
    }

    async fn update(
        &self,
        job_id: &JobId,
        status: JobStatus,
        progress: u8,
        message: &str,
        worker_id: Option<&WorkerId>,
    ) -> StoreResult<()> {
        self.inner
            .update(job_id, status, progress, message, worker_id)
            .await
    }

    async fn increment_retry(&self, job_id: &JobId) -> StoreResult<u32> {
        self.inner.increment_retry(job_id).await
    }

    async fn requeue(&self, job_id: &JobId) -> StoreResult<()> {
        self.inner.requeue(job_id).await
    }

    async fn push_dead_letter(&self, job_id: &JobId) -> StoreResult<()> {
        self.inner.push_dead_letter(job_id).await
    }

    async fn list(&self, job_type: Option<&str>, limit: usize) -> StoreResult<Vec<JobRecord>> {
        self.inner.list(job_type, limit).await
    }

    async fn queue_len(&self, job_type: &str) -> StoreResult<usize> {
        self.inner.queue_len(job_type).await
    }

    async fn dead_letter_len(&self) -> StoreResult<usize> {
        self.inner.dead_letter_len().await
    }

    async fn dead_letter_ids(&self) -> StoreResult<Vec<JobId>> {
        self.inner.dead_letter_ids().await
    }

    async fn heartbeat(&self, worker_id: &WorkerId, ttl: Duration) -> StoreResult<()> {
        self.inner.heartbeat(worker_id, ttl).await
    }

    async fn live_workers(&self) -> StoreResult<Vec<WorkerId>> {
        self.inner.live_workers().await
    }

    async fn attach_result(&self, job_id: &JobId, result: Value) -> StoreResult<()> {
        self.inner.attach_result(job_id, result).await
    }

    async fn put_artifact(&self, job_id: &JobId, artifact: Value) -> StoreResult<()> {
        self.inner.put_artifact(job_id, artifact).await
    }

    async fn get_artifact(&self, job_id: &JobId) -> StoreResult<Option<Value>> {
        self.inner.get_artifact(job_id).await
    }

    fn subscribe_progress(&self, job_id: &JobId) -> broadcast::Receiver<ProgressEvent> {
        self.inner.subscribe_progress(job_id)
    }

    fn events(&self) -> BoxStream<JobEvent> {
        self.inner.events()
    }
}

#[test_log::test(tokio::test)]
async fn migration_job_runs_to_completion() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let client = JobClient::new(store.clone());

    let job_id = client
        .submit(
            "migration",
            "run10_inst643",
            json!({"run": 10, "inst": 643, "start": "2023-01-02", "end": "2023-01-03"}),
        )
        .await
        .unwrap();
    let mut progress_rx = client.subscribe_progress(&job_id);

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(StubMigrationProcessor));
    let handle = worker_with(store.clone(), registry, fast_config()).spawn();

    let completed = wait_until(
        || async {
            matches!(
                client.status(&job_id).await.unwrap(),
                Some(record) if record.status == JobStatus::Completed
            )
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(completed, "job did not complete in time");

    let record = client.status(&job_id).await.unwrap().unwrap();
    assert_eq!(record.progress, 100);
    assert!(record.message.starts_with("Completed in"));
    assert!(record.worker_id.is_some());
    assert_eq!(record.result.as_ref().unwrap()["total_rows"], 120_000);

    // The stub's reports all reached the progress topic
    let mut seen = Vec::new();
    while let Ok(event) = progress_rx.try_recv() {
        seen.push(event.progress);
    }
    for expected in [30u8, 60, 100] {
        assert!(seen.contains(&expected), "missing progress {}", expected);
    }

    handle.shutdown().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn crashing_processor_exhausts_retries_into_dead_letter() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let client = JobClient::new(store.clone());

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(CrashingProcessor {
        job_type: "backtest".to_string(),
    }));
    let handle = worker_with(store.clone(), registry, fast_config()).spawn();

    let job_id = client
        .submit("backtest", "nw_run10", json!({"strategy": "mean_reversion_nw"}))
        .await
        .unwrap();

    let dead_lettered = wait_until(
        || async { store.dead_letter_len().await.unwrap() == 1 },
        Duration::from_secs(5),
    )
    .await;
    assert!(dead_lettered, "job never reached the dead-letter queue");

    let record = client.status(&job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.retry_count, 3);
    assert_eq!(record.message, "Failed after 3 retries: engine crashed");
    assert_eq!(store.dead_letter_ids().await.unwrap(), vec![job_id]);

    handle.shutdown().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn business_failure_follows_the_same_retry_ladder() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let client = JobClient::new(store.clone());

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(NoDataProcessor));
    let config = WorkerConfig {
        max_retries: 1,
        ..fast_config()
    };
    let handle = worker_with(store.clone(), registry, config).spawn();

    let job_id = client
        .submit("backtest", "empty_range", json!({"start": "2099-01-01"}))
        .await
        .unwrap();

    let dead_lettered = wait_until(
        || async { store.dead_letter_len().await.unwrap() == 1 },
        Duration::from_secs(5),
    )
    .await;
    assert!(dead_lettered);

    let record = client.status(&job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.retry_count, 1);
    assert!(record.message.contains("processor reported failure"));

    handle.shutdown().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn unknown_job_type_dead_letters_without_retry() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let client = JobClient::new(store.clone());

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(StubMigrationProcessor));
    let config = WorkerConfig {
        // Claim wider than the registry, as with a static queue list
        queues: vec!["migration".to_string(), "backtest".to_string()],
        ..fast_config()
    };
    let handle = worker_with(store.clone(), registry, config).spawn();

    let job_id = client
        .submit("backtest", "nw_run10", json!({"strategy": "mean_reversion_nw"}))
        .await
        .unwrap();

    let dead_lettered = wait_until(
        || async { store.dead_letter_len().await.unwrap() == 1 },
        Duration::from_secs(5),
    )
    .await;
    assert!(dead_lettered);

    let record = client.status(&job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Failed);
    assert_eq!(record.retry_count, 0);
    assert_eq!(record.message, "Unknown job type: backtest");

    handle.shutdown().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn shutdown_waits_for_the_in_flight_job() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
    let client = JobClient::new(store.clone());
    let started = Arc::new(AtomicBool::new(false));

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(SlowProcessor {
        started: started.clone(),
    }));

    let job_id = client
        .submit("migration", "run10_inst643", json!({"run": 10}))
        .await
        .unwrap();
    let handle = worker_with(store.clone(), registry, fast_config()).spawn();

    let in_flight = wait_until(
        || async { started.load(Ordering::SeqCst) },
        Duration::from_secs(2),
    )
    .await;
    assert!(in_flight, "processor never started");

    // Shutdown must not abort the running processor
    handle.shutdown().await.unwrap();

    let record = client.status(&job_id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.progress, 100);
}

#[test_log::test(tokio::test)]
async fn open_circuit_is_advisory_and_recovers() {
    let flaky = Arc::new(FlakyStore::new(true));
    let store: Arc<dyn JobStore> = flaky.clone();
    let client = JobClient::new(store.clone());

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(StubMigrationProcessor));

    let breaker = CircuitBreaker::new(
        "store",
        BreakerConfig {
            failure_threshold: 2,
            timeout: Duration::from_millis(100),
        },
    );
    let config = WorkerConfig {
        max_consecutive_errors: 100,
        ..fast_config()
    };
    let handle = Worker::new(store.clone(), Arc::new(registry), breaker, config).spawn();

    // Let the breaker trip, then verify it stops hammering the store
    let tripped = wait_until(
        || async { flaky.failed_claims.load(Ordering::SeqCst) >= 2 },
        Duration::from_secs(2),
    )
    .await;
    assert!(tripped);
    tokio::time::sleep(Duration::from_millis(60)).await;
    let calls_while_open = flaky.failed_claims.load(Ordering::SeqCst);
    assert!(calls_while_open <= 3, "store hammered while circuit open");

    // Store recovers; the worker resumes after the trial call
    flaky.set_failing(false);
    let job_id = client
        .submit("migration", "run10_inst643", json!({"run": 10, "inst": 643}))
        .await
        .unwrap();

    let completed = wait_until(
        || async {
            matches!(
                client.status(&job_id).await.unwrap(),
                Some(record) if record.status == JobStatus::Completed
            )
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(completed, "worker never recovered from the open circuit");

    handle.shutdown().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn persistent_store_failures_terminate_the_worker() {
    let flaky = Arc::new(FlakyStore::new(true));
    let store: Arc<dyn JobStore> = flaky.clone();

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(StubMigrationProcessor));

    // Breaker wide open threshold so every claim reaches the store and fails
    let breaker = CircuitBreaker::new(
        "store",
        BreakerConfig {
            failure_threshold: 1000,
            timeout: Duration::from_secs(60),
        },
    );
    let config = WorkerConfig {
        max_consecutive_errors: 3,
        ..fast_config()
    };
    let handle = Worker::new(store, Arc::new(registry), breaker, config).spawn();

    tokio::time::sleep(Duration::from_millis(300)).await;
    let result = handle.shutdown().await;
    assert!(matches!(result, Err(WorkerError::TooManyErrors(_))));
}

#[test_log::test(tokio::test)]
async fn worker_registers_a_live_heartbeat() {
    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());

    let mut registry = ProcessorRegistry::new();
    registry.register(Arc::new(StubMigrationProcessor));
    let worker = worker_with(store.clone(), registry, fast_config())
        .with_worker_id(WorkerId::from("worker-7"));
    let handle = worker.spawn();

    let alive = wait_until(
        || async {
            store
                .live_workers()
                .await
                .unwrap()
                .contains(&WorkerId::from("worker-7"))
        },
        Duration::from_secs(2),
    )
    .await;
    assert!(alive, "heartbeat never appeared");

    handle.shutdown().await.unwrap();
}
