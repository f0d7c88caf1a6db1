use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    breaker::{CircuitBreaker, CircuitError},
    config::{env_duration_secs, env_or},
    error::{StoreResult, WorkerError},
    observability::WorkerMetrics,
    processor::{ProcessorRegistry, ProgressHandle},
    retry::{RetryOutcome, RetryPolicy},
    store::JobStore,
    types::{ClaimedJob, JobId, JobStatus, WorkerId},
};

/// Configuration for the dispatcher loop
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queues to claim from; empty means "derive from the registry"
    pub queues: Vec<String>,
    /// Bounded wait inside a single claim
    pub claim_timeout: Duration,
    /// How often the liveness heartbeat is refreshed
    pub heartbeat_interval: Duration,
    /// Heartbeat time-to-live in the store
    pub heartbeat_ttl: Duration,
    /// Retry budget per job
    pub max_retries: u32,
    /// Sleep after the breaker rejects a claim
    pub circuit_open_backoff: Duration,
    /// Sleep after an unexpected error
    pub error_backoff: Duration,
    /// Consecutive unexpected errors beyond this terminate the worker
    pub max_consecutive_errors: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            claim_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_ttl: Duration::from_secs(60),
            max_retries: 3,
            circuit_open_backoff: Duration::from_secs(10),
            error_backoff: Duration::from_secs(1),
            max_consecutive_errors: 10,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables, with defaults for
    /// anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            queues: Vec::new(),
            claim_timeout: env_duration_secs("JOB_CLAIM_TIMEOUT", defaults.claim_timeout),
            heartbeat_interval: env_duration_secs(
                "WORKER_HEARTBEAT_INTERVAL",
                defaults.heartbeat_interval,
            ),
            heartbeat_ttl: env_duration_secs("WORKER_HEARTBEAT_TTL", defaults.heartbeat_ttl),
            max_retries: env_or("JOB_MAX_RETRIES", defaults.max_retries),
            circuit_open_backoff: env_duration_secs(
                "WORKER_CIRCUIT_OPEN_BACKOFF",
                defaults.circuit_open_backoff,
            ),
            error_backoff: env_duration_secs("WORKER_ERROR_BACKOFF", defaults.error_backoff),
            max_consecutive_errors: env_or(
                "WORKER_MAX_CONSECUTIVE_ERRORS",
                defaults.max_consecutive_errors,
            ),
        }
    }
}

/// Handle for managing worker lifecycle
pub struct WorkerHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: JoinHandle<Result<(), WorkerError>>,
}

impl WorkerHandle {
    /// Request shutdown and wait for the loop to finish.
    ///
    /// An in-flight job is never aborted; the loop stops before its next
    /// claim.
    pub async fn shutdown(self) -> Result<(), WorkerError> {
        let _ = self.shutdown_tx.send(());
        self.join_handle
            .await
            .map_err(|e| WorkerError::Join(e.to_string()))?
    }
}

/// One dispatcher loop: claims jobs through the circuit breaker, runs the
/// registered processor and applies the retry policy on failure
pub struct Worker {
    store: Arc<dyn JobStore>,
    breaker: CircuitBreaker,
    registry: Arc<ProcessorRegistry>,
    retry: RetryPolicy,
    metrics: Arc<WorkerMetrics>,
    config: WorkerConfig,
    worker_id: WorkerId,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<ProcessorRegistry>,
        breaker: CircuitBreaker,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            breaker,
            registry,
            retry: RetryPolicy::new(config.max_retries),
            metrics: Arc::new(WorkerMetrics::new()),
            config,
            worker_id: WorkerId::generate(),
        }
    }

    /// Override the generated worker id.
    pub fn with_worker_id(mut self, worker_id: WorkerId) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    pub fn metrics(&self) -> Arc<WorkerMetrics> {
        self.metrics.clone()
    }

    /// Spawn the loop on the runtime and return its lifecycle handle.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let join_handle = tokio::spawn(self.run(shutdown_rx));
        WorkerHandle {
            shutdown_tx,
            join_handle,
        }
    }

    /// Run the dispatcher loop until shutdown or a worker-fatal condition.
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) -> Result<(), WorkerError> {
        let queues: Vec<String> = if self.config.queues.is_empty() {
            self.registry.job_types()
        } else {
            self.config.queues.clone()
        };
        let queue_refs: Vec<&str> = queues.iter().map(String::as_str).collect();

        info!(
            "worker {} started, claiming from {:?}",
            self.worker_id, queues
        );

        self.emit_heartbeat().await;
        let mut last_heartbeat = Instant::now();
        let mut jobs_processed: u64 = 0;
        let mut consecutive_errors: u32 = 0;

        loop {
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Closed) => {
                    info!("worker {} shutdown requested", self.worker_id);
                    break;
                }
            }

            if last_heartbeat.elapsed() >= self.config.heartbeat_interval {
                self.emit_heartbeat().await;
                last_heartbeat = Instant::now();
            }

            let claimed = match self
                .breaker
                .call(self.store.claim(&queue_refs, self.config.claim_timeout))
                .await
            {
                Ok(Some(claimed)) => {
                    consecutive_errors = 0;
                    claimed
                }
                // Bounded-wait timeout, nothing to do
                Ok(None) => continue,
                Err(CircuitError::Open) => {
                    warn!("store circuit is open, backing off");
                    tokio::time::sleep(self.config.circuit_open_backoff).await;
                    continue;
                }
                Err(CircuitError::Failed(e)) => {
                    consecutive_errors += 1;
                    self.metrics.record_unexpected_error();
                    error!(
                        "claim failed (attempt {}): {}",
                        consecutive_errors, e
                    );
                    if consecutive_errors > self.config.max_consecutive_errors {
                        error!("too many consecutive errors, terminating worker");
                        return Err(WorkerError::TooManyErrors(consecutive_errors));
                    }
                    tokio::time::sleep(self.config.error_backoff).await;
                    continue;
                }
            };

            match self.execute(claimed).await {
                Ok(true) => jobs_processed += 1,
                Ok(false) => {}
                Err(e) => {
                    consecutive_errors += 1;
                    self.metrics.record_unexpected_error();
                    error!(
                        "unexpected error in worker loop (attempt {}): {}",
                        consecutive_errors, e
                    );
                    if consecutive_errors > self.config.max_consecutive_errors {
                        error!("too many consecutive errors, terminating worker");
                        return Err(WorkerError::TooManyErrors(consecutive_errors));
                    }
                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }

        info!(
            "worker {} shutting down, processed {} jobs",
            self.worker_id, jobs_processed
        );
        Ok(())
    }

    /// Run one claimed job to a terminal decision. Returns Ok(true) when
    /// the job completed successfully.
    async fn execute(&self, claimed: ClaimedJob) -> StoreResult<bool> {
        let ClaimedJob { job_id, record } = claimed;

        info!("processing job {} ({})", job_id, record.job_type);
        self.set_status(
            &job_id,
            JobStatus::Running,
            0,
            &format!("Started by {}", self.worker_id),
        )
        .await;

        let Some(processor) = self.registry.get(&record.job_type) else {
            let reason = format!("Unknown job type: {}", record.job_type);
            self.retry
                .dead_letter_unresolvable(&self.store, &job_id, &self.worker_id, &reason)
                .await?;
            self.metrics.record_dead_letter(&record.job_type);
            return Ok(false);
        };

        let progress = ProgressHandle::new(self.store.clone(), job_id.clone(), self.worker_id.clone());
        let started = Instant::now();
        let outcome = processor.process(&job_id, &record.payload, &progress).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(true) => {
                self.set_status(
                    &job_id,
                    JobStatus::Completed,
                    100,
                    &format!("Completed in {:.2}s", elapsed.as_secs_f64()),
                )
                .await;
                self.metrics.record_completed(&record.job_type, elapsed);
                info!(
                    "job {} completed in {:.2}s",
                    job_id,
                    elapsed.as_secs_f64()
                );
                Ok(true)
            }
            Ok(false) => {
                self.fail_job(&job_id, &record.job_type, "processor reported failure")
                    .await?;
                Ok(false)
            }
            Err(e) => {
                self.fail_job(&job_id, &record.job_type, &e.to_string())
                    .await?;
                Ok(false)
            }
        }
    }

    async fn fail_job(&self, job_id: &JobId, job_type: &str, error_message: &str) -> StoreResult<()> {
        match self
            .retry
            .handle_failure(&self.store, job_id, &self.worker_id, error_message)
            .await?
        {
            RetryOutcome::Requeued { .. } => self.metrics.record_retry(job_type),
            RetryOutcome::DeadLettered => self.metrics.record_dead_letter(job_type),
        }
        Ok(())
    }

    /// Best-effort status write. A failure is logged and absorbed so it
    /// never derails the loop.
    async fn set_status(&self, job_id: &JobId, status: JobStatus, progress: u8, message: &str) {
        if let Err(e) = self
            .store
            .update(job_id, status, progress, message, Some(&self.worker_id))
            .await
        {
            error!("status update for {} failed: {}", job_id, e);
        }
    }

    /// Heartbeat writes go straight to the store; failures are logged and
    /// absorbed.
    async fn emit_heartbeat(&self) {
        if let Err(e) = self
            .store
            .heartbeat(&self.worker_id, self.config.heartbeat_ttl)
            .await
        {
            error!("heartbeat for {} failed: {}", self.worker_id, e);
        }
    }
}
