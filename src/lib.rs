//! # tick-queue: job orchestration for long-running tick-data workloads
//!
//! Core of a distributed job-processing backend: independent worker
//! processes claim work from per-type FIFO queues held in a shared state
//! store, execute registered processors with progress reporting, and
//! escalate failures through a bounded retry ladder into a dead-letter
//! queue. A circuit breaker isolates workers from a flaky store.
//!
//! ## Guarantees
//!
//! - **At-least-once execution**: a claimed job that fails is re-enqueued
//!   until its retry budget is exhausted, then dead-lettered.
//! - **Exclusive claiming**: the store's atomic claim is the only
//!   coordination between workers; a job id is delivered to exactly one
//!   claimer.
//! - **Failure isolation**: store outages trip the breaker instead of
//!   failing jobs; workers fail fast only after a run of unexpected errors.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use tick_queue::prelude::*;
//! use tick_queue::{BreakerConfig, CircuitBreaker, WorkerConfig};
//!
//! struct MigrationProcessor;
//!
//! #[async_trait]
//! impl Processor for MigrationProcessor {
//!     fn job_type(&self) -> &str {
//!         "migration"
//!     }
//!
//!     async fn process(
//!         &self,
//!         _job_id: &JobId,
//!         payload: &serde_json::Value,
//!         progress: &ProgressHandle,
//!     ) -> Result<bool, ProcessorError> {
//!         progress.report(50, "converting chunks").await;
//!         let rows = payload["run_id"].as_i64().unwrap_or(0);
//!         progress.attach_result(json!({"total_rows": rows})).await?;
//!         Ok(true)
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());
//!
//! let mut registry = ProcessorRegistry::new();
//! registry.register(Arc::new(MigrationProcessor));
//!
//! let breaker = CircuitBreaker::new("store", BreakerConfig::default());
//! let worker = Worker::new(store.clone(), Arc::new(registry), breaker, WorkerConfig::default());
//! let handle = worker.spawn();
//!
//! let client = JobClient::new(store);
//! let job_id = client
//!     .submit("migration", "run10_inst643", json!({"run_id": 10}))
//!     .await?;
//! let _record = client.status(&job_id).await?;
//!
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod breaker;
pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod processor;
pub mod retry;
pub mod store;
pub mod types;
pub mod worker;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitError, CircuitState};
pub use client::JobClient;
pub use error::{ProcessorError, StoreError, StoreResult, WorkerError};
pub use observability::{MetricsSnapshot, WorkerMetrics};
pub use processor::{Processor, ProcessorRegistry, ProgressHandle};
pub use retry::{RetryOutcome, RetryPolicy};
pub use store::{memory::MemoryStore, BoxStream, JobStore};
pub use types::{
    ClaimedJob, JobEvent, JobId, JobRecord, JobStatus, ProgressEvent, WorkerId,
};
pub use worker::{Worker, WorkerConfig, WorkerHandle};

/// Common imports for processor implementations and worker entry points
pub mod prelude {
    pub use crate::{
        JobClient, JobId, JobStatus, JobStore, MemoryStore, Processor, ProcessorError,
        ProcessorRegistry, ProgressHandle, Worker, WorkerConfig, WorkerHandle,
    };

    pub use async_trait::async_trait;
}
