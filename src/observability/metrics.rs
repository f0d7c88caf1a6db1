use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

/// In-process counters for one worker
///
/// Exporter wiring lives outside this crate; an external consumer snapshots
/// these counters on its own schedule.
pub struct WorkerMetrics {
    jobs_completed: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_dead_lettered: AtomicU64,
    unexpected_errors: AtomicU64,

    per_type: RwLock<HashMap<String, JobTypeMetrics>>,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self {
            jobs_completed: AtomicU64::new(0),
            jobs_retried: AtomicU64::new(0),
            jobs_dead_lettered: AtomicU64::new(0),
            unexpected_errors: AtomicU64::new(0),
            per_type: RwLock::new(HashMap::new()),
        }
    }

    pub fn record_completed(&self, job_type: &str, elapsed: Duration) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        let mut per_type = self.per_type.write();
        let entry = per_type.entry(job_type.to_string()).or_default();
        entry.completed += 1;
        entry.total_execution_ms += elapsed.as_millis() as u64;
    }

    pub fn record_retry(&self, job_type: &str) {
        self.jobs_retried.fetch_add(1, Ordering::Relaxed);
        self.per_type
            .write()
            .entry(job_type.to_string())
            .or_default()
            .retried += 1;
    }

    pub fn record_dead_letter(&self, job_type: &str) {
        self.jobs_dead_lettered.fetch_add(1, Ordering::Relaxed);
        self.per_type
            .write()
            .entry(job_type.to_string())
            .or_default()
            .dead_lettered += 1;
    }

    pub fn record_unexpected_error(&self) {
        self.unexpected_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn jobs_retried(&self) -> u64 {
        self.jobs_retried.load(Ordering::Relaxed)
    }

    pub fn jobs_dead_lettered(&self) -> u64 {
        self.jobs_dead_lettered.load(Ordering::Relaxed)
    }

    pub fn unexpected_errors(&self) -> u64 {
        self.unexpected_errors.load(Ordering::Relaxed)
    }

    /// Snapshot all counters at a point in time.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_completed: self.jobs_completed(),
            jobs_retried: self.jobs_retried(),
            jobs_dead_lettered: self.jobs_dead_lettered(),
            unexpected_errors: self.unexpected_errors(),
            per_type: self.per_type.read().clone(),
        }
    }
}

impl Default for WorkerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for a single job type
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobTypeMetrics {
    pub completed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub total_execution_ms: u64,
}

impl JobTypeMetrics {
    /// Average execution time across completed jobs, if any completed.
    pub fn average_execution_ms(&self) -> Option<u64> {
        if self.completed == 0 {
            None
        } else {
            Some(self.total_execution_ms / self.completed)
        }
    }
}

/// Point-in-time view of a worker's counters
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub jobs_completed: u64,
    pub jobs_retried: u64,
    pub jobs_dead_lettered: u64,
    pub unexpected_errors: u64,
    pub per_type: HashMap<String, JobTypeMetrics>,
}
