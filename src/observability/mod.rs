pub mod metrics;

pub use metrics::{JobTypeMetrics, MetricsSnapshot, WorkerMetrics};
