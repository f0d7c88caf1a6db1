use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::Processor;

/// Maps job type names to processor implementations
///
/// Populated once at worker startup. A claimed job whose type has no entry
/// is a data error and is dead-lettered, not a code branch.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor under its own type name. Re-registering a type
    /// replaces the previous entry.
    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        let job_type = processor.job_type().to_string();
        debug!("registered processor for job type: {}", job_type);
        self.processors.insert(job_type, processor);
    }

    /// Look up the processor for a job type.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn Processor>> {
        self.processors.get(job_type).cloned()
    }

    /// Check if a job type is registered.
    pub fn is_registered(&self, job_type: &str) -> bool {
        self.processors.contains_key(job_type)
    }

    /// All registered job type names.
    pub fn job_types(&self) -> Vec<String> {
        self.processors.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessorError;
    use crate::processor::ProgressHandle;
    use crate::types::JobId;
    use async_trait::async_trait;
    use serde_json::Value;

    struct NoopProcessor;

    #[async_trait]
    impl Processor for NoopProcessor {
        fn job_type(&self) -> &str {
            "noop"
        }

        async fn process(
            &self,
            _job_id: &JobId,
            _payload: &Value,
            _progress: &ProgressHandle,
        ) -> Result<bool, ProcessorError> {
            Ok(true)
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(NoopProcessor));

        assert!(registry.is_registered("noop"));
        assert!(registry.get("noop").is_some());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.job_types(), vec!["noop".to_string()]);
    }
}
