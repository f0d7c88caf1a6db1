use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Infrastructure errors for the shared state store
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Processor execution error - any raised error escalates the retry ladder
#[derive(Error, Debug, Clone)]
pub enum ProcessorError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{0}")]
    Failed(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ProcessorError {
    /// Create an execution failure
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Create a payload error
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }
}

/// Worker-fatal conditions that terminate the dispatcher loop
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("worker terminated after {0} consecutive unexpected errors")]
    TooManyErrors(u32),

    #[error("worker join error: {0}")]
    Join(String),
}
