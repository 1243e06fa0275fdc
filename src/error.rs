use thiserror::Error;

use crate::models::TaskStatus;

/// Unified error type for relaypool
#[derive(Error, Debug)]
pub enum DispatchError {
    // Failure taxonomy surfaced on task results
    #[error("Transient channel failure: {0}")]
    TransientChannelFailure(String),

    #[error("No idle worker available")]
    CapacityExhausted,

    #[error("Resource is blacklisted: {0}")]
    BlacklistedResource(String),

    #[error("Fatal task error: {0}")]
    FatalTask(String),

    // Upstream errors
    #[error("No upstreams available")]
    NoUpstreamsAvailable,

    #[error("Upstream not found: {address}")]
    UpstreamNotFound { address: String },

    #[error("Invalid upstream address: {0}")]
    InvalidUpstreamAddress(String),

    // Task lifecycle errors
    #[error("Invalid task transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    #[error("Task timed out after {secs}s")]
    TaskTimeout { secs: u64 },

    // Pool lifecycle errors
    #[error("Worker pool is not running")]
    PoolNotRunning,

    #[error("Worker pool is already running")]
    PoolAlreadyRunning,

    #[error("No adapter registered for channel {0}")]
    AdapterMissing(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for relaypool operations
pub type Result<T> = std::result::Result<T, DispatchError>;

impl DispatchError {
    /// Stable taxonomy code reported on failed task results
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::TransientChannelFailure(_)
            | DispatchError::NoUpstreamsAvailable
            | DispatchError::TaskTimeout { .. } => "transient_channel_failure",

            DispatchError::CapacityExhausted => "capacity_exhausted",

            DispatchError::BlacklistedResource(_) => "blacklisted_resource",

            DispatchError::FatalTask(_)
            | DispatchError::InvalidTransition { .. }
            | DispatchError::AdapterMissing(_) => "fatal_task_error",

            DispatchError::UpstreamNotFound { .. }
            | DispatchError::TaskNotFound { .. } => "not_found",

            DispatchError::InvalidUpstreamAddress(_) | DispatchError::InvalidConfig(_) => {
                "invalid_input"
            }

            DispatchError::PoolNotRunning | DispatchError::PoolAlreadyRunning => "pool_state",

            DispatchError::Io(_) | DispatchError::Json(_) | DispatchError::Internal(_) => {
                "internal_error"
            }
        }
    }

    /// Whether a fresh attempt (on another upstream or channel) may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::TransientChannelFailure(_)
                | DispatchError::CapacityExhausted
                | DispatchError::NoUpstreamsAvailable
                | DispatchError::TaskTimeout { .. }
        )
    }

    /// Whether the task must be failed immediately
    pub fn is_fatal(&self) -> bool {
        self.code() == "fatal_task_error"
    }
}

impl From<url::ParseError> for DispatchError {
    fn from(err: url::ParseError) -> Self {
        DispatchError::InvalidUpstreamAddress(err.to_string())
    }
}
