//! Completion notifications for the embedding application

use tracing::{info, warn};

use crate::models::Channel;

/// Receives one call per task that finishes as completed or failed
///
/// Called from the task's execution context; implementations should not block.
pub trait ResultSink: Send + Sync {
    fn on_result(&self, task_id: &str, success: bool, duration_ms: u64, channel: Channel);
}

/// Discards every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ResultSink for NoopSink {
    fn on_result(&self, _task_id: &str, _success: bool, _duration_ms: u64, _channel: Channel) {}
}

/// Logs every notification through tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn on_result(&self, task_id: &str, success: bool, duration_ms: u64, channel: Channel) {
        if success {
            info!(task_id, duration_ms, %channel, "Task completed");
        } else {
            warn!(task_id, duration_ms, %channel, "Task failed");
        }
    }
}
