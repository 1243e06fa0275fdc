use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Channel, GLOBAL_REGION};

/// Worker status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    #[default]
    Idle,
    Busy,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fractional resource usage reported for a worker (0.0 - 1.0)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu: f64,
    pub memory: f64,
    pub bandwidth: f64,
}

impl Default for ResourceUsage {
    fn default() -> Self {
        Self {
            cpu: 0.5,
            memory: 0.5,
            bandwidth: 0.5,
        }
    }
}

impl ResourceUsage {
    /// Lower usage scores higher; floored at 0.1
    pub fn efficiency(&self) -> f64 {
        let cpu = 1.0 - self.cpu.clamp(0.0, 1.0);
        let memory = 1.0 - self.memory.clamp(0.0, 1.0);
        let bandwidth = 1.0 - self.bandwidth.clamp(0.0, 1.0);

        (cpu * 0.4 + memory * 0.3 + bandwidth * 0.3).max(0.1)
    }
}

/// Execution unit bound to one delivery channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub channel: Channel,
    pub region: String,
    pub status: WorkerStatus,
    pub completed: u64,
    pub failed: u64,
    /// Exponential moving average of outcomes (0.9 old / 0.1 new)
    pub success_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    pub resources: ResourceUsage,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

impl Worker {
    pub fn new(channel: Channel) -> Self {
        let now = Utc::now();
        let short = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("worker_{}", &short[..8]),
            channel,
            region: GLOBAL_REGION.to_string(),
            status: WorkerStatus::Idle,
            completed: 0,
            failed: 0,
            success_rate: 1.0,
            current_task: None,
            resources: ResourceUsage::default(),
            created_at: now,
            last_active: now,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn is_idle(&self) -> bool {
        self.status == WorkerStatus::Idle
    }

    /// Fold one outcome into the counters and the moving average
    pub fn record_outcome(&mut self, success: bool) {
        self.last_active = Utc::now();
        self.completed += 1;
        if success {
            self.success_rate = self.success_rate * 0.9 + 0.1;
        } else {
            self.failed += 1;
            self.success_rate *= 0.9;
        }
    }

    /// Success rate with an experience bonus and a failure penalty, clamped to [0.1, 1.0]
    pub fn performance_score(&self) -> f64 {
        let mut score = self.success_rate;

        if self.completed > 10 {
            score += (self.completed as f64 / 100.0).min(0.2);
        }

        let uptime_hours = (Utc::now() - self.created_at).num_seconds() as f64 / 3600.0;
        if uptime_hours > 1.0 {
            score += (uptime_hours / 10.0).min(0.1);
        }

        score -= self.failed as f64 * 0.05;
        score.clamp(0.1, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_moving_average() {
        let mut worker = Worker::new(Channel::Browser);
        assert!(worker.is_idle());
        assert_eq!(worker.success_rate, 1.0);

        worker.record_outcome(false);
        assert!((worker.success_rate - 0.9).abs() < 1e-9);
        assert_eq!(worker.failed, 1);

        worker.record_outcome(true);
        assert!((worker.success_rate - 0.91).abs() < 1e-9);
        assert_eq!(worker.completed, 2);
    }

    #[test]
    fn test_worker_id_format() {
        let worker = Worker::new(Channel::Hybrid);
        assert!(worker.id.starts_with("worker_"));
        assert_eq!(worker.id.len(), "worker_".len() + 8);
        assert_eq!(worker.region, GLOBAL_REGION);
    }

    #[test]
    fn test_performance_score_clamped() {
        let mut worker = Worker::new(Channel::DirectApi);
        for _ in 0..30 {
            worker.record_outcome(false);
        }
        assert_eq!(worker.performance_score(), 0.1);
    }

    #[test]
    fn test_resource_efficiency() {
        let idle = ResourceUsage {
            cpu: 0.0,
            memory: 0.0,
            bandwidth: 0.0,
        };
        assert!((idle.efficiency() - 1.0).abs() < 1e-9);

        let saturated = ResourceUsage {
            cpu: 1.0,
            memory: 1.0,
            bandwidth: 1.0,
        };
        assert_eq!(saturated.efficiency(), 0.1);
        assert!((ResourceUsage::default().efficiency() - 0.5).abs() < 1e-9);
    }
}
