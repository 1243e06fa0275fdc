//! Worker scaling service
//!
//! Grows the pool when the queue backs up, shrinks it by dropping the weakest
//! idle workers when it drains, and restarts idle workers that have been
//! inactive for too long.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::models::{Channel, Worker};
use crate::pool::WorkerPool;

/// Workers removed per scale-down pass
const SCALE_DOWN_STEP: usize = 2;

/// Resource usage above which a worker is reported as overloaded
const HIGH_USAGE: f64 = 0.9;

/// Worker scaling service configuration
#[derive(Debug, Clone)]
pub struct WorkerScalingConfig {
    /// How often to check the queue (in seconds)
    pub check_interval_secs: u64,
    /// How often to check worker health (in seconds)
    pub health_interval_secs: u64,
    /// Scale-down floor
    pub min_workers: usize,
    /// Scale-up ceiling
    pub max_workers: usize,
    /// One worker is added per this many queued tasks
    pub tasks_per_worker: usize,
    /// Scale up once the queue exceeds this many tasks per worker
    pub backlog_per_worker: usize,
    /// Idle workers inactive longer than this are restarted
    pub max_idle_secs: u64,
}

impl Default for WorkerScalingConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 5,
            health_interval_secs: 60,
            min_workers: 5,
            max_workers: 50,
            tasks_per_worker: 10,
            backlog_per_worker: 5,
            max_idle_secs: 300, // 5 minutes
        }
    }
}

/// Outcome of one autoscaling check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleAction {
    Up(usize),
    Down(usize),
    Hold,
}

pub struct WorkerScalingService {
    pool: Arc<WorkerPool>,
    config: WorkerScalingConfig,
}

impl WorkerScalingService {
    pub fn new(pool: Arc<WorkerPool>, config: WorkerScalingConfig) -> Self {
        Self { pool, config }
    }

    /// Run until the shutdown flag flips to true
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting worker scaling service ({}..={} workers, every {}s)",
            self.config.min_workers, self.config.max_workers, self.config.check_interval_secs
        );

        let mut scale_interval =
            interval(Duration::from_secs(self.config.check_interval_secs.max(1)));
        let mut health_interval =
            interval(Duration::from_secs(self.config.health_interval_secs.max(1)));
        scale_interval.tick().await; // Skip immediate tick
        health_interval.tick().await;

        loop {
            tokio::select! {
                _ = scale_interval.tick() => {
                    if let Err(e) = self.autoscale() {
                        error!("Autoscaling failed: {}", e);
                    }
                }
                _ = health_interval.tick() => {
                    if let Err(e) = self.health_check() {
                        error!("Worker health check failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Worker scaling service shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Compare queue depth with the worker count and scale once
    pub fn autoscale(&self) -> Result<ScaleAction> {
        if !self.pool.is_running() {
            return Ok(ScaleAction::Hold);
        }
        let queued = self.pool.queue_depth();
        let workers = self.pool.workers().len();

        if queued > workers * self.config.backlog_per_worker {
            let added = self.scale_up()?;
            if added > 0 {
                return Ok(ScaleAction::Up(added));
            }
        } else if queued < workers && workers > self.config.min_workers {
            let removed = self.scale_down();
            if removed > 0 {
                return Ok(ScaleAction::Down(removed));
            }
        }
        Ok(ScaleAction::Hold)
    }

    /// Add one worker per `tasks_per_worker` queued tasks, up to `max_workers`
    pub fn scale_up(&self) -> Result<usize> {
        let mut workers = self.pool.workers();
        if workers.len() >= self.config.max_workers {
            return Ok(0);
        }
        let needed = (self.pool.queue_depth() / self.config.tasks_per_worker.max(1))
            .min(self.config.max_workers - workers.len());
        if needed == 0 {
            return Ok(0);
        }

        let channels = self.pool.channels();
        let mut added = 0;
        while added < needed {
            let Some(channel) = least_served(&channels, &workers) else {
                break;
            };
            let worker = Worker::new(channel);
            self.pool.add_worker(worker.clone())?;
            workers.push(worker);
            added += 1;
        }
        info!("Scaled up: added {} workers", added);
        Ok(added)
    }

    /// Drop the lowest-scoring idle workers, never going below `min_workers`
    pub fn scale_down(&self) -> usize {
        let mut workers = self.pool.workers();
        if workers.len() <= self.config.min_workers {
            return 0;
        }
        let budget = SCALE_DOWN_STEP.min(workers.len() - self.config.min_workers);

        workers.retain(|w| w.is_idle());
        workers.sort_by(|a, b| {
            a.performance_score()
                .partial_cmp(&b.performance_score())
                .unwrap_or(Ordering::Equal)
        });

        let mut removed = 0;
        for worker in workers {
            if removed == budget {
                break;
            }
            if self.pool.remove_worker(&worker.id) {
                info!(
                    "Removed low-performing worker {} (score {:.2})",
                    worker.id,
                    worker.performance_score()
                );
                removed += 1;
            }
        }
        removed
    }

    /// Restart idle workers inactive past the limit; returns how many were replaced
    pub fn health_check(&self) -> Result<usize> {
        let now = Utc::now();
        let limit = i64::try_from(self.config.max_idle_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);

        let mut restarted = 0;
        for worker in self.pool.workers() {
            if worker.resources.cpu > HIGH_USAGE || worker.resources.memory > HIGH_USAGE {
                warn!("Worker {} has high resource usage", worker.id);
            }
            if !worker.is_idle() || now - worker.last_active <= limit {
                continue;
            }

            let replacement = Worker::new(worker.channel).with_region(worker.region.clone());
            let new_id = self.pool.add_worker(replacement)?;
            if self.pool.remove_worker(&worker.id) {
                info!("Restarted inactive worker {} as {}", worker.id, new_id);
                restarted += 1;
            } else {
                // Picked up work in the meantime
                self.pool.remove_worker(&new_id);
            }
        }

        if restarted == 0 {
            debug!("All workers healthy");
        }
        Ok(restarted)
    }
}

/// Channel with the fewest workers, in registry order on ties
fn least_served(channels: &[Channel], workers: &[Worker]) -> Option<Channel> {
    channels
        .iter()
        .copied()
        .min_by_key(|c| workers.iter().filter(|w| w.channel == *c).count())
}

/// Handle for managing the worker scaling service
pub struct WorkerScalingHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerScalingHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for WorkerScalingHandle {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{AdapterRegistry, DeliveryReport, FnAdapter};
    use crate::models::{Priority, WorkerStatus};
    use crate::pool::PoolConfig;
    use futures::FutureExt;

    fn slow_pool() -> Arc<WorkerPool> {
        let adapter = FnAdapter::new(Channel::DirectApi, |req| {
            async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(DeliveryReport {
                    delivered: req.volume,
                })
            }
            .boxed()
        });
        let registry = AdapterRegistry::new().register(Arc::new(adapter));
        Arc::new(WorkerPool::with_registry(PoolConfig::default(), registry))
    }

    fn idle_pool() -> Arc<WorkerPool> {
        Arc::new(WorkerPool::with_registry(
            PoolConfig::default(),
            AdapterRegistry::simulated(1.0),
        ))
    }

    fn worker_with_rate(rate: f64) -> Worker {
        let mut worker = Worker::new(Channel::Browser);
        worker.success_rate = rate;
        worker
    }

    #[test]
    fn test_config_default() {
        let config = WorkerScalingConfig::default();
        assert_eq!(config.min_workers, 5);
        assert_eq!(config.tasks_per_worker, 10);
        assert_eq!(config.max_idle_secs, 300);
    }

    #[tokio::test]
    async fn test_scale_up_one_worker_per_ten_queued() {
        let pool = slow_pool();
        pool.start(1).unwrap();
        for i in 0..35 {
            pool.submit(format!("q-{}", i), 1, Priority::Normal, None)
                .await
                .unwrap();
        }

        let capped = WorkerScalingService::new(
            pool.clone(),
            WorkerScalingConfig {
                min_workers: 1,
                max_workers: 2,
                ..Default::default()
            },
        );
        assert_eq!(capped.scale_up().unwrap(), 1);
        assert_eq!(capped.scale_up().unwrap(), 0);
        assert_eq!(pool.workers().len(), 2);

        let roomy = WorkerScalingService::new(
            pool.clone(),
            WorkerScalingConfig {
                min_workers: 1,
                max_workers: 10,
                ..Default::default()
            },
        );
        // At most two tasks left the queue, so 33..=35 are still waiting
        assert_eq!(roomy.scale_up().unwrap(), 3);
        assert_eq!(pool.workers().len(), 5);
        assert!(pool.workers().iter().all(|w| w.channel == Channel::DirectApi));

        pool.abort().await.unwrap();
    }

    #[tokio::test]
    async fn test_scale_down_removes_weakest_idle_and_keeps_floor() {
        let pool = idle_pool();
        let weakest = pool
            .add_worker(Worker {
                status: WorkerStatus::Busy,
                ..worker_with_rate(0.2)
            })
            .unwrap();
        let weak = pool.add_worker(worker_with_rate(0.3)).unwrap();
        let middling = pool.add_worker(worker_with_rate(0.6)).unwrap();
        let strong = pool.add_worker(worker_with_rate(0.9)).unwrap();
        let strongest = pool.add_worker(worker_with_rate(1.0)).unwrap();

        let service = WorkerScalingService::new(
            pool.clone(),
            WorkerScalingConfig {
                min_workers: 3,
                ..Default::default()
            },
        );
        assert_eq!(service.scale_down(), 2);

        let mut left: Vec<String> = pool.workers().into_iter().map(|w| w.id).collect();
        left.sort();
        let mut expected = vec![weakest, strong, strongest];
        expected.sort();
        assert_eq!(left, expected);
        assert!(pool.balancer().profile(&weak).is_none());
        assert!(pool.balancer().profile(&middling).is_none());

        assert_eq!(service.scale_down(), 0);
        assert_eq!(pool.workers().len(), 3);
    }

    #[tokio::test]
    async fn test_health_check_restarts_inactive_idle_workers() {
        let pool = idle_pool();
        let long_ago = Utc::now() - chrono::Duration::minutes(10);

        let mut stale = Worker::new(Channel::CloudDispatch).with_region("eu");
        stale.last_active = long_ago;
        let stale_id = pool.add_worker(stale).unwrap();

        let mut busy = Worker::new(Channel::Browser);
        busy.last_active = long_ago;
        busy.status = WorkerStatus::Busy;
        let busy_id = pool.add_worker(busy).unwrap();

        let fresh_id = pool.add_worker(Worker::new(Channel::DirectApi)).unwrap();

        let service = WorkerScalingService::new(pool.clone(), WorkerScalingConfig::default());
        assert_eq!(service.health_check().unwrap(), 1);

        let workers = pool.workers();
        assert_eq!(workers.len(), 3);
        assert!(workers.iter().all(|w| w.id != stale_id));
        assert!(workers.iter().any(|w| w.id == busy_id));
        assert!(workers.iter().any(|w| w.id == fresh_id));
        assert!(workers
            .iter()
            .any(|w| w.channel == Channel::CloudDispatch && w.region == "eu"));

        assert_eq!(service.health_check().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_autoscale_shrinks_drained_pool() {
        let pool = idle_pool();
        let service = WorkerScalingService::new(
            pool.clone(),
            WorkerScalingConfig {
                min_workers: 2,
                ..Default::default()
            },
        );
        assert_eq!(service.autoscale().unwrap(), ScaleAction::Hold);

        pool.start(5).unwrap();
        assert_eq!(service.autoscale().unwrap(), ScaleAction::Down(2));
        assert_eq!(service.autoscale().unwrap(), ScaleAction::Down(1));
        assert_eq!(service.autoscale().unwrap(), ScaleAction::Hold);
        assert_eq!(pool.workers().len(), 2);

        pool.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let service = WorkerScalingService::new(
            idle_pool(),
            WorkerScalingConfig {
                check_interval_secs: 1,
                ..Default::default()
            },
        );
        let (handle, shutdown) = WorkerScalingHandle::new();

        let task = tokio::spawn(async move { service.run(shutdown).await });
        handle.shutdown();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("service did not stop")
            .unwrap();
    }
}
