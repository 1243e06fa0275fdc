//! Worker pool
//!
//! Owns a fixed set of workers, each bound to one channel adapter. A single
//! dispatch loop pulls tasks off a bounded queue, asks the load balancer for
//! an idle worker and runs the task on its own tokio task. Outcomes flow back
//! into the balancer, the upstream pool and the channel selector.

mod dispatch;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::balancer::{DistributionStrategy, LoadBalancer, WorkerProfile};
use crate::channel::AdapterRegistry;
use crate::error::{DispatchError, Result};
use crate::models::{Channel, Priority, Task, TaskResult, TaskStatus, Worker, WorkerStatus};
use crate::selector::{StrategySelector, TaskAnalysis};
use crate::sink::{NoopSink, ResultSink};
use crate::upstream::{UpstreamPool, UpstreamRequirements};

/// How workers are bound to channels at start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerAssignment {
    #[default]
    RoundRobin,
    Random,
}

impl WorkerAssignment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "random" => Self::Random,
            _ => Self::RoundRobin,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Random => "random",
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub queue_capacity: usize,
    /// Bound on each queue poll
    pub poll_timeout: Duration,
    /// Wait after a task is requeued for lack of capacity
    pub backoff: Duration,
    /// Upper bound on a single adapter call
    pub task_timeout: Duration,
    pub assignment: WorkerAssignment,
    pub strategy: DistributionStrategy,
    pub upstream_requirements: UpstreamRequirements,
    pub analysis: TaskAnalysis,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            poll_timeout: Duration::from_millis(100),
            backoff: Duration::from_millis(50),
            task_timeout: Duration::from_secs(30),
            assignment: WorkerAssignment::RoundRobin,
            strategy: DistributionStrategy::Intelligent,
            upstream_requirements: UpstreamRequirements::default(),
            analysis: TaskAnalysis::default(),
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Requested volume across tasks that completed or failed
    pub total_ordered: u64,
    pub total_delivered: u64,
    pub successful: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub pending: usize,
    pub total_workers: usize,
    pub busy_workers: usize,
    pub idle_workers: usize,
    pub worker_distribution: HashMap<Channel, usize>,
    pub avg_worker_success_rate: f64,
    /// Percentage of finished tasks that succeeded
    pub success_rate: f64,
}

/// State shared between the pool handle, the dispatch loop and running tasks
pub(crate) struct Shared {
    pub config: PoolConfig,
    pub registry: AdapterRegistry,
    pub balancer: Arc<LoadBalancer>,
    pub upstreams: Arc<UpstreamPool>,
    pub selector: Arc<StrategySelector>,
    pub sink: Arc<dyn ResultSink>,
    pub workers: DashMap<String, Worker>,
    pub tasks: DashMap<String, Task>,
    pub results: Mutex<Vec<TaskResult>>,
    pub pending: AtomicUsize,
    /// Set by `abort`; the dispatch loop drops in-flight work instead of waiting
    pub aborting: AtomicBool,
    pub total_ordered: AtomicU64,
    pub total_delivered: AtomicU64,
    pub successful: AtomicU64,
    pub failed: AtomicU64,
    pub cancelled: AtomicU64,
    /// Signalled when pending reaches zero
    pub idle: Notify,
    /// Signalled when a worker returns to idle
    pub worker_freed: Notify,
}

impl Shared {
    /// Account for a task that just reached a terminal state
    pub fn finish(&self, status: TaskStatus) {
        match status {
            TaskStatus::Completed => self.successful.fetch_add(1, Ordering::Relaxed),
            TaskStatus::Failed => self.failed.fetch_add(1, Ordering::Relaxed),
            TaskStatus::Cancelled => self.cancelled.fetch_add(1, Ordering::Relaxed),
            _ => return,
        };
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Cancel a task if it is not terminal yet; true when this call cancelled it
    pub fn cancel(&self, task_id: &str) -> Result<bool> {
        let mut task = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| DispatchError::TaskNotFound {
                id: task_id.to_string(),
            })?;
        if task.status.is_terminal() {
            return Ok(false);
        }
        task.transition(TaskStatus::Cancelled)?;
        drop(task);

        self.finish(TaskStatus::Cancelled);
        Ok(true)
    }

    /// Channels an idle worker can take right now; an idle hybrid worker covers all
    pub fn idle_channels(&self) -> Vec<Channel> {
        let mut present = Vec::new();
        for worker in self.workers.iter().filter(|w| w.is_idle()) {
            if worker.channel == Channel::Hybrid {
                return Channel::all().to_vec();
            }
            if !present.contains(&worker.channel) {
                present.push(worker.channel);
            }
        }
        Channel::all()
            .into_iter()
            .filter(|c| present.contains(c))
            .collect()
    }

    /// Whether any worker, busy or not, can run tasks of this channel
    pub fn serves(&self, channel: Channel) -> bool {
        self.workers
            .iter()
            .any(|w| w.channel == channel || w.channel == Channel::Hybrid)
    }
}

struct Running {
    sender: mpsc::Sender<String>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Fixed-size pool of channel-bound workers
pub struct WorkerPool {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl WorkerPool {
    pub fn new(
        config: PoolConfig,
        registry: AdapterRegistry,
        balancer: Arc<LoadBalancer>,
        upstreams: Arc<UpstreamPool>,
        selector: Arc<StrategySelector>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                registry,
                balancer,
                upstreams,
                selector,
                sink: Arc::new(NoopSink),
                workers: DashMap::new(),
                tasks: DashMap::new(),
                results: Mutex::new(Vec::new()),
                pending: AtomicUsize::new(0),
                aborting: AtomicBool::new(false),
                total_ordered: AtomicU64::new(0),
                total_delivered: AtomicU64::new(0),
                successful: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                cancelled: AtomicU64::new(0),
                idle: Notify::new(),
                worker_freed: Notify::new(),
            }),
            running: Mutex::new(None),
        }
    }

    /// Pool with default collaborators around the given adapters
    pub fn with_registry(config: PoolConfig, registry: AdapterRegistry) -> Self {
        Self::new(
            config,
            registry,
            Arc::new(LoadBalancer::default()),
            Arc::new(UpstreamPool::default()),
            Arc::new(StrategySelector::default()),
        )
    }

    /// Install the completion callback; must be called before `start`
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        match Arc::get_mut(&mut self.shared) {
            Some(shared) => shared.sink = sink,
            None => warn!("Result sink ignored: pool state is already shared"),
        }
        self
    }

    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.shared.balancer
    }

    pub fn upstreams(&self) -> &Arc<UpstreamPool> {
        &self.shared.upstreams
    }

    pub fn selector(&self) -> &Arc<StrategySelector> {
        &self.shared.selector
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Create `n` workers and spawn the dispatch loop
    pub fn start(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(DispatchError::InvalidConfig(
                "worker count must be positive".into(),
            ));
        }
        let channels = self.shared.registry.channels();
        if channels.is_empty() {
            return Err(DispatchError::InvalidConfig(
                "no delivery adapters registered".into(),
            ));
        }

        let mut running = self.running.lock();
        if running.is_some() {
            return Err(DispatchError::PoolAlreadyRunning);
        }

        let mut rng = rand::thread_rng();
        for i in 0..n {
            let channel = match self.shared.config.assignment {
                WorkerAssignment::RoundRobin => channels[i % channels.len()],
                WorkerAssignment::Random => *channels.choose(&mut rng).unwrap_or(&channels[0]),
            };
            self.insert_worker(Worker::new(channel));
        }

        let (sender, receiver) = mpsc::channel(self.shared.config.queue_capacity.max(1));
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(dispatch::run(self.shared.clone(), receiver, shutdown_rx));

        *running = Some(Running {
            sender,
            shutdown,
            handle,
        });

        info!(
            "Worker pool started with {} workers ({} assignment)",
            n,
            self.shared.config.assignment.as_str()
        );
        Ok(())
    }

    /// Add a pre-built worker, e.g. one pinned to a region
    pub fn add_worker(&self, worker: Worker) -> Result<String> {
        self.shared.registry.get(worker.channel)?;
        Ok(self.insert_worker(worker))
    }

    fn insert_worker(&self, worker: Worker) -> String {
        let id = worker.id.clone();
        self.shared.balancer.register_worker(WorkerProfile::from(&worker));
        self.shared.workers.insert(id.clone(), worker);
        self.shared.worker_freed.notify_one();
        id
    }

    /// Remove an idle worker; busy workers are left alone
    pub fn remove_worker(&self, worker_id: &str) -> bool {
        let removed = self
            .shared
            .workers
            .remove_if(worker_id, |_, w| w.status == WorkerStatus::Idle)
            .is_some();
        if removed {
            self.shared.balancer.unregister_worker(worker_id);
        }
        removed
    }

    pub fn workers(&self) -> Vec<Worker> {
        self.shared.workers.iter().map(|w| w.value().clone()).collect()
    }

    /// Channels with a registered adapter
    pub fn channels(&self) -> Vec<Channel> {
        self.shared.registry.channels()
    }

    /// Accepted tasks not yet bound to a worker
    pub fn queue_depth(&self) -> usize {
        self.shared
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Queued)
            .count()
    }

    /// Validate and enqueue a task; returns its id
    pub async fn add_task(&self, mut task: Task) -> Result<String> {
        task.validate()?;
        if let Some(channel) = task.channel {
            if !self.shared.serves(channel) {
                return Err(DispatchError::FatalTask(format!(
                    "no worker serves channel {}",
                    channel
                )));
            }
        }
        let sender = self
            .running
            .lock()
            .as_ref()
            .map(|r| r.sender.clone())
            .ok_or(DispatchError::PoolNotRunning)?;

        task.status = TaskStatus::Queued;
        let id = task.id.clone();
        match self.shared.tasks.entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(DispatchError::FatalTask(format!("duplicate task id {}", id)));
            }
            Entry::Vacant(slot) => {
                slot.insert(task);
            }
        }
        self.shared.pending.fetch_add(1, Ordering::AcqRel);

        if sender.send(id.clone()).await.is_err() {
            self.shared.tasks.remove(&id);
            if self.shared.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                self.shared.idle.notify_waiters();
            }
            return Err(DispatchError::PoolNotRunning);
        }
        Ok(id)
    }

    pub async fn add_batch_tasks(&self, tasks: Vec<Task>) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(tasks.len());
        for task in tasks {
            ids.push(self.add_task(task).await?);
        }
        info!("Added {} tasks to queue", ids.len());
        Ok(ids)
    }

    /// Submission entry point for the embedding application
    pub async fn submit(
        &self,
        target: impl Into<String>,
        volume: u64,
        priority: Priority,
        region: Option<String>,
    ) -> Result<String> {
        let mut task = Task::new(target, volume).with_priority(priority);
        task.region = region;
        self.add_task(task).await
    }

    /// Cooperatively cancel a task
    ///
    /// A queued task is skipped by the dispatch loop; a running task's
    /// adapter call is left to finish and its result discarded.
    pub fn cancel(&self, task_id: &str) -> Result<bool> {
        self.shared.cancel(task_id)
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.shared.tasks.get(task_id).map(|t| t.value().clone())
    }

    pub fn results(&self) -> Vec<TaskResult> {
        self.shared.results.lock().clone()
    }

    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Wait until every accepted task is in a terminal state
    pub async fn join(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.shared.pending.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        let mut distribution = HashMap::new();
        let (mut busy, mut rate_sum) = (0, 0.0);
        for worker in shared.workers.iter() {
            *distribution.entry(worker.channel).or_insert(0) += 1;
            if worker.status == WorkerStatus::Busy {
                busy += 1;
            }
            rate_sum += worker.success_rate;
        }
        let total_workers = shared.workers.len();
        let successful = shared.successful.load(Ordering::Relaxed);
        let failed = shared.failed.load(Ordering::Relaxed);
        let finished = successful + failed;

        PoolStats {
            total_ordered: shared.total_ordered.load(Ordering::Relaxed),
            total_delivered: shared.total_delivered.load(Ordering::Relaxed),
            successful,
            failed,
            cancelled: shared.cancelled.load(Ordering::Relaxed),
            pending: shared.pending.load(Ordering::Acquire),
            total_workers,
            busy_workers: busy,
            idle_workers: total_workers - busy,
            worker_distribution: distribution,
            avg_worker_success_rate: if total_workers == 0 {
                0.0
            } else {
                rate_sum / total_workers as f64
            },
            success_rate: if finished == 0 {
                0.0
            } else {
                successful as f64 / finished as f64 * 100.0
            },
        }
    }

    /// Stop the dispatch loop, let in-flight tasks finish and release all workers
    ///
    /// Tasks still waiting in the queue are cancelled.
    pub async fn stop(&self) -> Result<()> {
        let running = self.running.lock().take().ok_or(DispatchError::PoolNotRunning)?;
        info!("Stopping worker pool");

        let _ = running.shutdown.send(true);
        drop(running.sender);
        if let Err(e) = running.handle.await {
            warn!("Dispatch loop ended abnormally: {}", e);
        }

        self.join().await;
        self.release_workers();
        info!("Worker pool stopped");
        Ok(())
    }

    /// Cancel every unfinished task and stop without waiting for adapters
    pub async fn abort(&self) -> Result<()> {
        let running = self.running.lock().take().ok_or(DispatchError::PoolNotRunning)?;
        warn!("Emergency stop: cancelling all unfinished tasks");

        self.shared.aborting.store(true, Ordering::Release);
        let _ = running.shutdown.send(true);
        drop(running.sender);

        let open: Vec<String> = self
            .shared
            .tasks
            .iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id.clone())
            .collect();
        for id in open {
            let _ = self.shared.cancel(&id);
        }

        if let Err(e) = running.handle.await {
            warn!("Dispatch loop ended abnormally: {}", e);
        }
        self.release_workers();
        self.shared.aborting.store(false, Ordering::Release);
        Ok(())
    }

    fn release_workers(&self) {
        self.shared.workers.clear();
        self.shared.balancer.clear();
    }
}
