//! Dispatch loop and per-task execution

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, instrument, warn};

use super::Shared;
use crate::channel::{DeliveryReport, DeliveryRequest};
use crate::error::{DispatchError, Result};
use crate::models::{Channel, Task, TaskResult, TaskStatus, WorkerStatus};

/// A task bound to a worker, ready to run
struct Assignment {
    task: Task,
    worker_id: String,
    /// The worker's channel; selects the adapter
    channel: Channel,
}

pub(super) async fn run(
    shared: Arc<Shared>,
    mut receiver: mpsc::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backlog: VecDeque<String> = VecDeque::new();
    let mut inflight = JoinSet::new();
    debug!("Dispatch loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }
        while let Some(joined) = inflight.try_join_next() {
            log_join_error(joined);
        }

        let next = match backlog.pop_front() {
            Some(id) => Some(id),
            None => {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    polled = timeout(shared.config.poll_timeout, receiver.recv()) => match polled {
                        Ok(Some(id)) => Some(id),
                        Ok(None) => break,
                        Err(_) => None,
                    },
                }
            }
        };
        let Some(task_id) = next else {
            continue;
        };

        match assign(&shared, &task_id) {
            Ok(Some(job)) => {
                inflight.spawn(execute(shared.clone(), job));
            }
            Ok(None) => {}
            Err(e) => {
                debug!("Requeued task {}: {}", task_id, e);
                backlog.push_back(task_id);
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = shared.worker_freed.notified() => {}
                    _ = sleep(shared.config.backoff) => {}
                }
            }
        }
    }

    receiver.close();
    while let Ok(id) = receiver.try_recv() {
        backlog.push_back(id);
    }
    let mut dropped = 0;
    for id in backlog {
        if matches!(shared.cancel(&id), Ok(true)) {
            dropped += 1;
        }
    }
    if dropped > 0 {
        warn!("Cancelled {} queued tasks on shutdown", dropped);
    }

    if shared.aborting.load(Ordering::Acquire) {
        inflight.abort_all();
    }
    while let Some(joined) = inflight.join_next().await {
        log_join_error(joined);
    }
    debug!("Dispatch loop stopped");
}

fn log_join_error(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            error!("Task execution panicked outside the adapter: {}", e);
        }
    }
}

/// Bind a queued task to an idle worker
///
/// `Ok(None)` means the task no longer needs dispatching. Errors mean no
/// capacity right now and the task should be retried.
fn assign(shared: &Shared, task_id: &str) -> Result<Option<Assignment>> {
    let mut task = match shared.tasks.get(task_id) {
        Some(t) if t.status == TaskStatus::Queued => t.clone(),
        Some(_) => return Ok(None),
        None => {
            warn!("Dropping unknown task {}", task_id);
            return Ok(None);
        }
    };

    if task.channel.is_none() {
        let available = shared.idle_channels();
        task.channel = shared.selector.predict_optimal_channel(
            &shared.config.analysis,
            task.volume,
            &available,
        );
        if task.channel.is_none() {
            return Err(DispatchError::CapacityExhausted);
        }
    }

    let worker_id = shared
        .balancer
        .distribute_task(&task, shared.config.strategy)
        .ok_or(DispatchError::CapacityExhausted)?;
    if !shared.balancer.acquire(&worker_id) {
        return Err(DispatchError::CapacityExhausted);
    }

    // Claim the worker first so it cannot be removed while the task is bound
    let channel = match shared.workers.get_mut(&worker_id) {
        Some(mut worker) if worker.is_idle() => {
            worker.status = WorkerStatus::Busy;
            worker.current_task = Some(task.id.clone());
            worker.channel
        }
        _ => {
            shared.balancer.release(&worker_id);
            return Err(DispatchError::CapacityExhausted);
        }
    };

    let bound = match shared.tasks.get_mut(task_id) {
        Some(mut entry) => {
            let moved = entry.transition(TaskStatus::Assigned).is_ok();
            if moved {
                entry.channel = task.channel;
            }
            moved
        }
        None => false,
    };
    if !bound {
        // Cancelled or dropped since it was read
        free_worker(shared, &worker_id, None);
        return Ok(None);
    }
    task.status = TaskStatus::Assigned;

    debug!("Assigned task {} to worker {} ({})", task.id, worker_id, channel);
    Ok(Some(Assignment {
        task,
        worker_id,
        channel,
    }))
}

#[instrument(skip_all, fields(task_id = %job.task.id, worker = %job.worker_id))]
async fn execute(shared: Arc<Shared>, job: Assignment) {
    let task_id = job.task.id.clone();
    let started_at = Instant::now();

    let started = shared
        .tasks
        .get_mut(&task_id)
        .map(|mut t| t.transition(TaskStatus::Running).is_ok())
        .unwrap_or(false);
    if !started {
        free_worker(&shared, &job.worker_id, None);
        return;
    }

    let (outcome, upstream) = deliver(&shared, &job).await;
    let duration_ms = started_at.elapsed().as_millis() as u64;

    let cancelled = shared
        .tasks
        .get(&task_id)
        .map_or(true, |t| t.status == TaskStatus::Cancelled);
    if cancelled {
        debug!("Task {} was cancelled while running, result discarded", task_id);
        free_worker(&shared, &job.worker_id, None);
        return;
    }
    let volume = job.task.volume;

    let success = matches!(&outcome, Ok(report) if report.is_complete(volume));
    let delivered = outcome.as_ref().map(|r| r.delivered.min(volume)).unwrap_or(0);
    let error_code = match &outcome {
        Ok(_) if success => None,
        Ok(report) => {
            warn!(
                "Task {} delivered {} of {} on {}",
                task_id, report.delivered, volume, job.channel
            );
            Some(DispatchError::TransientChannelFailure(String::new()).code().to_string())
        }
        Err(e) => {
            warn!("Task {} failed on {}: {}", task_id, job.channel, e);
            Some(e.code().to_string())
        }
    };

    if let Some(address) = &upstream {
        let reported = if success {
            shared
                .upstreams
                .report_success(address, duration_ms as f64 / 1000.0)
        } else {
            shared
                .upstreams
                .report_failure(address, error_code.as_deref())
        };
        if let Err(e) = reported {
            debug!("Upstream outcome not recorded: {}", e);
        }
    }

    shared.selector.learn_from_result(job.channel, success);
    shared
        .balancer
        .record_outcome(&task_id, &job.worker_id, success, duration_ms);
    free_worker(&shared, &job.worker_id, Some(success));

    let status = if success {
        TaskStatus::Completed
    } else {
        TaskStatus::Failed
    };
    let finished = shared
        .tasks
        .get_mut(&task_id)
        .map(|mut t| t.transition(status).is_ok())
        .unwrap_or(false);
    if !finished {
        debug!("Task {} was cancelled while running, result discarded", task_id);
        return;
    }

    shared.results.lock().push(TaskResult {
        task_id: task_id.clone(),
        worker_id: job.worker_id.clone(),
        channel: job.channel,
        success,
        volume,
        delivered,
        duration_ms,
        upstream,
        error_code,
        finished_at: Utc::now(),
    });
    shared.total_ordered.fetch_add(volume, Ordering::Relaxed);
    shared.total_delivered.fetch_add(delivered, Ordering::Relaxed);
    shared
        .sink
        .on_result(&task_id, success, duration_ms, job.channel);
    shared.finish(status);
}

/// Run the adapter with timeout and panic isolation
async fn deliver(
    shared: &Shared,
    job: &Assignment,
) -> (Result<DeliveryReport>, Option<String>) {
    let adapter = match shared.registry.get(job.channel) {
        Ok(adapter) => adapter,
        Err(e) => return (Err(e), None),
    };

    let upstream = if shared.upstreams.is_empty() {
        None
    } else {
        shared.upstreams.get(&shared.config.upstream_requirements)
    };

    let request = DeliveryRequest {
        task_id: job.task.id.clone(),
        target: job.task.target.clone(),
        volume: job.task.volume,
        priority: job.task.priority,
        region: job.task.region.clone(),
        upstream: upstream.clone(),
    };

    let limit = shared.config.task_timeout;
    let outcome = AssertUnwindSafe(timeout(limit, adapter.deliver(&request)))
        .catch_unwind()
        .await;

    let result = match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(DispatchError::TaskTimeout {
            secs: limit.as_secs(),
        }),
        Err(panic) => {
            error!("Adapter {} panicked: {}", job.channel, panic_message(&*panic));
            Err(DispatchError::Internal(format!(
                "adapter panicked: {}",
                panic_message(&*panic)
            )))
        }
    };
    (result, upstream)
}

fn free_worker(shared: &Shared, worker_id: &str, success: Option<bool>) {
    if let Some(mut worker) = shared.workers.get_mut(worker_id) {
        if let Some(success) = success {
            worker.record_outcome(success);
        }
        worker.status = WorkerStatus::Idle;
        worker.current_task = None;
    }
    shared.balancer.release(worker_id);
    shared.worker_freed.notify_one();
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
