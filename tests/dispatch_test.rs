use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;

use relaypool::channel::{FnAdapter, SimulatedAdapter};
use relaypool::models::{Channel, Priority, Task, TaskStatus, Upstream, UpstreamProtocol};
use relaypool::{
    AdapterRegistry, DeliveryReport, DistributionStrategy, PoolConfig, ResultSink,
    UpstreamPool, UpstreamRequirements, UpstreamStrategy, WorkerPool,
};

#[derive(Default)]
struct CollectingSink {
    seen: Mutex<Vec<(String, bool, Channel)>>,
}

impl ResultSink for CollectingSink {
    fn on_result(&self, task_id: &str, success: bool, _duration_ms: u64, channel: Channel) {
        self.seen.lock().push((task_id.to_string(), success, channel));
    }
}

#[tokio::test]
async fn test_three_workers_single_task() {
    let pool = WorkerPool::with_registry(PoolConfig::default(), AdapterRegistry::simulated(0.5));
    pool.start(3).unwrap();

    pool.add_task(Task::new("single", 1)).await.unwrap();
    pool.join().await;

    let stats = pool.stats();
    assert_eq!(pool.results().len(), 1);
    assert_eq!(stats.total_ordered, 1);
    assert_eq!(stats.successful + stats.failed, 1);
    assert_eq!(stats.pending, 0);

    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_completed_task_reported_once() {
    let sink = Arc::new(CollectingSink::default());
    let pool = WorkerPool::with_registry(PoolConfig::default(), AdapterRegistry::simulated(1.0))
        .with_sink(sink.clone());
    pool.start(2).unwrap();

    let id = pool
        .submit("round-trip", 40, Priority::High, Some("eu".into()))
        .await
        .unwrap();
    pool.join().await;

    let results = pool.results();
    let matching: Vec<_> = results.iter().filter(|r| r.task_id == id).collect();
    assert_eq!(matching.len(), 1);
    assert!(matching[0].success);
    assert_eq!(matching[0].delivered, 40);

    let seen = sink.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, id);
    assert!(seen[0].1);

    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_tasks_only_end_in_terminal_states() {
    let pool = WorkerPool::with_registry(PoolConfig::default(), AdapterRegistry::simulated(0.6));
    pool.start(4).unwrap();

    let mut ids = Vec::new();
    for i in 0..30 {
        let task = Task::new(format!("batch-{}", i), (i as u64 % 7) + 1);
        ids.push(pool.add_task(task).await.unwrap());
    }
    pool.cancel(&ids[29]).unwrap();
    pool.join().await;

    for id in &ids {
        let status = pool.task(id).unwrap().status;
        assert!(status.is_terminal(), "task {} ended as {}", id, status);
    }

    let stats = pool.stats();
    assert_eq!(
        stats.successful + stats.failed + stats.cancelled,
        ids.len() as u64
    );
    assert_eq!(pool.results().len() as u64, stats.successful + stats.failed);

    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_worker_never_runs_two_tasks_at_once() {
    let active: Arc<Mutex<HashSet<String>>> = Arc::default();
    let overlaps: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
    let (a, o) = (active.clone(), overlaps.clone());

    let adapter = FnAdapter::new(Channel::Hybrid, move |req| {
        let (active, overlaps) = (a.clone(), o.clone());
        async move {
            {
                let mut running = active.lock();
                for other in running.iter() {
                    overlaps.lock().push((req.task_id.clone(), other.clone()));
                }
                running.insert(req.task_id.clone());
            }
            tokio::time::sleep(Duration::from_millis(3)).await;
            active.lock().remove(&req.task_id);
            Ok(DeliveryReport {
                delivered: req.volume,
            })
        }
        .boxed()
    });
    let registry = AdapterRegistry::new().register(Arc::new(adapter));
    let config = PoolConfig {
        strategy: DistributionStrategy::Weighted,
        ..PoolConfig::default()
    };
    let pool = WorkerPool::with_registry(config, registry);
    pool.start(3).unwrap();

    for i in 0..24 {
        pool.submit(format!("mx-{}", i), 1, Priority::Normal, None)
            .await
            .unwrap();
    }
    pool.join().await;

    let worker_of: HashMap<String, String> = pool
        .results()
        .into_iter()
        .map(|r| (r.task_id, r.worker_id))
        .collect();
    assert_eq!(worker_of.len(), 24);
    for (x, y) in overlaps.lock().iter() {
        assert_ne!(worker_of[x], worker_of[y], "{} and {} shared a worker", x, y);
    }

    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_explicit_channel_routes_to_matching_worker() {
    let registry = AdapterRegistry::new()
        .register(Arc::new(SimulatedAdapter::new(Channel::Browser, 1.0)))
        .register(Arc::new(SimulatedAdapter::new(Channel::CloudDispatch, 1.0)));
    let pool = WorkerPool::with_registry(PoolConfig::default(), registry);
    pool.start(4).unwrap();

    let id = pool
        .add_task(Task::new("pinned", 5).with_channel(Channel::CloudDispatch))
        .await
        .unwrap();
    let rejected = pool
        .add_task(Task::new("nowhere", 5).with_channel(Channel::DirectApi))
        .await;
    assert!(rejected.is_err());
    pool.join().await;

    let result = pool
        .results()
        .into_iter()
        .find(|r| r.task_id == id)
        .unwrap();
    assert_eq!(result.channel, Channel::CloudDispatch);
    assert_eq!(pool.task(&id).unwrap().status, TaskStatus::Completed);

    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_balancer_history_tracks_outcomes() {
    let pool = WorkerPool::with_registry(PoolConfig::default(), AdapterRegistry::simulated(1.0));
    pool.start(4).unwrap();

    for i in 0..8 {
        pool.submit(format!("h-{}", i), 1, Priority::Low, None)
            .await
            .unwrap();
    }
    pool.join().await;

    let history = pool.balancer().history();
    assert_eq!(history.len(), 8);
    assert!(history.iter().all(|r| r.success == Some(true)));

    let analysis = pool.balancer().analyze_distribution();
    assert!(!analysis.no_data);
    assert_eq!(analysis.recommended_strategy, DistributionStrategy::Intelligent);
    assert!((analysis.overall_success_rate - 100.0).abs() < 1e-9);

    pool.stop().await.unwrap();
}

#[test]
fn test_blacklisted_upstream_never_selected() {
    let pool = UpstreamPool::new(UpstreamStrategy::Random);
    pool.add(Upstream::new("10.0.0.1:3128", UpstreamProtocol::Http));
    let mut banned = Upstream::new("10.0.0.2:3128", UpstreamProtocol::Http);
    banned.blacklisted = true;
    pool.add(banned);

    let requirements = UpstreamRequirements::default();
    for _ in 0..100 {
        assert_eq!(pool.get(&requirements).as_deref(), Some("10.0.0.1:3128"));
    }
}

#[test]
fn test_failures_exclude_until_success() {
    let pool = UpstreamPool::new(UpstreamStrategy::RoundRobin);
    pool.add(Upstream::new("a.example:8080", UpstreamProtocol::Http));
    pool.add(Upstream::new("b.example:8080", UpstreamProtocol::Http));

    for _ in 0..5 {
        pool.report_failure("a.example:8080", Some("refused")).unwrap();
    }
    let requirements = UpstreamRequirements::default();
    for _ in 0..50 {
        assert_eq!(pool.get(&requirements).as_deref(), Some("b.example:8080"));
    }

    pool.report_success("a.example:8080", 0.4).unwrap();
    assert!(!pool.entry("a.example:8080").unwrap().blacklisted);
}
