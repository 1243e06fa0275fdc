//! Load balancer
//!
//! Chooses which registered worker handles a task. Every decision is logged
//! to a bounded history that later feeds strategy analysis and worker score
//! updates.

mod history;

pub use history::{DistributionAnalysis, DistributionRecord, StrategyAnalysis};

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use history::DistributionHistory;
use crate::models::{Channel, Priority, ResourceUsage, Task, Worker, GLOBAL_REGION};
use crate::selector::{normalize_exploration, DEFAULT_EXPLORATION_RATE};

/// History window used for performance scoring
const PERFORMANCE_WINDOW: usize = 100;

/// Strategy types for task distribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionStrategy {
    RoundRobin,
    Weighted,
    PerformanceBased,
    Geographic,
    #[default]
    Intelligent,
}

impl DistributionStrategy {
    pub fn all() -> [DistributionStrategy; 5] {
        [
            Self::RoundRobin,
            Self::Weighted,
            Self::PerformanceBased,
            Self::Geographic,
            Self::Intelligent,
        ]
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "round_robin" | "roundrobin" | "round-robin" => Self::RoundRobin,
            "weighted" => Self::Weighted,
            "performance_based" | "performance-based" | "performance" => Self::PerformanceBased,
            "geographic" | "geo" => Self::Geographic,
            _ => Self::Intelligent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Weighted => "weighted",
            Self::PerformanceBased => "performance_based",
            Self::Geographic => "geographic",
            Self::Intelligent => "intelligent",
        }
    }
}

impl std::fmt::Display for DistributionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the balancer knows about a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub id: String,
    pub channel: Channel,
    pub region: String,
    /// Task kind this worker is best at
    pub specialty: Option<Channel>,
    pub max_load: u32,
    pub current_load: u32,
    pub success_rate: f64,
    pub available: bool,
    pub resources: ResourceUsage,
    /// Moving average of observed task durations, seconds
    pub avg_response_secs: Option<f64>,
}

impl WorkerProfile {
    pub fn new(id: impl Into<String>, channel: Channel) -> Self {
        Self {
            id: id.into(),
            channel,
            region: GLOBAL_REGION.to_string(),
            specialty: Some(channel),
            max_load: 1,
            current_load: 0,
            success_rate: 0.5,
            available: true,
            resources: ResourceUsage::default(),
            avg_response_secs: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_max_load(mut self, max_load: u32) -> Self {
        self.max_load = max_load.max(1);
        self
    }

    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Hybrid workers accept every kind
    pub fn supports(&self, kind: Option<Channel>) -> bool {
        match kind {
            None => true,
            Some(kind) => self.channel == kind || self.channel == Channel::Hybrid,
        }
    }

    pub fn load_fraction(&self) -> f64 {
        (self.current_load as f64 / self.max_load.max(1) as f64).clamp(0.0, 1.0)
    }

    pub fn has_capacity(&self) -> bool {
        self.available && self.current_load < self.max_load
    }

    /// Lower time scores higher; floored at 0.1
    fn response_time_score(&self) -> f64 {
        let secs = self
            .avg_response_secs
            .unwrap_or_else(|| self.channel.baseline_response_secs());
        (1.0 - secs / 10.0).max(0.1)
    }
}

impl From<&Worker> for WorkerProfile {
    fn from(worker: &Worker) -> Self {
        let mut profile = WorkerProfile::new(worker.id.clone(), worker.channel)
            .with_region(worker.region.clone())
            .with_success_rate(worker.success_rate);
        profile.resources = worker.resources;
        profile
    }
}

struct BalancerState {
    workers: Vec<WorkerProfile>,
    cursors: HashMap<Option<Channel>, usize>,
    history: DistributionHistory,
}

pub struct LoadBalancer {
    state: Mutex<BalancerState>,
    exploration_rate: f64,
}

impl LoadBalancer {
    pub fn new(history_limit: usize) -> Self {
        Self {
            state: Mutex::new(BalancerState {
                workers: Vec::new(),
                cursors: HashMap::new(),
                history: DistributionHistory::new(history_limit),
            }),
            exploration_rate: DEFAULT_EXPLORATION_RATE,
        }
    }

    /// Override the exploration rate of the intelligent strategy
    pub fn with_exploration(mut self, rate: f64) -> Self {
        self.exploration_rate = normalize_exploration(rate);
        self
    }

    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    pub fn register_worker(&self, profile: WorkerProfile) {
        let mut state = self.state.lock();
        debug!("Registered worker {} ({})", profile.id, profile.channel);
        match state.workers.iter_mut().find(|w| w.id == profile.id) {
            Some(existing) => *existing = profile,
            None => state.workers.push(profile),
        }
    }

    pub fn unregister_worker(&self, worker_id: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.workers.len();
        state.workers.retain(|w| w.id != worker_id);
        before != state.workers.len()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.workers.clear();
        state.cursors.clear();
    }

    pub fn worker_count(&self) -> usize {
        self.state.lock().workers.len()
    }

    pub fn profile(&self, worker_id: &str) -> Option<WorkerProfile> {
        self.state
            .lock()
            .workers
            .iter()
            .find(|w| w.id == worker_id)
            .cloned()
    }

    pub fn profiles(&self) -> Vec<WorkerProfile> {
        self.state.lock().workers.clone()
    }

    pub fn set_available(&self, worker_id: &str, available: bool) {
        if let Some(w) = self.state.lock().workers.iter_mut().find(|w| w.id == worker_id) {
            w.available = available;
        }
    }

    pub fn set_resources(&self, worker_id: &str, resources: ResourceUsage) {
        if let Some(w) = self.state.lock().workers.iter_mut().find(|w| w.id == worker_id) {
            w.resources = resources;
        }
    }

    /// Claim one unit of capacity on a worker; false when it has none left
    pub fn acquire(&self, worker_id: &str) -> bool {
        let mut state = self.state.lock();
        match state.workers.iter_mut().find(|w| w.id == worker_id) {
            Some(w) if w.has_capacity() => {
                w.current_load += 1;
                true
            }
            _ => false,
        }
    }

    pub fn release(&self, worker_id: &str) {
        if let Some(w) = self.state.lock().workers.iter_mut().find(|w| w.id == worker_id) {
            w.current_load = w.current_load.saturating_sub(1);
        }
    }

    /// Choose a worker for `task` and log the decision
    pub fn distribute_task(&self, task: &Task, strategy: DistributionStrategy) -> Option<String> {
        let mut state = self.state.lock();
        if state.workers.is_empty() {
            return None;
        }

        let kind = task.channel;
        let suitable: Vec<usize> = state
            .workers
            .iter()
            .enumerate()
            .filter(|(_, w)| w.has_capacity() && w.supports(kind))
            .map(|(i, _)| i)
            .collect();
        if suitable.is_empty() {
            return None;
        }

        let picked = match strategy {
            DistributionStrategy::RoundRobin => round_robin(&mut state, &suitable, kind),
            DistributionStrategy::Weighted => weighted(&state.workers, &suitable),
            DistributionStrategy::PerformanceBased => performance_based(&state, &suitable, kind),
            DistributionStrategy::Geographic => geographic(&state.workers, &suitable, task),
            DistributionStrategy::Intelligent => {
                intelligent(&state, &suitable, task, self.exploration_rate)
            }
        };

        let worker_id = state.workers[picked].id.clone();
        state.history.push(DistributionRecord {
            task_id: task.id.clone(),
            worker_id: worker_id.clone(),
            strategy,
            kind,
            priority: task.priority,
            timestamp: Utc::now(),
            success: None,
            duration_ms: None,
        });

        Some(worker_id)
    }

    /// Attach the outcome to the decision log and fold it into the worker's scores
    pub fn record_outcome(&self, task_id: &str, worker_id: &str, success: bool, duration_ms: u64) {
        let mut state = self.state.lock();
        state.history.record_outcome(task_id, success, duration_ms);

        if let Some(w) = state.workers.iter_mut().find(|w| w.id == worker_id) {
            let outcome = if success { 1.0 } else { 0.0 };
            w.success_rate = w.success_rate * 0.9 + outcome * 0.1;

            let secs = duration_ms as f64 / 1000.0;
            w.avg_response_secs = Some(match w.avg_response_secs {
                Some(avg) => avg * 0.8 + secs * 0.2,
                None => secs,
            });
        }
    }

    pub fn history(&self) -> Vec<DistributionRecord> {
        self.state.lock().history.records()
    }

    pub fn analyze_distribution(&self) -> DistributionAnalysis {
        self.state.lock().history.analyze()
    }

    /// Re-score workers from recent outcomes and return the best strategy so far
    pub fn optimize_distribution(&self) -> DistributionStrategy {
        let mut state = self.state.lock();
        let analysis = state.history.analyze();
        if analysis.no_data {
            return analysis.recommended_strategy;
        }

        let BalancerState {
            workers, history, ..
        } = &mut *state;
        for worker in workers.iter_mut() {
            if let Some(recent) = history.worker_success_any(&worker.id, PERFORMANCE_WINDOW) {
                worker.success_rate = worker.success_rate * 0.7 + recent * 0.3;
            }
        }

        info!(
            "Distribution optimized, best strategy: {}",
            analysis.recommended_strategy
        );
        analysis.recommended_strategy
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new(1000)
    }
}

fn round_robin(state: &mut BalancerState, suitable: &[usize], kind: Option<Channel>) -> usize {
    let cursor = state.cursors.entry(kind).or_insert(0);
    let picked = suitable[*cursor % suitable.len()];
    *cursor = cursor.wrapping_add(1);
    picked
}

fn weighted(workers: &[WorkerProfile], suitable: &[usize]) -> usize {
    let mut rng = rand::thread_rng();
    let weights: Vec<f64> = suitable
        .iter()
        .map(|&i| workers[i].success_rate * (1.0 - workers[i].load_fraction()))
        .collect();

    if weights.iter().sum::<f64>() <= 0.0 {
        return *suitable.choose(&mut rng).unwrap_or(&suitable[0]);
    }

    let pairs: Vec<(usize, f64)> = suitable.iter().copied().zip(weights).collect();
    let picked = pairs
        .choose_weighted(&mut rng, |(_, w)| *w)
        .map(|(i, _)| *i)
        .unwrap_or(suitable[0]);
    picked
}

fn performance_score(state: &BalancerState, worker_id: &str, kind: Option<Channel>) -> f64 {
    state
        .history
        .worker_success(worker_id, kind, PERFORMANCE_WINDOW)
        .unwrap_or(0.5)
}

fn performance_based(state: &BalancerState, suitable: &[usize], kind: Option<Channel>) -> usize {
    let mut best = suitable[0];
    let mut best_score = f64::NEG_INFINITY;
    for &i in suitable {
        let score = performance_score(state, &state.workers[i].id, kind);
        if score > best_score {
            best_score = score;
            best = i;
        }
    }
    best
}

fn geographic(workers: &[WorkerProfile], suitable: &[usize], task: &Task) -> usize {
    let mut rng = rand::thread_rng();
    let region = task.region_or_global();

    let regional: Vec<usize> = if region == GLOBAL_REGION {
        Vec::new()
    } else {
        suitable
            .iter()
            .copied()
            .filter(|&i| workers[i].region == region || workers[i].region == GLOBAL_REGION)
            .collect()
    };

    let pool: &[usize] = if regional.is_empty() { suitable } else { &regional };
    *pool.choose(&mut rng).unwrap_or(&suitable[0])
}

fn intelligent_score(state: &BalancerState, worker: &WorkerProfile, task: &Task) -> f64 {
    let mut success = worker.success_rate * 0.3;
    let load = (1.0 - worker.load_fraction()) * 0.2;
    let response = worker.response_time_score() * 0.15;
    let specialty_match = task.channel.is_some() && worker.specialty == task.channel;
    let affinity_raw = if specialty_match {
        0.9
    } else {
        performance_score(state, &worker.id, task.channel)
    };
    let mut affinity = affinity_raw * 0.2;
    let efficiency = worker.resources.efficiency() * 0.15;

    if task.priority == Priority::High {
        success *= 1.2;
    }
    if specialty_match {
        affinity *= 1.3;
    }

    success + load + response + affinity + efficiency
}

fn intelligent(state: &BalancerState, suitable: &[usize], task: &Task, exploration: f64) -> usize {
    let mut rng = rand::thread_rng();
    if rng.gen_bool(exploration) {
        return *suitable.choose(&mut rng).unwrap_or(&suitable[0]);
    }

    let mut best = suitable[0];
    let mut best_score = f64::NEG_INFINITY;
    for &i in suitable {
        let score = intelligent_score(state, &state.workers[i], task);
        if score > best_score {
            best_score = score;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balancer() -> LoadBalancer {
        LoadBalancer::new(1000).with_exploration(0.0)
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!(
            DistributionStrategy::from_str("round-robin"),
            DistributionStrategy::RoundRobin
        );
        assert_eq!(
            DistributionStrategy::from_str("performance"),
            DistributionStrategy::PerformanceBased
        );
        assert_eq!(DistributionStrategy::from_str("geo"), DistributionStrategy::Geographic);
        assert_eq!(
            DistributionStrategy::from_str("unknown"),
            DistributionStrategy::Intelligent
        );
        assert_eq!(DistributionStrategy::Weighted.as_str(), "weighted");
    }

    #[test]
    fn test_no_workers_returns_none() {
        let lb = balancer();
        assert_eq!(
            lb.distribute_task(&Task::new("job", 1), DistributionStrategy::Intelligent),
            None
        );
    }

    #[test]
    fn test_round_robin_wraps_per_kind() {
        let lb = balancer();
        lb.register_worker(WorkerProfile::new("b1", Channel::Browser));
        lb.register_worker(WorkerProfile::new("b2", Channel::Browser));
        lb.register_worker(WorkerProfile::new("a1", Channel::DirectApi));

        let task = Task::new("job", 1).with_channel(Channel::Browser);
        let picks: Vec<String> = (0..4)
            .filter_map(|_| lb.distribute_task(&task, DistributionStrategy::RoundRobin))
            .collect();
        assert_eq!(picks, vec!["b1", "b2", "b1", "b2"]);

        let api = Task::new("job", 1).with_channel(Channel::DirectApi);
        assert_eq!(
            lb.distribute_task(&api, DistributionStrategy::RoundRobin).as_deref(),
            Some("a1")
        );
    }

    #[test]
    fn test_hybrid_worker_accepts_any_kind() {
        let lb = balancer();
        lb.register_worker(WorkerProfile::new("h1", Channel::Hybrid));
        let task = Task::new("job", 1).with_channel(Channel::CloudDispatch);
        assert_eq!(
            lb.distribute_task(&task, DistributionStrategy::Intelligent).as_deref(),
            Some("h1")
        );
    }

    #[test]
    fn test_acquire_enforces_capacity() {
        let lb = balancer();
        lb.register_worker(WorkerProfile::new("w1", Channel::Browser));

        assert!(lb.acquire("w1"));
        assert!(!lb.acquire("w1"));
        assert_eq!(
            lb.distribute_task(&Task::new("job", 1), DistributionStrategy::RoundRobin),
            None
        );

        lb.release("w1");
        assert!(lb.acquire("w1"));
        assert!(!lb.acquire("missing"));
    }

    #[test]
    fn test_unavailable_workers_skipped() {
        let lb = balancer();
        lb.register_worker(WorkerProfile::new("w1", Channel::Browser));
        lb.register_worker(WorkerProfile::new("w2", Channel::Browser));
        lb.set_available("w1", false);

        for _ in 0..20 {
            assert_eq!(
                lb.distribute_task(&Task::new("job", 1), DistributionStrategy::Weighted)
                    .as_deref(),
                Some("w2")
            );
        }
    }

    #[test]
    fn test_weighted_prefers_healthy_idle_worker() {
        let lb = balancer();
        lb.register_worker(
            WorkerProfile::new("a", Channel::Browser)
                .with_max_load(4)
                .with_success_rate(1.0),
        );
        lb.register_worker(
            WorkerProfile::new("b", Channel::Browser)
                .with_max_load(4)
                .with_success_rate(0.0),
        );

        let task = Task::new("job", 1);
        let mut a = 0;
        for _ in 0..10_000 {
            if lb.distribute_task(&task, DistributionStrategy::Weighted).as_deref() == Some("a") {
                a += 1;
            }
        }
        assert_eq!(a, 10_000);
    }

    #[test]
    fn test_weighted_zero_weights_fall_back_to_uniform() {
        let lb = balancer();
        lb.register_worker(WorkerProfile::new("a", Channel::Browser).with_success_rate(0.0));
        lb.register_worker(WorkerProfile::new("b", Channel::Browser).with_success_rate(0.0));

        let task = Task::new("job", 1);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(lb.distribute_task(&task, DistributionStrategy::Weighted).unwrap());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_performance_based_uses_history() {
        let lb = balancer();
        lb.register_worker(WorkerProfile::new("w1", Channel::Browser).with_max_load(100));
        lb.register_worker(WorkerProfile::new("w2", Channel::Browser).with_max_load(100));

        // With no history both score 0.5 and the first wins
        let task = Task::new("job", 1).with_channel(Channel::Browser);
        assert_eq!(
            lb.distribute_task(&task, DistributionStrategy::PerformanceBased).as_deref(),
            Some("w1")
        );
        lb.record_outcome(&task.id, "w1", false, 100);

        let second = Task::new("job", 1).with_channel(Channel::Browser);
        assert_eq!(
            lb.distribute_task(&second, DistributionStrategy::PerformanceBased)
                .as_deref(),
            Some("w2")
        );
    }

    #[test]
    fn test_geographic_prefers_region_then_falls_back() {
        let lb = balancer();
        lb.register_worker(WorkerProfile::new("us", Channel::Browser).with_region("us"));
        lb.register_worker(WorkerProfile::new("eu", Channel::Browser).with_region("eu"));

        let eu_task = Task::new("job", 1).with_region("eu");
        for _ in 0..50 {
            assert_eq!(
                lb.distribute_task(&eu_task, DistributionStrategy::Geographic).as_deref(),
                Some("eu")
            );
        }

        let apac_task = Task::new("job", 1).with_region("apac");
        assert!(lb
            .distribute_task(&apac_task, DistributionStrategy::Geographic)
            .is_some());
    }

    #[test]
    fn test_geographic_accepts_global_workers() {
        let lb = balancer();
        lb.register_worker(WorkerProfile::new("us", Channel::Browser).with_region("us"));
        lb.register_worker(WorkerProfile::new("anywhere", Channel::Browser));

        let task = Task::new("job", 1).with_region("eu");
        for _ in 0..50 {
            assert_eq!(
                lb.distribute_task(&task, DistributionStrategy::Geographic).as_deref(),
                Some("anywhere")
            );
        }
    }

    #[test]
    fn test_intelligent_prefers_specialty_and_success() {
        let lb = balancer();
        lb.register_worker(WorkerProfile::new("hybrid", Channel::Hybrid).with_success_rate(0.9));
        lb.register_worker(WorkerProfile::new("api", Channel::DirectApi).with_success_rate(0.9));

        let task = Task::new("job", 1).with_channel(Channel::DirectApi);
        assert_eq!(
            lb.distribute_task(&task, DistributionStrategy::Intelligent).as_deref(),
            Some("api")
        );

        lb.register_worker(WorkerProfile::new("weak", Channel::DirectApi).with_success_rate(0.1));
        let task = Task::new("job", 1).with_channel(Channel::DirectApi);
        assert_eq!(
            lb.distribute_task(&task, DistributionStrategy::Intelligent).as_deref(),
            Some("api")
        );
    }

    #[test]
    fn test_history_records_decisions() {
        let lb = balancer();
        lb.register_worker(WorkerProfile::new("w1", Channel::Browser).with_max_load(10));

        let task = Task::new("job", 1).with_priority(Priority::High);
        lb.distribute_task(&task, DistributionStrategy::RoundRobin);

        let history = lb.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].task_id, task.id);
        assert_eq!(history[0].worker_id, "w1");
        assert_eq!(history[0].strategy, DistributionStrategy::RoundRobin);
        assert_eq!(history[0].priority, Priority::High);
    }

    #[test]
    fn test_history_bounded_at_limit() {
        let lb = LoadBalancer::new(10).with_exploration(0.0);
        lb.register_worker(WorkerProfile::new("w1", Channel::Browser).with_max_load(100));
        for _ in 0..25 {
            lb.distribute_task(&Task::new("job", 1), DistributionStrategy::RoundRobin);
        }
        assert_eq!(lb.history().len(), 10);
    }

    #[test]
    fn test_record_outcome_updates_profile() {
        let lb = balancer();
        lb.register_worker(WorkerProfile::new("w1", Channel::Browser).with_success_rate(0.5));
        let task = Task::new("job", 1);
        lb.distribute_task(&task, DistributionStrategy::RoundRobin);
        lb.record_outcome(&task.id, "w1", true, 2000);

        let profile = lb.profile("w1").unwrap();
        assert!((profile.success_rate - 0.55).abs() < 1e-9);
        assert_eq!(profile.avg_response_secs, Some(2.0));
        assert_eq!(lb.history()[0].success, Some(true));
    }

    #[test]
    fn test_optimize_blends_recent_success() {
        let lb = balancer();
        lb.register_worker(
            WorkerProfile::new("w1", Channel::Browser)
                .with_max_load(10)
                .with_success_rate(0.5),
        );
        assert_eq!(lb.optimize_distribution(), DistributionStrategy::Intelligent);

        let task = Task::new("job", 1);
        lb.distribute_task(&task, DistributionStrategy::Weighted);
        lb.record_outcome(&task.id, "w1", true, 10);
        // record_outcome: 0.5*0.9 + 0.1 = 0.55
        assert_eq!(lb.optimize_distribution(), DistributionStrategy::Weighted);
        // optimize: 0.55*0.7 + 1.0*0.3 = 0.685
        assert!((lb.profile("w1").unwrap().success_rate - 0.685).abs() < 1e-9);

        let analysis = lb.analyze_distribution();
        assert_eq!(analysis.total_tasks_analyzed, 1);
    }

    #[test]
    fn test_unregister_worker() {
        let lb = balancer();
        lb.register_worker(WorkerProfile::new("w1", Channel::Browser));
        assert!(lb.unregister_worker("w1"));
        assert!(!lb.unregister_worker("w1"));
        assert_eq!(lb.worker_count(), 0);
    }

    #[test]
    fn test_non_finite_exploration_uses_default() {
        for rate in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let lb = LoadBalancer::new(10).with_exploration(rate);
            assert_eq!(lb.exploration_rate(), DEFAULT_EXPLORATION_RATE);
        }
        assert_eq!(LoadBalancer::new(10).with_exploration(2.5).exploration_rate(), 1.0);

        // Intelligent distribution still works with a NaN rate
        let lb = LoadBalancer::new(10).with_exploration(f64::NAN);
        lb.register_worker(WorkerProfile::new("w1", Channel::DirectApi));
        let task = Task::new("t", 1).with_channel(Channel::DirectApi);
        assert_eq!(
            lb.distribute_task(&task, DistributionStrategy::Intelligent).as_deref(),
            Some("w1")
        );
    }
}
