//! Bounded log of distribution decisions and their outcomes

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::DistributionStrategy;
use crate::models::{Channel, Priority};

/// Entries examined by [`DistributionHistory::analyze`]
const ANALYSIS_WINDOW: usize = 500;

/// One distribution decision
#[derive(Debug, Clone, Serialize)]
pub struct DistributionRecord {
    pub task_id: String,
    pub worker_id: String,
    pub strategy: DistributionStrategy,
    pub kind: Option<Channel>,
    pub priority: Priority,
    pub timestamp: DateTime<Utc>,
    /// Filled in once the task reaches a terminal state
    pub success: Option<bool>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StrategyAnalysis {
    pub total_tasks: usize,
    /// Decisions whose outcome is known
    pub finished_tasks: usize,
    /// Percentage over finished tasks
    pub success_rate: f64,
    pub unique_workers: usize,
    pub tasks_per_worker: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributionAnalysis {
    pub no_data: bool,
    pub strategies: HashMap<DistributionStrategy, StrategyAnalysis>,
    pub overall_success_rate: f64,
    pub total_tasks_analyzed: usize,
    pub unique_workers_used: usize,
    pub recommended_strategy: DistributionStrategy,
}

pub(crate) struct DistributionHistory {
    records: VecDeque<DistributionRecord>,
    limit: usize,
}

impl DistributionHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(limit.min(1024)),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, record: DistributionRecord) {
        if self.records.len() == self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn records(&self) -> Vec<DistributionRecord> {
        self.records.iter().cloned().collect()
    }

    /// Attach an outcome to the most recent record for this task
    pub fn record_outcome(&mut self, task_id: &str, success: bool, duration_ms: u64) -> bool {
        match self.records.iter_mut().rev().find(|r| r.task_id == task_id) {
            Some(record) => {
                record.success = Some(success);
                record.duration_ms = Some(duration_ms);
                true
            }
            None => false,
        }
    }

    /// The newest `n` records
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &DistributionRecord> {
        self.records.iter().skip(self.records.len().saturating_sub(n))
    }

    /// Success ratio of a worker over recent same-kind records, if it has any outcomes
    pub fn worker_success(&self, worker_id: &str, kind: Option<Channel>, window: usize) -> Option<f64> {
        let (mut ok, mut total) = (0usize, 0usize);
        for record in self.recent(window) {
            if record.kind != kind || record.worker_id != worker_id {
                continue;
            }
            if let Some(success) = record.success {
                total += 1;
                if success {
                    ok += 1;
                }
            }
        }
        (total > 0).then(|| ok as f64 / total as f64)
    }

    /// Same as [`worker_success`](Self::worker_success) regardless of kind
    pub fn worker_success_any(&self, worker_id: &str, window: usize) -> Option<f64> {
        let outcomes: Vec<bool> = self
            .recent(window)
            .filter(|r| r.worker_id == worker_id)
            .filter_map(|r| r.success)
            .collect();
        if outcomes.is_empty() {
            return None;
        }
        Some(outcomes.iter().filter(|s| **s).count() as f64 / outcomes.len() as f64)
    }

    pub fn analyze(&self) -> DistributionAnalysis {
        if self.records.is_empty() {
            return DistributionAnalysis {
                no_data: true,
                strategies: HashMap::new(),
                overall_success_rate: 0.0,
                total_tasks_analyzed: 0,
                unique_workers_used: 0,
                recommended_strategy: DistributionStrategy::default(),
            };
        }

        struct Acc<'a> {
            total: usize,
            finished: usize,
            successful: usize,
            workers: HashSet<&'a str>,
        }

        let mut per_strategy: HashMap<DistributionStrategy, Acc> = HashMap::new();
        for record in self.recent(ANALYSIS_WINDOW) {
            let acc = per_strategy.entry(record.strategy).or_insert_with(|| Acc {
                total: 0,
                finished: 0,
                successful: 0,
                workers: HashSet::new(),
            });
            acc.total += 1;
            acc.workers.insert(record.worker_id.as_str());
            if let Some(success) = record.success {
                acc.finished += 1;
                if success {
                    acc.successful += 1;
                }
            }
        }

        let mut strategies = HashMap::new();
        let mut all_workers = HashSet::new();
        let (mut total, mut finished, mut successful) = (0, 0, 0);

        for (strategy, acc) in &per_strategy {
            total += acc.total;
            finished += acc.finished;
            successful += acc.successful;
            all_workers.extend(acc.workers.iter().copied());

            strategies.insert(
                *strategy,
                StrategyAnalysis {
                    total_tasks: acc.total,
                    finished_tasks: acc.finished,
                    success_rate: percentage(acc.successful, acc.finished),
                    unique_workers: acc.workers.len(),
                    tasks_per_worker: acc.total as f64 / acc.workers.len().max(1) as f64,
                },
            );
        }

        // Ties resolve in declaration order so the recommendation is stable
        let recommended_strategy = DistributionStrategy::all()
            .into_iter()
            .filter_map(|s| strategies.get(&s).map(|a| (s, a)))
            .filter(|(_, a)| a.finished_tasks > 0)
            .fold(None::<(DistributionStrategy, f64)>, |best, (s, a)| match best {
                Some((_, rate)) if rate >= a.success_rate => best,
                _ => Some((s, a.success_rate)),
            })
            .map(|(s, _)| s)
            .unwrap_or_default();

        DistributionAnalysis {
            no_data: false,
            strategies,
            overall_success_rate: percentage(successful, finished),
            total_tasks_analyzed: total,
            unique_workers_used: all_workers.len(),
            recommended_strategy,
        }
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
