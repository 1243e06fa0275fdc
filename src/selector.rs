//! Channel selector
//!
//! An online bandit-style heuristic: static compatibility scores are nudged
//! by task volume, risk and urgency, then weighted by each channel's learned
//! success rate. Statistics are kept in an immutable snapshot that is swapped
//! atomically after each outcome.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::Channel;

/// Success rate assumed for a channel with no samples
pub const DEFAULT_SUCCESS_RATE: f64 = 0.5;

/// Exploration rate used when none (or a non-finite one) is given
pub const DEFAULT_EXPLORATION_RATE: f64 = 0.1;

/// Clamp into [0, 1]; NaN and infinities fall back to the default
pub(crate) fn normalize_exploration(rate: f64) -> f64 {
    if rate.is_finite() {
        rate.clamp(0.0, 1.0)
    } else {
        DEFAULT_EXPLORATION_RATE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    #[default]
    Medium,
    High,
}

/// Inputs describing a task for channel prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskAnalysis {
    /// Base compatibility per underlying channel; hybrid is derived
    pub compatibility: HashMap<Channel, f64>,
    pub risk: Level,
    pub time_sensitivity: Level,
}

impl Default for TaskAnalysis {
    fn default() -> Self {
        Self {
            compatibility: HashMap::from([
                (Channel::Browser, 0.9),
                (Channel::DirectApi, 0.85),
                (Channel::CloudDispatch, 0.95),
            ]),
            risk: Level::Medium,
            time_sensitivity: Level::Medium,
        }
    }
}

/// Learned statistics for one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    /// Exponential moving average, 0.9 old / 0.1 new, kept in [0.1, 1.0]
    pub success_rate: f64,
    pub sample_count: u64,
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self {
            success_rate: DEFAULT_SUCCESS_RATE,
            sample_count: 0,
        }
    }
}

pub struct StrategySelector {
    stats: ArcSwap<HashMap<Channel, ChannelStats>>,
    exploration_rate: f64,
}

impl StrategySelector {
    pub fn new(exploration_rate: f64) -> Self {
        Self {
            stats: ArcSwap::from_pointee(HashMap::new()),
            exploration_rate: normalize_exploration(exploration_rate),
        }
    }

    pub fn exploration_rate(&self) -> f64 {
        self.exploration_rate
    }

    /// Score every channel for the given analysis and volume
    pub fn score_channels(&self, analysis: &TaskAnalysis, volume: u64) -> HashMap<Channel, f64> {
        let base = |c: Channel, default: f64| analysis.compatibility.get(&c).copied().unwrap_or(default);
        let mut browser = base(Channel::Browser, 0.9);
        let mut api = base(Channel::DirectApi, 0.85);
        let mut cloud = base(Channel::CloudDispatch, 0.95);

        match volume {
            0..=100 => browser *= 1.1,
            101..=1000 => api *= 1.1,
            _ => cloud *= 1.1,
        }

        if analysis.risk == Level::High {
            browser *= 0.8;
            cloud *= 1.2;
        }

        match analysis.time_sensitivity {
            Level::High => api *= 1.2,
            Level::Low => browser *= 1.1,
            Level::Medium => {}
        }

        let hybrid = browser * 0.3 + api * 0.3 + cloud * 0.4;

        let stats = self.stats.load();
        let learned = |c: Channel| {
            stats
                .get(&c)
                .map(|s| s.success_rate)
                .unwrap_or(DEFAULT_SUCCESS_RATE)
        };

        HashMap::from([
            (Channel::Browser, browser * learned(Channel::Browser)),
            (Channel::DirectApi, api * learned(Channel::DirectApi)),
            (Channel::CloudDispatch, cloud * learned(Channel::CloudDispatch)),
            (Channel::Hybrid, hybrid * learned(Channel::Hybrid)),
        ])
    }

    /// Pick a channel among `available`, exploring at the configured rate
    ///
    /// Returns `None` only when `available` is empty.
    pub fn predict_optimal_channel(
        &self,
        analysis: &TaskAnalysis,
        volume: u64,
        available: &[Channel],
    ) -> Option<Channel> {
        if available.is_empty() {
            return None;
        }

        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.exploration_rate) {
            return available.choose(&mut rng).copied();
        }

        let scores = self.score_channels(analysis, volume);
        let mut best: Option<(Channel, f64)> = None;
        for channel in available {
            let score = scores.get(channel).copied().unwrap_or(0.0);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((*channel, score));
            }
        }

        let choice = best.map(|(c, _)| c);
        if let Some((channel, score)) = best {
            debug!("Selected channel {} (score {:.3})", channel, score);
        }
        choice
    }

    /// Fold one outcome into the channel's moving average
    pub fn learn_from_result(&self, channel: Channel, success: bool) {
        self.stats.rcu(|current| {
            let mut next = HashMap::clone(current);
            let entry = next.entry(channel).or_default();
            entry.success_rate = if success {
                (entry.success_rate * 0.9 + 0.1).min(1.0)
            } else {
                (entry.success_rate * 0.9).max(0.1)
            };
            entry.sample_count += 1;
            next
        });
    }

    pub fn stats_for(&self, channel: Channel) -> ChannelStats {
        self.stats.load().get(&channel).copied().unwrap_or_default()
    }

    /// Current statistics for every channel that has samples
    pub fn snapshot(&self) -> Arc<HashMap<Channel, ChannelStats>> {
        self.stats.load_full()
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(DEFAULT_EXPLORATION_RATE)
    }
}
