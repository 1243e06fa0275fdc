//! Selection strategies over a filtered upstream list
//!
//! Every function here receives a non-empty candidate slice and returns an
//! index into it.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::Upstream;

/// Requirements narrowing which upstreams are eligible
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequirements {
    pub country: Option<String>,
    pub kind: Option<String>,
    pub min_reliability: f64,
    pub min_speed: f64,
    /// Smart strategy flags, checked in this order
    pub high_reliability: bool,
    pub high_speed: bool,
    pub least_used: bool,
}

impl Default for UpstreamRequirements {
    fn default() -> Self {
        Self {
            country: None,
            kind: None,
            min_reliability: 0.3,
            min_speed: 0.3,
            high_reliability: false,
            high_speed: false,
            least_used: false,
        }
    }
}

impl UpstreamRequirements {
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn high_reliability(mut self) -> Self {
        self.high_reliability = true;
        self
    }

    pub fn high_speed(mut self) -> Self {
        self.high_speed = true;
        self
    }

    pub fn least_used(mut self) -> Self {
        self.least_used = true;
        self
    }

    /// Whether an upstream passes every hard filter
    pub fn accepts(&self, upstream: &Upstream) -> bool {
        if upstream.blacklisted || upstream.consecutive_failures > 3 {
            return false;
        }
        if let Some(country) = &self.country {
            if upstream.country.as_ref() != Some(country) {
                return false;
            }
        }
        if let Some(kind) = &self.kind {
            if upstream.kind.as_ref() != Some(kind) {
                return false;
            }
        }
        upstream.reliability_score >= self.min_reliability && upstream.speed_score >= self.min_speed
    }
}

pub(crate) fn random(candidates: &[&Upstream]) -> usize {
    rand::thread_rng().gen_range(0..candidates.len())
}

/// Weighted pick among the five best by reliability, speed and freshness
pub(crate) fn performance(candidates: &[&Upstream], now: DateTime<Utc>) -> usize {
    let mut scored: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(i, up)| {
            let score =
                up.reliability_score * 0.5 + up.speed_score * 0.3 + up.freshness(now) * 0.2;
            (i, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(5);

    let mut rng = rand::thread_rng();
    let picked = scored
        .choose_weighted(&mut rng, |(_, score)| *score)
        .map(|(i, _)| *i)
        .unwrap_or(scored[0].0);
    picked
}

pub(crate) fn smart(
    candidates: &[&Upstream],
    requirements: &UpstreamRequirements,
    now: DateTime<Utc>,
) -> usize {
    if requirements.high_reliability {
        most_reliable(candidates)
    } else if requirements.high_speed {
        fastest(candidates)
    } else if requirements.least_used {
        least_used(candidates)
    } else {
        balanced(candidates, now)
    }
}

/// First entry with the highest reliability
pub(crate) fn most_reliable(candidates: &[&Upstream]) -> usize {
    first_max_by(candidates, |up| up.reliability_score)
}

/// First entry with the highest speed score
pub(crate) fn fastest(candidates: &[&Upstream]) -> usize {
    first_max_by(candidates, |up| up.speed_score)
}

/// Entry handed out the fewest times
pub(crate) fn least_used(candidates: &[&Upstream]) -> usize {
    candidates
        .iter()
        .enumerate()
        .min_by_key(|(_, up)| up.selected_count)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

pub(crate) fn balanced(candidates: &[&Upstream], now: DateTime<Utc>) -> usize {
    first_max_by(candidates, |up| {
        up.reliability_score * 0.4 + up.speed_score * 0.4 + up.freshness(now) * 0.2
    })
}

fn first_max_by(candidates: &[&Upstream], score: impl Fn(&Upstream) -> f64) -> usize {
    let mut best = 0;
    let mut best_score = f64::NEG_INFINITY;
    for (i, up) in candidates.iter().enumerate() {
        let s = score(up);
        if s > best_score {
            best_score = s;
            best = i;
        }
    }
    best
}
