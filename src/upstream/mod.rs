//! Upstream pool
//!
//! Keeps egress upstreams with health and performance scores and hands one
//! out per outgoing request. Outcomes reported back recompute the scores and
//! drive automatic blacklisting.

mod selection;

pub use selection::UpstreamRequirements;

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{DispatchError, Result};
use crate::models::Upstream;

/// Reliability below which cleanup evicts an upstream
pub const MIN_RELIABILITY_FLOOR: f64 = 0.2;

/// Strategy types for upstream selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamStrategy {
    Random,
    RoundRobin,
    Performance,
    #[default]
    Smart,
}

impl UpstreamStrategy {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "random" => Self::Random,
            "round_robin" | "roundrobin" | "round-robin" => Self::RoundRobin,
            "performance" | "performance_based" | "performance-based" => Self::Performance,
            _ => Self::Smart,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RoundRobin => "round_robin",
            Self::Performance => "performance",
            Self::Smart => "smart",
        }
    }
}

/// Summary of the pool
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamPoolStats {
    pub total: usize,
    pub active: usize,
    pub blacklisted: usize,
    pub average_reliability: f64,
    pub average_speed: f64,
    pub by_kind: HashMap<String, usize>,
    pub by_country: HashMap<String, usize>,
    pub top_performers: Vec<UpstreamSummary>,
    pub strategy: UpstreamStrategy,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpstreamSummary {
    pub address: String,
    pub reliability: f64,
    pub speed: f64,
    pub requests: u64,
    pub success_rate: f64,
}

/// Pool of egress upstreams
pub struct UpstreamPool {
    upstreams: RwLock<Vec<Upstream>>,
    strategy: RwLock<UpstreamStrategy>,
    index: AtomicUsize,
}

impl UpstreamPool {
    pub fn new(strategy: UpstreamStrategy) -> Self {
        Self {
            upstreams: RwLock::new(Vec::new()),
            strategy: RwLock::new(strategy),
            index: AtomicUsize::new(0),
        }
    }

    pub fn strategy(&self) -> UpstreamStrategy {
        *self.strategy.read()
    }

    pub fn set_strategy(&self, strategy: UpstreamStrategy) {
        *self.strategy.write() = strategy;
    }

    /// Add an upstream; an existing entry with the same address is replaced
    pub fn add(&self, upstream: Upstream) {
        let mut guard = self.upstreams.write();
        match guard.iter_mut().find(|u| u.address == upstream.address) {
            Some(existing) => *existing = upstream,
            None => guard.push(upstream),
        }
    }

    pub fn remove(&self, address: &str) -> Result<Upstream> {
        let mut guard = self.upstreams.write();
        let pos = guard
            .iter()
            .position(|u| u.address == address)
            .ok_or_else(|| DispatchError::UpstreamNotFound {
                address: address.to_string(),
            })?;
        Ok(guard.remove(pos))
    }

    pub fn len(&self) -> usize {
        self.upstreams.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.upstreams.read().is_empty()
    }

    /// Copy of a single entry
    pub fn entry(&self, address: &str) -> Option<Upstream> {
        self.upstreams
            .read()
            .iter()
            .find(|u| u.address == address)
            .cloned()
    }

    /// Copy of every entry
    pub fn snapshot(&self) -> Vec<Upstream> {
        self.upstreams.read().clone()
    }

    /// Load entries from a JSON array, merging by address; returns the count read
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let entries: Vec<Upstream> = serde_json::from_str(&raw)?;
        let count = entries.len();
        for entry in entries {
            self.add(entry);
        }
        info!("Loaded {} upstreams from {}", count, path.as_ref().display());
        Ok(count)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path.as_ref(), json)?;
        debug!("Saved upstreams to {}", path.as_ref().display());
        Ok(())
    }

    /// Pick an upstream address for the given requirements
    ///
    /// Falls back to any non-blacklisted entry when nothing meets the
    /// requirements. Never returns a blacklisted entry.
    pub fn get(&self, requirements: &UpstreamRequirements) -> Option<String> {
        let now = Utc::now();
        let address = {
            let guard = self.upstreams.read();

            let mut candidates: Vec<&Upstream> =
                guard.iter().filter(|u| requirements.accepts(u)).collect();
            if candidates.is_empty() {
                candidates = guard.iter().filter(|u| !u.blacklisted).collect();
            }
            if candidates.is_empty() {
                return None;
            }

            let idx = match self.strategy() {
                UpstreamStrategy::Random => selection::random(&candidates),
                UpstreamStrategy::RoundRobin => {
                    self.index.fetch_add(1, Ordering::Relaxed) % candidates.len()
                }
                UpstreamStrategy::Performance => selection::performance(&candidates, now),
                UpstreamStrategy::Smart => selection::smart(&candidates, requirements, now),
            };
            candidates[idx].address.clone()
        };

        if let Some(up) = self
            .upstreams
            .write()
            .iter_mut()
            .find(|u| u.address == address)
        {
            up.selected_count += 1;
            up.last_used = Some(now);
        }

        Some(address)
    }

    /// Like [`get`](Self::get) but with an error when the pool has nothing usable
    ///
    /// A pool whose every entry is blacklisted yields `BlacklistedResource`.
    pub fn acquire(&self, requirements: &UpstreamRequirements) -> Result<String> {
        if let Some(address) = self.get(requirements) {
            return Ok(address);
        }
        let guard = self.upstreams.read();
        if !guard.is_empty() && guard.iter().all(|u| u.blacklisted) {
            return Err(DispatchError::BlacklistedResource(format!(
                "all {} upstreams are blacklisted",
                guard.len()
            )));
        }
        Err(DispatchError::NoUpstreamsAvailable)
    }

    /// Record a success with its response time in seconds
    pub fn report_success(&self, address: &str, response_time: f64) -> Result<()> {
        let mut guard = self.upstreams.write();
        let up = find_mut(&mut guard, address)?;
        let was_blacklisted = up.blacklisted;
        up.record_success(response_time);

        if was_blacklisted {
            info!("Upstream {} recovered and left the blacklist", address);
        }
        Ok(())
    }

    pub fn report_failure(&self, address: &str, error: Option<&str>) -> Result<()> {
        let mut guard = self.upstreams.write();
        let up = find_mut(&mut guard, address)?;
        if up.record_failure(error) {
            warn!(
                "Blacklisted upstream {} after {} consecutive failures",
                address, up.consecutive_failures
            );
        } else {
            debug!(
                "Upstream {} failed ({} consecutive): {}",
                address,
                up.consecutive_failures,
                error.unwrap_or("unknown error")
            );
        }
        Ok(())
    }

    /// Evict stale or unreliable upstreams; returns how many were removed
    ///
    /// Ages too large to represent never count as stale.
    pub fn cleanup_old(&self, max_age_hours: u64) -> usize {
        let now = Utc::now();
        let max_age = i64::try_from(max_age_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .unwrap_or(chrono::Duration::MAX);

        let mut guard = self.upstreams.write();
        let before = guard.len();
        guard.retain(|up| {
            let stale = up.last_success.is_some_and(|last| now - last > max_age);
            let unreliable = up.reliability_score < MIN_RELIABILITY_FLOOR;
            !(stale || unreliable)
        });
        let removed = before - guard.len();

        if removed > 0 {
            info!("Cleaned up {} stale or unreliable upstreams", removed);
        }
        removed
    }

    pub fn stats(&self) -> UpstreamPoolStats {
        let guard = self.upstreams.read();
        let total = guard.len();
        let blacklisted = guard.iter().filter(|u| u.blacklisted).count();

        let (average_reliability, average_speed) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                guard.iter().map(|u| u.reliability_score).sum::<f64>() / total as f64,
                guard.iter().map(|u| u.speed_score).sum::<f64>() / total as f64,
            )
        };

        let mut by_kind = HashMap::new();
        let mut by_country = HashMap::new();
        for up in guard.iter() {
            let kind = up.kind.clone().unwrap_or_else(|| "unknown".to_string());
            let country = up.country.clone().unwrap_or_else(|| "unknown".to_string());
            *by_kind.entry(kind).or_insert(0) += 1;
            *by_country.entry(country).or_insert(0) += 1;
        }

        let mut ranked: Vec<&Upstream> = guard.iter().collect();
        ranked.sort_by(|a, b| b.reliability_score.total_cmp(&a.reliability_score));
        let top_performers = ranked
            .into_iter()
            .take(5)
            .map(|u| UpstreamSummary {
                address: u.address.clone(),
                reliability: u.reliability_score,
                speed: u.speed_score,
                requests: u.total_requests,
                success_rate: u.success_rate(),
            })
            .collect();

        UpstreamPoolStats {
            total,
            active: total - blacklisted,
            blacklisted,
            average_reliability,
            average_speed,
            by_kind,
            by_country,
            top_performers,
            strategy: self.strategy(),
        }
    }
}

impl Default for UpstreamPool {
    fn default() -> Self {
        Self::new(UpstreamStrategy::default())
    }
}

fn find_mut<'a>(list: &'a mut [Upstream], address: &str) -> Result<&'a mut Upstream> {
    list.iter_mut()
        .find(|u| u.address == address)
        .ok_or_else(|| DispatchError::UpstreamNotFound {
            address: address.to_string(),
        })
}
