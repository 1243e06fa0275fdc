//! Upstream cleanup service
//!
//! Periodically evicts stale or unreliable upstreams and, when a seed file is
//! configured, writes the surviving entries back to it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument};

use crate::error::Result;
use crate::upstream::UpstreamPool;

/// Upstream cleanup service configuration
#[derive(Debug, Clone)]
pub struct UpstreamCleanupConfig {
    /// How often to run cleanup (in seconds)
    pub check_interval_secs: u64,
    /// Entries without a success for this many hours are evicted
    pub max_age_hours: u64,
    /// File the pool is saved to after each pass
    pub persist_path: Option<PathBuf>,
}

impl Default for UpstreamCleanupConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 3600, // 1 hour
            max_age_hours: 24,
            persist_path: None,
        }
    }
}

pub struct UpstreamCleanupService {
    pool: Arc<UpstreamPool>,
    config: UpstreamCleanupConfig,
}

impl UpstreamCleanupService {
    pub fn new(pool: Arc<UpstreamPool>, config: UpstreamCleanupConfig) -> Self {
        Self { pool, config }
    }

    /// Run until the shutdown flag flips to true
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting upstream cleanup service (max age: {}h, every {}s)",
            self.config.max_age_hours, self.config.check_interval_secs
        );

        let mut cleanup_interval =
            interval(Duration::from_secs(self.config.check_interval_secs.max(1)));
        cleanup_interval.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = cleanup_interval.tick() => {
                    if let Err(e) = self.cleanup() {
                        error!("Upstream cleanup failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Upstream cleanup service shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One cleanup pass; returns the number of evicted entries
    pub fn cleanup(&self) -> Result<usize> {
        let removed = self.pool.cleanup_old(self.config.max_age_hours);
        if removed == 0 {
            debug!("No stale upstreams to evict");
        }

        if let Some(path) = &self.config.persist_path {
            self.pool.save_to_file(path)?;
            debug!("Saved {} upstreams to {}", self.pool.len(), path.display());
        }
        Ok(removed)
    }
}

/// Handle for managing the upstream cleanup service
pub struct UpstreamCleanupHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl UpstreamCleanupHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for UpstreamCleanupHandle {
    fn default() -> Self {
        Self::new().0
    }
}
