use crate::balancer::DistributionStrategy;
use crate::error::{DispatchError, Result};
use crate::pool::{PoolConfig, WorkerAssignment};
use crate::upstream::UpstreamStrategy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker pool configuration
    pub pool: PoolSettings,
    /// Load balancer configuration
    pub balancer: BalancerConfig,
    /// Upstream pool configuration
    pub upstream: UpstreamConfig,
    /// Channel selector configuration
    pub selector: SelectorConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Number of workers created at start (default: 4)
    pub workers: usize,
    /// Bounded queue capacity (default: 1024)
    pub queue_capacity: usize,
    /// Queue poll timeout in milliseconds
    pub poll_timeout_ms: u64,
    /// Wait after requeueing a task in milliseconds
    pub backoff_ms: u64,
    /// Adapter call timeout in seconds
    pub task_timeout_secs: u64,
    /// How workers are bound to channels (round_robin, random)
    pub assignment: WorkerAssignment,
    /// Autoscaling never drops below this many workers (default: 2)
    pub min_workers: usize,
    /// Autoscaling never grows past this many workers (default: 32)
    pub max_workers: usize,
    /// Autoscaling check interval in seconds
    pub scale_interval_secs: u64,
    /// Health check interval in seconds
    pub health_interval_secs: u64,
    /// Idle workers inactive this long are restarted
    pub max_idle_secs: u64,
}

#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Distribution strategy (round_robin, weighted, performance_based, geographic, intelligent)
    pub strategy: DistributionStrategy,
    /// Bound on the distribution history
    pub history_limit: usize,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Selection strategy (random, round_robin, performance, smart)
    pub strategy: UpstreamStrategy,
    /// Optional JSON file to seed the pool from
    pub file: Option<PathBuf>,
    /// Cleanup interval in seconds
    pub cleanup_interval_secs: u64,
    /// Entries without a success for this long are evicted
    pub max_age_hours: u64,
}

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Probability of picking a random channel, in [0, 1]
    pub exploration_rate: f64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let exploration_rate: f64 = parse_env("SELECTOR_EXPLORATION", "0.1")?;
        if !(0.0..=1.0).contains(&exploration_rate) {
            return Err(DispatchError::InvalidConfig(
                "SELECTOR_EXPLORATION must be between 0 and 1".into(),
            ));
        }

        let workers: usize = parse_env("POOL_WORKERS", "4")?;
        if workers == 0 {
            return Err(DispatchError::InvalidConfig(
                "POOL_WORKERS must be positive".into(),
            ));
        }

        let min_workers: usize = parse_env("POOL_MIN_WORKERS", "2")?;
        let max_workers: usize = parse_env("POOL_MAX_WORKERS", "32")?;
        if max_workers == 0 || min_workers > max_workers {
            return Err(DispatchError::InvalidConfig(
                "POOL_MAX_WORKERS must be positive and at least POOL_MIN_WORKERS".into(),
            ));
        }

        Ok(Config {
            pool: PoolSettings {
                workers,
                queue_capacity: parse_env("POOL_QUEUE_CAPACITY", "1024")?,
                poll_timeout_ms: parse_env("POOL_POLL_TIMEOUT_MS", "100")?,
                backoff_ms: parse_env("POOL_BACKOFF_MS", "50")?,
                task_timeout_secs: parse_env("POOL_TASK_TIMEOUT_SECS", "30")?,
                assignment: WorkerAssignment::from_str(&get_env_or(
                    "POOL_WORKER_ASSIGNMENT",
                    "round_robin",
                )),
                min_workers,
                max_workers,
                scale_interval_secs: parse_env("POOL_SCALE_INTERVAL_SECS", "5")?,
                health_interval_secs: parse_env("POOL_HEALTH_INTERVAL_SECS", "60")?,
                max_idle_secs: parse_env("POOL_MAX_IDLE_SECS", "300")?,
            },
            balancer: BalancerConfig {
                strategy: DistributionStrategy::from_str(&get_env_or(
                    "BALANCER_STRATEGY",
                    "intelligent",
                )),
                history_limit: parse_env("BALANCER_HISTORY_LIMIT", "1000")?,
            },
            upstream: UpstreamConfig {
                strategy: UpstreamStrategy::from_str(&get_env_or("UPSTREAM_STRATEGY", "smart")),
                file: env::var("UPSTREAM_FILE")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from),
                cleanup_interval_secs: parse_env("UPSTREAM_CLEANUP_INTERVAL_SECS", "3600")?,
                max_age_hours: parse_env("UPSTREAM_MAX_AGE_HOURS", "24")?,
            },
            selector: SelectorConfig { exploration_rate },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Worker pool settings in the form the pool consumes
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            queue_capacity: self.pool.queue_capacity,
            poll_timeout: Duration::from_millis(self.pool.poll_timeout_ms),
            backoff: Duration::from_millis(self.pool.backoff_ms),
            task_timeout: Duration::from_secs(self.pool.task_timeout_secs),
            assignment: self.pool.assignment,
            strategy: self.balancer.strategy,
            ..PoolConfig::default()
        }
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: FromStr>(key: &str, default: &str) -> Result<T> {
    get_env_or(key, default)
        .trim()
        .parse()
        .map_err(|_| DispatchError::InvalidConfig(format!("{} must be a valid number", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "POOL_WORKERS",
        "POOL_QUEUE_CAPACITY",
        "POOL_POLL_TIMEOUT_MS",
        "POOL_BACKOFF_MS",
        "POOL_TASK_TIMEOUT_SECS",
        "POOL_WORKER_ASSIGNMENT",
        "POOL_MIN_WORKERS",
        "POOL_MAX_WORKERS",
        "POOL_SCALE_INTERVAL_SECS",
        "POOL_HEALTH_INTERVAL_SECS",
        "POOL_MAX_IDLE_SECS",
        "BALANCER_STRATEGY",
        "BALANCER_HISTORY_LIMIT",
        "UPSTREAM_STRATEGY",
        "UPSTREAM_FILE",
        "UPSTREAM_CLEANUP_INTERVAL_SECS",
        "UPSTREAM_MAX_AGE_HOURS",
        "SELECTOR_EXPLORATION",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(config.pool.workers, 4);
        assert_eq!(config.pool.queue_capacity, 1024);
        assert_eq!(config.pool.assignment, WorkerAssignment::RoundRobin);
        assert_eq!(config.pool.min_workers, 2);
        assert_eq!(config.pool.max_workers, 32);
        assert_eq!(config.pool.max_idle_secs, 300);
        assert_eq!(config.balancer.strategy, DistributionStrategy::Intelligent);
        assert_eq!(config.balancer.history_limit, 1000);
        assert_eq!(config.upstream.strategy, UpstreamStrategy::Smart);
        assert!(config.upstream.file.is_none());
        assert_eq!(config.upstream.max_age_hours, 24);
        assert!((config.selector.exploration_rate - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("POOL_WORKERS", "8");
        env::set_var("POOL_TASK_TIMEOUT_SECS", "5");
        env::set_var("POOL_WORKER_ASSIGNMENT", "random");
        env::set_var("BALANCER_STRATEGY", "geographic");
        env::set_var("UPSTREAM_STRATEGY", "round_robin");
        env::set_var("UPSTREAM_FILE", "/tmp/upstreams.json");
        env::set_var("SELECTOR_EXPLORATION", "0");

        let config = Config::from_env().unwrap();

        assert_eq!(config.pool.workers, 8);
        assert_eq!(config.pool.assignment, WorkerAssignment::Random);
        assert_eq!(config.balancer.strategy, DistributionStrategy::Geographic);
        assert_eq!(config.upstream.strategy, UpstreamStrategy::RoundRobin);
        assert_eq!(
            config.upstream.file,
            Some(PathBuf::from("/tmp/upstreams.json"))
        );
        assert_eq!(config.selector.exploration_rate, 0.0);

        let pool = config.pool_config();
        assert_eq!(pool.task_timeout, Duration::from_secs(5));
        assert_eq!(pool.strategy, DistributionStrategy::Geographic);
        assert_eq!(pool.assignment, WorkerAssignment::Random);
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("POOL_QUEUE_CAPACITY", "lots");
        assert!(matches!(
            Config::from_env(),
            Err(DispatchError::InvalidConfig(_))
        ));
        env::remove_var("POOL_QUEUE_CAPACITY");

        env::set_var("SELECTOR_EXPLORATION", "1.5");
        assert!(matches!(
            Config::from_env(),
            Err(DispatchError::InvalidConfig(_))
        ));
        env::remove_var("SELECTOR_EXPLORATION");

        env::set_var("SELECTOR_EXPLORATION", "NaN");
        assert!(matches!(
            Config::from_env(),
            Err(DispatchError::InvalidConfig(_))
        ));
        env::remove_var("SELECTOR_EXPLORATION");

        env::set_var("POOL_MIN_WORKERS", "10");
        env::set_var("POOL_MAX_WORKERS", "3");
        assert!(matches!(
            Config::from_env(),
            Err(DispatchError::InvalidConfig(_))
        ));
        env::remove_var("POOL_MIN_WORKERS");
        env::remove_var("POOL_MAX_WORKERS");

        env::set_var("POOL_WORKERS", "0");
        assert!(matches!(
            Config::from_env(),
            Err(DispatchError::InvalidConfig(_))
        ));
    }
}
