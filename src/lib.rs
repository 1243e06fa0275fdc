//! Relaypool - Task Dispatch Core
//!
//! Distributes delivery tasks across a pool of channel-bound workers.
//!
//! ## Features
//!
//! - Bounded task queue with a single dispatch loop and per-task execution
//! - Load balancing strategies (round-robin, weighted, performance-based, geographic, intelligent)
//! - Upstream pool with health scoring, blacklisting and JSON persistence
//! - Adaptive channel selection learned from task outcomes
//! - Pluggable delivery adapters and result sinks

pub mod balancer;
pub mod channel;
pub mod config;
pub mod error;
pub mod models;
pub mod pool;
pub mod selector;
pub mod services;
pub mod sink;
pub mod upstream;

pub use balancer::{DistributionStrategy, LoadBalancer};
pub use channel::{AdapterRegistry, DeliveryAdapter, DeliveryReport, DeliveryRequest};
pub use config::Config;
pub use error::{DispatchError, Result};
pub use pool::{PoolConfig, PoolStats, WorkerPool};
pub use selector::StrategySelector;
pub use sink::{LogSink, NoopSink, ResultSink};
pub use upstream::{UpstreamPool, UpstreamRequirements, UpstreamStrategy};
