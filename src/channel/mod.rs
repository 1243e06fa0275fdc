//! Delivery channels
//!
//! Each [`Channel`] is served by one [`DeliveryAdapter`]. Adapters are
//! registered once at startup in an [`AdapterRegistry`].

mod func;
mod simulated;

pub use func::FnAdapter;
pub use simulated::SimulatedAdapter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DispatchError, Result};
use crate::models::{Channel, Priority};

/// What an adapter is asked to do for one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    pub task_id: String,
    pub target: String,
    pub volume: u64,
    pub priority: Priority,
    pub region: Option<String>,
    /// Upstream address drawn for this attempt, if the pool has any
    pub upstream: Option<String>,
}

/// What an adapter reports back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub delivered: u64,
}

impl DeliveryReport {
    pub fn is_complete(&self, volume: u64) -> bool {
        self.delivered >= volume
    }
}

/// Executes work for one channel
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    fn channel(&self) -> Channel;

    /// Perform the work. Errors are converted to failed task results by the pool.
    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReport>;
}

/// Channel to adapter mapping, built once at startup
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Channel, Arc<dyn DeliveryAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own channel, replacing any previous one
    pub fn register(mut self, adapter: Arc<dyn DeliveryAdapter>) -> Self {
        self.adapters.insert(adapter.channel(), adapter);
        self
    }

    /// Registry with a [`SimulatedAdapter`] for every channel
    pub fn simulated(success_probability: f64) -> Self {
        Channel::all().into_iter().fold(Self::new(), |registry, channel| {
            registry.register(Arc::new(SimulatedAdapter::new(channel, success_probability)))
        })
    }

    pub fn get(&self, channel: Channel) -> Result<Arc<dyn DeliveryAdapter>> {
        self.adapters
            .get(&channel)
            .cloned()
            .ok_or_else(|| DispatchError::AdapterMissing(channel.to_string()))
    }

    /// Registered channels in declaration order
    pub fn channels(&self) -> Vec<Channel> {
        Channel::all()
            .into_iter()
            .filter(|c| self.adapters.contains_key(c))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
