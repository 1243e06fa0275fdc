//! Simulation adapter
//!
//! Performs no I/O. Sleeps for a random latency and succeeds with a fixed
//! probability. Used by the demo binary and by tests.

use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;

use super::{DeliveryAdapter, DeliveryReport, DeliveryRequest};
use crate::error::{DispatchError, Result};
use crate::models::Channel;

pub struct SimulatedAdapter {
    channel: Channel,
    success_probability: f64,
    min_latency: Duration,
    max_latency: Duration,
}

impl SimulatedAdapter {
    pub fn new(channel: Channel, success_probability: f64) -> Self {
        Self {
            channel,
            success_probability: success_probability.clamp(0.0, 1.0),
            min_latency: Duration::ZERO,
            max_latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max.max(min);
        self
    }

    fn sample_latency(&self) -> Duration {
        if self.max_latency <= self.min_latency {
            return self.min_latency;
        }
        let min = self.min_latency.as_micros() as u64;
        let max = self.max_latency.as_micros() as u64;
        Duration::from_micros(rand::thread_rng().gen_range(min..=max))
    }
}

#[async_trait]
impl DeliveryAdapter for SimulatedAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReport> {
        let latency = self.sample_latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if rand::thread_rng().gen_bool(self.success_probability) {
            Ok(DeliveryReport {
                delivered: request.volume,
            })
        } else {
            Err(DispatchError::TransientChannelFailure(format!(
                "simulated {} failure",
                self.channel
            )))
        }
    }
}
