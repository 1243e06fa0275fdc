//! Closure-backed adapter for embedding applications

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use super::{DeliveryAdapter, DeliveryReport, DeliveryRequest};
use crate::error::Result;
use crate::models::Channel;

type DeliverFn = dyn Fn(DeliveryRequest) -> BoxFuture<'static, Result<DeliveryReport>> + Send + Sync;

/// Adapter that forwards every request to a user-supplied async closure
pub struct FnAdapter {
    channel: Channel,
    handler: Arc<DeliverFn>,
}

impl FnAdapter {
    pub fn new<F>(channel: Channel, handler: F) -> Self
    where
        F: Fn(DeliveryRequest) -> BoxFuture<'static, Result<DeliveryReport>> + Send + Sync + 'static,
    {
        Self {
            channel,
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl DeliveryAdapter for FnAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn deliver(&self, request: &DeliveryRequest) -> Result<DeliveryReport> {
        (self.handler)(request.clone()).await
    }
}
