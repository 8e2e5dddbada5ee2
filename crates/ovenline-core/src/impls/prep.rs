//! Stand-in fulfillment: a fixed-duration preparation step.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::Order;
use crate::ports::fulfillment::{Fulfillment, FulfillmentError};

/// Spends a fixed amount of wall-clock time per order, standing in for the
/// real production step.
pub struct TimedPrep {
    duration: Duration,
}

impl TimedPrep {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl Fulfillment for TimedPrep {
    async fn prepare(&self, order: &Order) -> Result<(), FulfillmentError> {
        debug!(order_id = %order.id, items = order.items.len(), "preparing order");
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}
