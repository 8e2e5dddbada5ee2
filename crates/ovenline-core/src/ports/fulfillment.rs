//! Fulfillment port - the actual preparation work for one order.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Order;

#[derive(Debug, Error)]
#[error("fulfillment failed: {0}")]
pub struct FulfillmentError(pub String);

/// The production step the worker drives for each dequeued order.
///
/// Implementations must tolerate duplicates: with at-least-once delivery the
/// same order can reach `prepare` twice after an un-acked crash.
#[async_trait]
pub trait Fulfillment: Send + Sync {
    async fn prepare(&self, order: &Order) -> Result<(), FulfillmentError>;
}
