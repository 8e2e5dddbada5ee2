//! Order placement - the request-path seam that feeds the pipeline.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::domain::{NewOrder, Order, OrderItem, UserId};
use crate::ports::store::{OrderStore, StoreError};
use crate::producer::OrderProducer;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("order has no items")]
    EmptyOrder,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates orders and hands them to the pipeline.
///
/// The publish is deliberately not transactional with the insert: if it fails
/// the order stays `Pending` with no message ever emitted, and the caller
/// still gets the created record. Closing that gap takes an outbox relay,
/// which this pipeline does not carry; the failure is logged at error level
/// so operators can republish by hand.
pub struct OrderPlacement {
    store: Arc<dyn OrderStore>,
    producer: OrderProducer,
}

impl OrderPlacement {
    pub fn new(store: Arc<dyn OrderStore>, producer: OrderProducer) -> Self {
        Self { store, producer }
    }

    /// Create the order as `Pending` and publish its id to the order queue.
    pub async fn place(
        &self,
        user_id: UserId,
        items: Vec<OrderItem>,
    ) -> Result<Order, PlacementError> {
        if items.is_empty() {
            return Err(PlacementError::EmptyOrder);
        }

        let order = self.store.create(NewOrder::from_items(user_id, items)).await?;
        info!(order_id = %order.id, %user_id, total = %order.total, "order placed");

        if let Err(err) = self.producer.publish(order.id).await {
            error!(
                order_id = %order.id,
                error = %err,
                "publish after create failed; order will sit in PENDING until republished"
            );
        }
        Ok(order)
    }
}
