//! OrderStore port - the single source of truth for order records.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{NewOrder, Order, OrderId, OrderStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(OrderId),

    #[error("illegal status transition for {order_id}: {from:?} -> {to:?}")]
    IllegalTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent storage for orders.
///
/// Design intent:
/// - The store is the single source of truth; the broker only ever carries a
///   pointer to a row here.
/// - After creation, status is mutated exclusively by the consumer worker;
///   the request path never touches it.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order in `Pending` state; the store assigns the id and
    /// timestamps.
    async fn create(&self, order: NewOrder) -> Result<Order, StoreError>;

    /// Fetch one order.
    async fn get(&self, id: OrderId) -> Result<Order, StoreError>;

    /// Atomically update the status, returning the updated record. The store
    /// enforces the forward-only transition rules of `OrderStatus`.
    async fn update_status(&self, id: OrderId, status: OrderStatus)
    -> Result<Order, StoreError>;
}
