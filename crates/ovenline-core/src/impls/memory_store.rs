//! In-memory OrderStore for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::domain::{NewOrder, Order, OrderId, OrderStatus};
use crate::ports::store::{OrderStore, StoreError};

struct MemoryStoreState {
    orders: HashMap<OrderId, Order>,

    /// Next row id to assign.
    next_order_id: i64,

    /// Injected `update_status` failures, keyed by target status (tests).
    #[cfg(test)]
    update_failures: HashMap<OrderStatus, u32>,
}

impl MemoryStoreState {
    fn new() -> Self {
        Self {
            orders: HashMap::new(),
            next_order_id: 1,
            #[cfg(test)]
            update_failures: HashMap::new(),
        }
    }
}

pub struct MemoryStore {
    state: Mutex<MemoryStoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryStoreState::new()),
        }
    }

    /// Make the next `times` updates to `status` fail as if the store were
    /// unreachable.
    #[cfg(test)]
    pub async fn fail_updates_to(&self, status: OrderStatus, times: u32) {
        let mut state = self.state.lock().await;
        state.update_failures.insert(status, times);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut state = self.state.lock().await;
        let id = OrderId::new(state.next_order_id);
        state.next_order_id += 1;

        let now = Utc::now();
        let order = Order {
            id,
            user_id: order.user_id,
            items: order.items,
            total: order.total,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        state.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn get(&self, id: OrderId) -> Result<Order, StoreError> {
        let state = self.state.lock().await;
        state.orders.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, StoreError> {
        let mut state = self.state.lock().await;

        #[cfg(test)]
        if let Some(left) = state.update_failures.get_mut(&status) {
            if *left > 0 {
                *left -= 1;
                return Err(StoreError::Unavailable(
                    "injected update failure".to_string(),
                ));
            }
        }

        let order = state.orders.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !order.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                order_id: id,
                from: order.status,
                to: status,
            });
        }

        order.status = status;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderItem, ProductId, UserId};

    fn new_order() -> NewOrder {
        NewOrder::from_items(
            UserId::new(1),
            vec![OrderItem::new(ProductId::new(1), 1, "3.50".parse().unwrap())],
        )
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids_and_pending_status() {
        let store = MemoryStore::new();

        let a = store.create(new_order()).await.unwrap();
        let b = store.create(new_order()).await.unwrap();

        assert_eq!(a.id, OrderId::new(1));
        assert_eq!(b.id, OrderId::new(2));
        assert_eq!(a.status, OrderStatus::Pending);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[tokio::test]
    async fn get_unknown_order_is_not_found() {
        let store = MemoryStore::new();
        let err = store.get(OrderId::new(999)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_status_walks_the_state_machine() {
        let store = MemoryStore::new();
        let order = store.create(new_order()).await.unwrap();

        let order = store
            .update_status(order.id, OrderStatus::Processing)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Processing);

        let order = store
            .update_status(order.id, OrderStatus::Completed)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.updated_at >= order.created_at);
    }

    #[tokio::test]
    async fn update_status_rejects_illegal_transitions() {
        let store = MemoryStore::new();
        let order = store.create(new_order()).await.unwrap();

        // Straight to a terminal state is not a legal move.
        let err = store
            .update_status(order.id, OrderStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));

        // Out of a terminal state never is.
        store
            .update_status(order.id, OrderStatus::Processing)
            .await
            .unwrap();
        store
            .update_status(order.id, OrderStatus::Cancelled)
            .await
            .unwrap();
        let err = store
            .update_status(order.id, OrderStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn injected_failures_burn_down() {
        let store = MemoryStore::new();
        let order = store.create(new_order()).await.unwrap();
        store.fail_updates_to(OrderStatus::Processing, 1).await;

        let err = store
            .update_status(order.id, OrderStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        // The failure was one-shot.
        assert!(store
            .update_status(order.id, OrderStatus::Processing)
            .await
            .is_ok());
    }
}
