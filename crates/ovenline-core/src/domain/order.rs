//! Order records and the fulfillment status state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{OrderId, ProductId, UserId};

/// Fulfillment status of an order.
///
/// Transitions move forward only:
/// - `Pending -> Processing -> Completed`
/// - `Pending -> Processing -> Cancelled`
///
/// `Completed` and `Cancelled` are terminal. `Processing -> Processing` is
/// allowed as an idempotent re-entry: a redelivered message may find the order
/// already mid-flight after an un-acked crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Completed)
                | (OrderStatus::Processing, OrderStatus::Cancelled)
        )
    }
}

/// One line of an order: a product, how many, and the unit price at the time
/// the order was placed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Decimal,
}

impl OrderItem {
    pub fn new(product_id: ProductId, quantity: u32, price: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            price,
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// A stored order.
///
/// The store is the single source of truth for these records; the queue only
/// ever carries a pointer to one. After creation the status is mutated
/// exclusively by the consumer worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the request path hands to the store. The id, status (`Pending`), and
/// timestamps are assigned at insert.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total: Decimal,
}

impl NewOrder {
    /// Build a new order, computing the total as the sum of item subtotals.
    pub fn from_items(user_id: UserId, items: Vec<OrderItem>) -> Self {
        let total = items.iter().map(OrderItem::subtotal).sum();
        Self {
            user_id,
            items,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn item(product: i64, quantity: u32, price: &str) -> OrderItem {
        OrderItem::new(
            ProductId::new(product),
            quantity,
            price.parse().unwrap(),
        )
    }

    #[rstest]
    #[case::pending_to_processing(OrderStatus::Pending, OrderStatus::Processing, true)]
    #[case::processing_reentry(OrderStatus::Processing, OrderStatus::Processing, true)]
    #[case::processing_to_completed(OrderStatus::Processing, OrderStatus::Completed, true)]
    #[case::processing_to_cancelled(OrderStatus::Processing, OrderStatus::Cancelled, true)]
    #[case::pending_to_completed(OrderStatus::Pending, OrderStatus::Completed, false)]
    #[case::pending_to_cancelled(OrderStatus::Pending, OrderStatus::Cancelled, false)]
    #[case::processing_to_pending(OrderStatus::Processing, OrderStatus::Pending, false)]
    #[case::completed_to_processing(OrderStatus::Completed, OrderStatus::Processing, false)]
    #[case::completed_to_cancelled(OrderStatus::Completed, OrderStatus::Cancelled, false)]
    #[case::cancelled_to_processing(OrderStatus::Cancelled, OrderStatus::Processing, false)]
    #[case::cancelled_to_completed(OrderStatus::Cancelled, OrderStatus::Completed, false)]
    fn transition_matrix(
        #[case] from: OrderStatus,
        #[case] to: OrderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn terminal_states() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let s = serde_json::to_string(&OrderStatus::Pending).unwrap();
        assert_eq!(s, "\"PENDING\"");

        let back: OrderStatus = serde_json::from_str("\"CANCELLED\"").unwrap();
        assert_eq!(back, OrderStatus::Cancelled);
    }

    #[test]
    fn total_is_sum_of_subtotals() {
        let order = NewOrder::from_items(
            UserId::new(1),
            vec![item(1, 2, "3.50"), item(2, 1, "12.00")],
        );
        assert_eq!(order.total, "19.00".parse::<Decimal>().unwrap());
    }

    #[test]
    fn empty_order_totals_zero() {
        let order = NewOrder::from_items(UserId::new(1), vec![]);
        assert_eq!(order.total, Decimal::ZERO);
    }
}
