//! Domain model (orders, identifiers, wire messages).

pub mod ids;
pub mod message;
pub mod order;

pub use ids::{MessageId, OrderId, ProductId, UserId};
pub use message::OrderMessage;
pub use order::{NewOrder, Order, OrderItem, OrderStatus};
