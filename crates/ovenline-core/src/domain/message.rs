//! Wire payload for the order queue.
//!
//! The message deliberately carries only the order id. The worker re-fetches
//! the authoritative record from the store, so a stale snapshot can never ride
//! through the queue, and the message schema evolves independently of the
//! order schema.

use serde::{Deserialize, Serialize};

use super::ids::OrderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMessage {
    #[serde(rename = "orderId")]
    pub order_id: OrderId,
}

impl OrderMessage {
    pub fn new(order_id: OrderId) -> Self {
        Self { order_id }
    }

    /// Parse a message body. A failure here means the body can never be
    /// processed, no matter how often it is redelivered.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_shape_is_order_id_key() {
        let body = serde_json::to_vec(&OrderMessage::new(OrderId::new(42))).unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), r#"{"orderId":42}"#);
    }

    #[test]
    fn parses_well_formed_body() {
        let msg = OrderMessage::from_bytes(br#"{"orderId":42}"#).unwrap();
        assert_eq!(msg.order_id, OrderId::new(42));
    }

    #[test]
    fn rejects_non_json_body() {
        assert!(OrderMessage::from_bytes(b"not json at all").is_err());
    }

    #[test]
    fn rejects_body_without_order_id() {
        assert!(OrderMessage::from_bytes(br#"{"order":42}"#).is_err());
    }
}
