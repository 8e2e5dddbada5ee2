//! Producer - makes a newly created order visible to the pipeline.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{MessageId, OrderId, OrderMessage};
use crate::ports::broker::{BrokerChannel, BrokerError};

pub struct OrderProducer {
    channel: Arc<dyn BrokerChannel>,
    queue: String,
}

impl OrderProducer {
    pub fn new(channel: Arc<dyn BrokerChannel>, queue: impl Into<String>) -> Self {
        Self {
            channel,
            queue: queue.into(),
        }
    }

    /// Publish `{orderId}` for a freshly created order, marked persistent.
    ///
    /// Fire-and-forget: the call returns once the broker accepted the
    /// publish; it never waits for processing.
    pub async fn publish(&self, order_id: OrderId) -> Result<MessageId, BrokerError> {
        let message_id = MessageId::generate();
        let body = serde_json::to_vec(&OrderMessage::new(order_id))
            .map_err(|err| BrokerError::Publish(err.to_string()))?;

        self.channel
            .publish(&self.queue, message_id, body, true)
            .await?;
        debug!(%order_id, %message_id, queue = %self.queue, "order published");
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::connect::ORDER_QUEUE;
    use crate::impls::MemoryBroker;
    use crate::ports::broker::{BrokerConnection, Delivery, MessageSource, OrderBroker};

    async fn open(broker: &MemoryBroker) -> Arc<dyn BrokerChannel> {
        let conn = broker.connect().await.unwrap();
        let channel = conn.channel().await.unwrap();
        channel.declare_durable_queue(ORDER_QUEUE).await.unwrap();
        Arc::from(channel)
    }

    #[tokio::test]
    async fn published_body_carries_the_order_id() {
        let broker = MemoryBroker::new();
        let channel = open(&broker).await;

        let producer = OrderProducer::new(channel.clone(), ORDER_QUEUE);
        let message_id = producer.publish(OrderId::new(42)).await.unwrap();

        let mut source = channel.consume(ORDER_QUEUE, 1).await.unwrap();
        let delivery = tokio::time::timeout(Duration::from_secs(1), source.next())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(delivery.message_id(), message_id);
        let msg = OrderMessage::from_bytes(delivery.body()).unwrap();
        assert_eq!(msg.order_id, OrderId::new(42));
    }
}
