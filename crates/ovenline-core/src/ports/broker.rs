//! OrderBroker port family - durable publish/subscribe with explicit acks.
//!
//! The surface mirrors how AMQP-style brokers are actually driven: a broker
//! hands out connections, a connection hands out channels, and a channel is
//! where queues are declared, messages published, and subscriptions opened.
//! Keeping each layer behind a trait means the pipeline never holds a
//! process-wide channel handle; whoever builds the worker injects the broker
//! and owns the lifecycle.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::MessageId;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connect failed: {0}")]
    Connect(String),

    #[error("channel closed")]
    ChannelClosed,

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("consume failed: {0}")]
    Consume(String),
}

/// Entry point: something that can produce live broker connections.
#[async_trait]
pub trait OrderBroker: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError>;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare a queue whose definition (and persistent contents) survive a
    /// broker restart. Declaring an existing queue is a no-op.
    async fn declare_durable_queue(&self, queue: &str) -> Result<(), BrokerError>;

    /// Publish `body` to `queue`. With `persistent` set, the broker must
    /// write the message to durable storage before acknowledging the publish,
    /// where it supports that.
    async fn publish(
        &self,
        queue: &str,
        message_id: MessageId,
        body: Vec<u8>,
        persistent: bool,
    ) -> Result<(), BrokerError>;

    /// Subscribe with a prefetch window: at most `prefetch` deliveries may be
    /// un-acknowledged at once. A prefetch of 1 makes consumption strictly
    /// sequential.
    async fn consume(&self, queue: &str, prefetch: u16)
    -> Result<Box<dyn MessageSource>, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}

/// Blocking receive half of a subscription.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next delivery. `Err(ChannelClosed)` means the link died
    /// and the caller should reconnect.
    async fn next(&mut self) -> Result<Box<dyn Delivery>, BrokerError>;
}

/// One in-flight delivery.
///
/// Design intent:
/// - The receiver owns the delivery and must settle it exactly once: `ack`
///   removes the message for good, `reject` either requeues it for another
///   attempt or discards it. Settling consumes `self`, so the type system
///   rules out double-acks.
/// - A message stays invisible to other consumers until settled; that, not
///   application-level locking, is what keeps two workers off the same order.
#[async_trait]
pub trait Delivery: Send {
    fn message_id(&self) -> MessageId;

    fn body(&self) -> &[u8];

    /// Whether this message was delivered before and came back (rejected with
    /// requeue, or its consumer died without acking).
    fn redelivered(&self) -> bool;

    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;

    async fn reject(self: Box<Self>, requeue: bool) -> Result<(), BrokerError>;
}
