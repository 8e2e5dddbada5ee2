//! In-memory broker for development and tests.
//!
//! Implements the at-least-once contract the pipeline depends on: declared
//! queues, per-consumer prefetch windows, requeue/discard on reject, and
//! redelivery of unacked messages when a connection is severed. The
//! persistence flag on publish is accepted and ignored; an in-memory broker
//! survives nothing.
//!
//! Chaos controls (`fail_connects`, `sever`) let tests and demos exercise the
//! outage paths without a real broker to unplug.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::domain::MessageId;
use crate::ports::broker::{
    BrokerChannel, BrokerConnection, BrokerError, Delivery, MessageSource, OrderBroker,
};

/// Queue depths, for tests and status logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueCounts {
    pub ready: usize,
    pub unacked: usize,
    pub acked: u64,
    pub discarded: u64,
}

#[derive(Debug, Clone)]
struct QueuedMessage {
    message_id: MessageId,
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct QueueState {
    /// Set by `declare_durable_queue`; consuming requires it.
    declared: bool,
    ready: VecDeque<QueuedMessage>,
    /// delivery tag -> message, invisible to other consumers until settled.
    unacked: HashMap<u64, QueuedMessage>,
    acked: u64,
    discarded: u64,
}

struct BrokerState {
    queues: HashMap<String, QueueState>,
    next_tag: u64,
    /// Bumped by `sever`; handles from older epochs observe `ChannelClosed`.
    epoch: u64,
}

struct Shared {
    state: Mutex<BrokerState>,
    notify: Notify,
}

pub struct MemoryBroker {
    shared: Arc<Shared>,
    connect_failures: AtomicU32,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState {
                    queues: HashMap::new(),
                    next_tag: 1,
                    epoch: 0,
                }),
                notify: Notify::new(),
            }),
            connect_failures: AtomicU32::new(0),
        }
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_connects(&self, n: u32) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Kill every live connection. Consumers observe `ChannelClosed` on their
    /// next receive, and unacked deliveries return to their queues marked
    /// redelivered, exactly as a real broker requeues when a consumer dies.
    pub async fn sever(&self) {
        let mut state = self.shared.state.lock().await;
        state.epoch += 1;
        for queue in state.queues.values_mut() {
            for (_, mut msg) in queue.unacked.drain() {
                msg.redelivered = true;
                queue.ready.push_back(msg);
            }
        }
        drop(state);
        self.shared.notify.notify_waiters();
    }

    pub async fn counts(&self, queue: &str) -> QueueCounts {
        let state = self.shared.state.lock().await;
        state
            .queues
            .get(queue)
            .map(|q| QueueCounts {
                ready: q.ready.len(),
                unacked: q.unacked.len(),
                acked: q.acked,
                discarded: q.discarded,
            })
            .unwrap_or_default()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderBroker for MemoryBroker {
    async fn connect(&self) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        if self
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BrokerError::Connect(
                "injected connect failure".to_string(),
            ));
        }

        let epoch = self.shared.state.lock().await.epoch;
        Ok(Box::new(MemoryConnection {
            shared: Arc::clone(&self.shared),
            epoch,
        }))
    }
}

struct MemoryConnection {
    shared: Arc<Shared>,
    epoch: u64,
}

impl MemoryConnection {
    async fn check_live(&self) -> Result<(), BrokerError> {
        let state = self.shared.state.lock().await;
        if state.epoch != self.epoch {
            return Err(BrokerError::ChannelClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn channel(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        self.check_live().await?;
        Ok(Box::new(MemoryChannel {
            shared: Arc::clone(&self.shared),
            epoch: self.epoch,
        }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        // Nothing to tear down in memory.
        Ok(())
    }
}

struct MemoryChannel {
    shared: Arc<Shared>,
    epoch: u64,
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_durable_queue(&self, queue: &str) -> Result<(), BrokerError> {
        let mut state = self.shared.state.lock().await;
        if state.epoch != self.epoch {
            return Err(BrokerError::ChannelClosed);
        }
        state.queues.entry(queue.to_string()).or_default().declared = true;
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        message_id: MessageId,
        body: Vec<u8>,
        _persistent: bool,
    ) -> Result<(), BrokerError> {
        let mut state = self.shared.state.lock().await;
        if state.epoch != self.epoch {
            return Err(BrokerError::ChannelClosed);
        }
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .ready
            .push_back(QueuedMessage {
                message_id,
                body,
                redelivered: false,
            });
        drop(state);
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        prefetch: u16,
    ) -> Result<Box<dyn MessageSource>, BrokerError> {
        let state = self.shared.state.lock().await;
        if state.epoch != self.epoch {
            return Err(BrokerError::ChannelClosed);
        }
        if !state.queues.get(queue).is_some_and(|q| q.declared) {
            return Err(BrokerError::Consume(format!(
                "queue {queue} has not been declared"
            )));
        }
        Ok(Box::new(MemorySource {
            shared: Arc::clone(&self.shared),
            queue: queue.to_string(),
            epoch: self.epoch,
            prefetch: prefetch.max(1) as usize,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

struct MemorySource {
    shared: Arc<Shared>,
    queue: String,
    epoch: u64,
    prefetch: usize,
    /// Deliveries handed out but not yet settled, shared with them.
    in_flight: Arc<AtomicUsize>,
}

impl MemorySource {
    /// One non-blocking attempt: `Ok(None)` means nothing deliverable right
    /// now (empty queue, or the prefetch window is full).
    async fn try_next(&self) -> Result<Option<Box<dyn Delivery>>, BrokerError> {
        let mut state = self.shared.state.lock().await;
        if state.epoch != self.epoch {
            return Err(BrokerError::ChannelClosed);
        }
        if self.in_flight.load(Ordering::Acquire) >= self.prefetch {
            return Ok(None);
        }

        // Tags only need to be unique, so burning one on an empty poll is fine.
        let tag = state.next_tag;
        state.next_tag += 1;

        let Some(queue) = state.queues.get_mut(&self.queue) else {
            return Ok(None);
        };
        let Some(msg) = queue.ready.pop_front() else {
            return Ok(None);
        };
        queue.unacked.insert(tag, msg.clone());
        self.in_flight.fetch_add(1, Ordering::AcqRel);

        Ok(Some(Box::new(MemoryDelivery {
            shared: Arc::clone(&self.shared),
            queue: self.queue.clone(),
            tag,
            message_id: msg.message_id,
            body: msg.body,
            redelivered: msg.redelivered,
            in_flight: Arc::clone(&self.in_flight),
        })))
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn next(&mut self) -> Result<Box<dyn Delivery>, BrokerError> {
        loop {
            // Subscribe before checking state so a publish that lands between
            // the check and the await is not lost.
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_next().await? {
                Some(delivery) => return Ok(delivery),
                None => notified.await,
            }
        }
    }
}

struct MemoryDelivery {
    shared: Arc<Shared>,
    queue: String,
    tag: u64,
    message_id: MessageId,
    body: Vec<u8>,
    redelivered: bool,
    in_flight: Arc<AtomicUsize>,
}

impl MemoryDelivery {
    /// Settle the delivery. If the connection was severed in the meantime the
    /// tag is gone (the message already went back to ready) and this is a
    /// no-op, matching how a real broker ignores acks from dead consumers.
    async fn settle(&self, requeue: Option<bool>) {
        let mut state = self.shared.state.lock().await;
        if let Some(queue) = state.queues.get_mut(&self.queue) {
            if let Some(mut msg) = queue.unacked.remove(&self.tag) {
                match requeue {
                    None => queue.acked += 1,
                    Some(true) => {
                        msg.redelivered = true;
                        queue.ready.push_back(msg);
                    }
                    Some(false) => queue.discarded += 1,
                }
            }
        }
        drop(state);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.shared.notify.notify_waiters();
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn message_id(&self) -> MessageId {
        self.message_id
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.settle(None).await;
        Ok(())
    }

    async fn reject(self: Box<Self>, requeue: bool) -> Result<(), BrokerError> {
        self.settle(Some(requeue)).await;
        Ok(())
    }
}
