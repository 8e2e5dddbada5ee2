//! Consumer worker: the sole authority that advances orders out of `Pending`.
//!
//! The worker is a single blocking receive loop. Per message it parses the
//! order id, re-fetches the authoritative record, walks the order through
//! `Processing` to a terminal state, and settles the delivery:
//!
//! - parse failure        -> reject without requeue (the body will never parse)
//! - order settled        -> ack (completed, cancelled, or a duplicate skip)
//! - compensation failure -> reject with requeue (redelivery is the only way
//!   forward; the order keeps its last known status)
//!
//! Acks happen strictly after the status write, so a crash in between costs a
//! duplicate delivery, never a lost order.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connect::ConnectionManager;
use crate::domain::{OrderId, OrderMessage, OrderStatus};
use crate::ports::broker::{BrokerConnection, BrokerError, Delivery, MessageSource};
use crate::ports::fulfillment::Fulfillment;
use crate::ports::store::{OrderStore, StoreError};

/// How a settled message leaves the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Ack,
    Reject { requeue: bool },
}

/// What happened to the order behind one delivery.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    Completed,
    Cancelled,
    /// Duplicate delivery of an order that already reached a terminal state;
    /// nothing was touched.
    AlreadySettled(OrderStatus),
}

/// The one failure the worker cannot settle on its own: the primary path
/// failed and the compensating `Cancelled` write failed too.
#[derive(Debug, thiserror::Error)]
#[error("{order_id} stuck after '{primary}': compensation failed: {compensation}")]
pub struct StuckOrder {
    pub order_id: OrderId,
    pub primary: String,
    pub compensation: StoreError,
}

enum LoopExit {
    Shutdown,
    Reconnect,
}

pub struct OrderWorker {
    store: Arc<dyn OrderStore>,
    fulfillment: Arc<dyn Fulfillment>,
    manager: ConnectionManager,
    queue: String,
    prefetch: u16,
}

/// Handle to a spawned worker.
///
/// Dropping the handle also stops the worker: the loop treats a closed
/// shutdown channel the same as an explicit request.
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn request_shutdown(&self) {
        // ignore send error: the worker may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Request shutdown and wait for the in-flight message (if any) to
    /// finish and the broker link to be closed.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

impl OrderWorker {
    pub fn new(
        store: Arc<dyn OrderStore>,
        fulfillment: Arc<dyn Fulfillment>,
        manager: ConnectionManager,
        queue: impl Into<String>,
        prefetch: u16,
    ) -> Self {
        Self {
            store,
            fulfillment,
            manager,
            queue: queue.into(),
            prefetch,
        }
    }

    /// Connect (bounded) and start consuming. Startup failure is fatal by
    /// design: a worker with no broker access has no useful work to do.
    pub async fn start(self, connect_attempts: u32) -> Result<WorkerHandle, BrokerError> {
        let conn = self.manager.connect(connect_attempts).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(conn, shutdown_rx));
        Ok(WorkerHandle { shutdown_tx, join })
    }

    async fn run(
        self,
        mut conn: Box<dyn BrokerConnection>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            let channel = match self.manager.open_channel(conn.as_ref(), &self.queue).await {
                Ok(channel) => channel,
                Err(err) => {
                    warn!(error = %err, "channel setup failed");
                    match self.reconnect_or_shutdown(&mut shutdown_rx).await {
                        Some(restored) => conn = restored,
                        None => return,
                    }
                    continue;
                }
            };
            let mut source = match channel.consume(&self.queue, self.prefetch).await {
                Ok(source) => source,
                Err(err) => {
                    warn!(error = %err, "consume failed");
                    match self.reconnect_or_shutdown(&mut shutdown_rx).await {
                        Some(restored) => conn = restored,
                        None => return,
                    }
                    continue;
                }
            };
            info!(queue = %self.queue, prefetch = self.prefetch, "worker consuming");

            match self.receive_loop(source.as_mut(), &mut shutdown_rx).await {
                LoopExit::Shutdown => {
                    if let Err(err) = channel.close().await {
                        warn!(error = %err, "channel close failed");
                    }
                    if let Err(err) = conn.close().await {
                        warn!(error = %err, "connection close failed");
                    }
                    info!("worker stopped");
                    return;
                }
                LoopExit::Reconnect => {
                    warn!("broker link lost");
                    match self.reconnect_or_shutdown(&mut shutdown_rx).await {
                        Some(restored) => conn = restored,
                        None => return,
                    }
                }
            }
        }
    }

    /// Indefinite reconnect, abandoned only if shutdown is requested first.
    async fn reconnect_or_shutdown(
        &self,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Option<Box<dyn BrokerConnection>> {
        if *shutdown_rx.borrow() {
            return None;
        }
        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("shutdown requested during reconnect");
                None
            }
            conn = self.manager.reconnect() => Some(conn),
        }
    }

    /// Receive until shutdown or the link dies. The in-flight message is
    /// always handled to completion; shutdown is only observed in between
    /// messages.
    async fn receive_loop(
        &self,
        source: &mut dyn MessageSource,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> LoopExit {
        loop {
            if *shutdown_rx.borrow() {
                return LoopExit::Shutdown;
            }

            let delivery = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        // sender dropped: treat as shutdown
                        return LoopExit::Shutdown;
                    }
                    continue;
                }
                delivery = source.next() => delivery,
            };

            match delivery {
                Ok(delivery) => self.handle_delivery(delivery).await,
                Err(err) => {
                    warn!(error = %err, "receive failed");
                    return LoopExit::Reconnect;
                }
            }
        }
    }

    async fn handle_delivery(&self, delivery: Box<dyn Delivery>) {
        debug!(
            message_id = %delivery.message_id(),
            redelivered = delivery.redelivered(),
            "delivery received"
        );

        let disposition = match OrderMessage::from_bytes(delivery.body()) {
            Ok(msg) => match self.process(msg.order_id).await {
                Ok(_) => Disposition::Ack,
                Err(stuck) => {
                    error!(order_id = %stuck.order_id, error = %stuck, "order left inconsistent; requeueing message");
                    Disposition::Reject { requeue: true }
                }
            },
            Err(err) => {
                error!(
                    message_id = %delivery.message_id(),
                    error = %err,
                    "malformed message body; discarding"
                );
                Disposition::Reject { requeue: false }
            }
        };

        let settled = match disposition {
            Disposition::Ack => delivery.ack().await,
            Disposition::Reject { requeue } => delivery.reject(requeue).await,
        };
        if let Err(err) = settled {
            warn!(error = %err, "failed to settle delivery");
        }
    }

    /// Drive one order through the state machine.
    ///
    /// Every `Ok` leaves the order settled (or intentionally untouched, for
    /// duplicates of settled orders); `Err` means the compensating write
    /// failed and redelivery is the only way forward.
    pub async fn process(&self, order_id: OrderId) -> Result<ProcessOutcome, StuckOrder> {
        let order = match self.store.get(order_id).await {
            Ok(order) => order,
            Err(err) => return self.cancel(order_id, err.to_string()).await,
        };

        // At-least-once redelivery: a settled order is not reprocessed.
        if order.status.is_terminal() {
            warn!(%order_id, status = ?order.status, "duplicate delivery of settled order; skipping");
            return Ok(ProcessOutcome::AlreadySettled(order.status));
        }

        let order = match self
            .store
            .update_status(order_id, OrderStatus::Processing)
            .await
        {
            Ok(order) => order,
            Err(err) => return self.cancel(order_id, err.to_string()).await,
        };
        debug!(%order_id, "order processing");

        if let Err(err) = self.fulfillment.prepare(&order).await {
            return self.cancel(order_id, err.to_string()).await;
        }

        if let Err(err) = self
            .store
            .update_status(order_id, OrderStatus::Completed)
            .await
        {
            return self.cancel(order_id, err.to_string()).await;
        }
        info!(%order_id, "order completed");
        Ok(ProcessOutcome::Completed)
    }

    /// Best-effort compensation: mark the order `Cancelled` so it is not
    /// stranded in `Processing`. If even that write fails the order keeps its
    /// last known status and the caller must requeue.
    async fn cancel(
        &self,
        order_id: OrderId,
        reason: String,
    ) -> Result<ProcessOutcome, StuckOrder> {
        warn!(%order_id, %reason, "order failed; cancelling");
        match self
            .store
            .update_status(order_id, OrderStatus::Cancelled)
            .await
        {
            Ok(_) => Ok(ProcessOutcome::Cancelled),
            Err(compensation) => Err(StuckOrder {
                order_id,
                primary: reason,
                compensation,
            }),
        }
    }
}
