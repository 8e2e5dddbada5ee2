//! Connection supervision: bounded startup connect, endless reconnect.

use std::sync::Arc;

use tracing::{info, warn};

use crate::backoff::BackoffPolicy;
use crate::ports::broker::{BrokerChannel, BrokerConnection, BrokerError, OrderBroker};

/// Name of the durable queue the pipeline owns.
pub const ORDER_QUEUE: &str = "order-processing";

/// Supervises the link to the broker for the lifetime of a process.
///
/// Startup is allowed to fail: a worker that never reaches the broker has no
/// useful work to do, so `connect` gives up after a bounded number of
/// attempts and the process exits. Once a worker has been live, outages are
/// transient by assumption and `reconnect` retries forever with capped
/// backoff. Both paths draw their delays from the same [`BackoffPolicy`].
#[derive(Clone)]
pub struct ConnectionManager {
    broker: Arc<dyn OrderBroker>,
    backoff: BackoffPolicy,
}

impl ConnectionManager {
    pub fn new(broker: Arc<dyn OrderBroker>, backoff: BackoffPolicy) -> Self {
        Self { broker, backoff }
    }

    /// Bounded connect for process startup. Returns the last error once
    /// `max_attempts` is exhausted.
    pub async fn connect(
        &self,
        max_attempts: u32,
    ) -> Result<Box<dyn BrokerConnection>, BrokerError> {
        let mut last_err = BrokerError::Connect("no attempts made".to_string());
        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, "connecting to broker");
            match self.broker.connect().await {
                Ok(conn) => {
                    info!(attempt, "broker connection established");
                    return Ok(conn);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "broker connect failed");
                    last_err = err;
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(self.backoff.delay_for(attempt)).await;
            }
        }
        Err(last_err)
    }

    /// Unbounded reconnect for a worker that was already live. Never gives
    /// up; the delay between attempts is capped by the policy.
    pub async fn reconnect(&self) -> Box<dyn BrokerConnection> {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            match self.broker.connect().await {
                Ok(conn) => {
                    info!(attempt, "broker connection restored");
                    return conn;
                }
                Err(err) => warn!(attempt, error = %err, "reconnect failed"),
            }
            tokio::time::sleep(self.backoff.delay_for(attempt)).await;
        }
    }

    /// Open a channel on `conn` and declare the queue this pipeline owns as
    /// durable, so enqueued work survives broker and worker restarts.
    pub async fn open_channel(
        &self,
        conn: &dyn BrokerConnection,
        queue: &str,
    ) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        let channel = conn.channel().await?;
        channel.declare_durable_queue(queue).await?;
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::impls::MemoryBroker;

    fn manager(broker: Arc<MemoryBroker>) -> ConnectionManager {
        let backoff = BackoffPolicy::new(Duration::from_millis(1), 2.0, Duration::from_millis(5));
        ConnectionManager::new(broker, backoff)
    }

    #[tokio::test]
    async fn connect_succeeds_within_attempt_budget() {
        let broker = Arc::new(MemoryBroker::new());
        broker.fail_connects(2);

        let conn = manager(broker).connect(5).await;
        assert!(conn.is_ok());
    }

    #[tokio::test]
    async fn connect_gives_up_after_max_attempts() {
        let broker = Arc::new(MemoryBroker::new());
        broker.fail_connects(5);

        let err = manager(broker.clone()).connect(3).await.err().unwrap();
        assert!(matches!(err, BrokerError::Connect(_)));

        // Only the attempt budget was spent.
        broker.fail_connects(0);
        assert!(manager(broker).connect(1).await.is_ok());
    }

    #[tokio::test]
    async fn reconnect_outlasts_a_long_outage() {
        let broker = Arc::new(MemoryBroker::new());
        broker.fail_connects(8);

        let _conn = manager(broker).reconnect().await;
    }

    #[tokio::test]
    async fn open_channel_declares_the_queue() {
        let broker = Arc::new(MemoryBroker::new());
        let mgr = manager(broker.clone());

        let conn = mgr.connect(1).await.unwrap();
        let channel = mgr.open_channel(conn.as_ref(), ORDER_QUEUE).await.unwrap();

        // Consuming only works on a declared queue.
        assert!(channel.consume(ORDER_QUEUE, 1).await.is_ok());
    }
}
