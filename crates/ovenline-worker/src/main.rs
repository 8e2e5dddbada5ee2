//! Long-running order-fulfillment worker.
//!
//! Wires the in-memory adapters, starts the consumer, feeds it a few demo
//! orders through the placement path, then runs until SIGINT/SIGTERM. On a
//! signal the in-flight order (if any) finishes before the process exits.

mod config;

use std::sync::Arc;

use tracing::{error, info};

use ovenline_core::backoff::BackoffPolicy;
use ovenline_core::connect::ConnectionManager;
use ovenline_core::domain::{OrderItem, ProductId, UserId};
use ovenline_core::impls::{MemoryBroker, MemoryStore, TimedPrep};
use ovenline_core::placement::OrderPlacement;
use ovenline_core::ports::store::OrderStore;
use ovenline_core::producer::OrderProducer;
use ovenline_core::worker::OrderWorker;

use crate::config::WorkerSettings;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = WorkerSettings::from_env();
    info!(?settings, "starting order worker");

    let broker = Arc::new(MemoryBroker::new());
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let backoff = BackoffPolicy::new(settings.backoff_base, 2.0, settings.backoff_max);
    let manager = ConnectionManager::new(broker.clone(), backoff);

    let worker = OrderWorker::new(
        store.clone(),
        Arc::new(TimedPrep::new(settings.prep_duration)),
        manager.clone(),
        settings.queue.clone(),
        settings.prefetch,
    );
    let handle = match worker.start(settings.connect_attempts).await {
        Ok(handle) => handle,
        Err(err) => {
            error!(error = %err, "worker failed to start");
            std::process::exit(1);
        }
    };

    if let Err(err) = place_demo_orders(&manager, &settings, store.clone()).await {
        error!(error = %err, "demo order placement failed");
    }

    shutdown_signal().await;
    info!("termination signal received; draining");
    handle.shutdown_and_join().await;
    info!("worker stopped; bye");
}

/// Stand-in for the request path: place a couple of orders so the pipeline
/// has something to chew on.
async fn place_demo_orders(
    manager: &ConnectionManager,
    settings: &WorkerSettings,
    store: Arc<MemoryStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let conn = manager.connect(settings.connect_attempts).await?;
    let channel = manager.open_channel(conn.as_ref(), &settings.queue).await?;
    let producer = OrderProducer::new(Arc::from(channel), settings.queue.clone());
    let placement = OrderPlacement::new(store.clone(), producer);

    let croissants = vec![
        OrderItem::new(ProductId::new(1), 2, "3.50".parse()?),
        OrderItem::new(ProductId::new(2), 1, "12.00".parse()?),
    ];
    let baguettes = vec![OrderItem::new(ProductId::new(3), 6, "1.20".parse()?)];

    let mut placed = Vec::new();
    for (user, items) in [(UserId::new(1), croissants), (UserId::new(2), baguettes)] {
        let order = placement.place(user, items).await?;
        info!(order_id = %order.id, %user, total = %order.total, "demo order placed");
        placed.push(order.id);
    }

    // Show the status polling a client would do against the store.
    tokio::spawn(async move {
        for order_id in placed {
            loop {
                match store.get(order_id).await {
                    Ok(order) if order.status.is_terminal() => {
                        info!(%order_id, status = ?order.status, "demo order settled");
                        break;
                    }
                    Ok(_) => tokio::time::sleep(std::time::Duration::from_millis(200)).await,
                    Err(err) => {
                        error!(%order_id, error = %err, "status poll failed");
                        break;
                    }
                }
            }
        }
    });

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
