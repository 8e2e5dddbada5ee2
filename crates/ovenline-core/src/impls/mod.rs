//! In-memory implementations of the ports, for development and tests.
//!
//! Production deployments swap these for real adapters (a relational store,
//! an AMQP broker); nothing in the pipeline knows which side of the trait it
//! is talking to.

pub mod memory_broker;
pub mod memory_store;
pub mod prep;

pub use memory_broker::{MemoryBroker, QueueCounts};
pub use memory_store::MemoryStore;
pub use prep::TimedPrep;
