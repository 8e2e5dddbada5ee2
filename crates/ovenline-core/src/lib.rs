//! ovenline-core
//!
//! Core building blocks for the Ovenline order-fulfillment pipeline.
//!
//! - **domain**: order records, the status state machine, identifiers, and
//!   the wire message that rides through the queue
//! - **ports**: the seams to external collaborators (OrderStore, the
//!   OrderBroker trait family, Fulfillment)
//! - **backoff** / **connect**: the shared backoff policy and the connection
//!   manager that supervises the broker link
//! - **producer** / **placement**: the request-path side of the pipeline
//! - **worker**: the consumer that advances orders out of `Pending`
//! - **impls**: in-memory adapters for development and tests

pub mod backoff;
pub mod connect;
pub mod domain;
pub mod impls;
pub mod placement;
pub mod ports;
pub mod producer;
pub mod worker;
