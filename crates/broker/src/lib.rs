//! Broker client abstraction (publish / subscribe / commit / seek) and an
//! in-memory implementation for tests and local runs.

pub mod broker;
pub mod error;
pub mod in_memory;

pub use broker::{Broker, Publisher, Subscription};
pub use error::BrokerError;
pub use in_memory::{InMemoryBroker, InMemorySubscription};
