//! Kafka adapter (`rdkafka`) for the broker traits.
//!
//! - **Publish**: `FutureProducer`, waiting for the delivery report (with a
//!   timeout) so callers get a definite success or failure
//! - **Consume**: `BaseConsumer` polled from the dispatcher thread, manual
//!   synchronous commits, `seek` for rewinding a partition
//! - **Errors**: transport-level failures map to `BrokerError::Transport`

mod client_config;
mod consumer;
mod error;
mod producer;

pub use client_config::KafkaSettings;
pub use consumer::KafkaSubscription;
pub use error::map_kafka_error;
pub use producer::KafkaBroker;
