//! Infrastructure layer: configuration and broker adapters.

pub mod config;

/// Kafka broker adapter.
#[cfg(feature = "kafka")]
pub mod kafka;

pub use config::{BridgeConfig, ConfigError};
