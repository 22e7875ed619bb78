//! `courier-core`: message and record building blocks.
//!
//! This crate contains the **pure data model** shared by the broker adapters,
//! the consumption pipeline and the HTTP API (no IO, no threads).

pub mod error;
pub mod message;
pub mod record;

pub use error::{MessageError, MessageResult};
pub use message::Message;
pub use record::{BrokerRecord, ConsumedRecord, Delivery, Headers, OutboundRecord, TopicPartition};
