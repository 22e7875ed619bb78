//! Broker client contract (mechanics only).
//!
//! The consumption pipeline talks to the broker exclusively through these
//! traits, so the same pipeline runs against Kafka in production and against
//! [`crate::InMemoryBroker`] in tests.
//!
//! ## Delivery Guarantees
//!
//! Adapters provide **at-least-once** delivery per consumer group:
//! - Records are handed out in offset order per partition
//! - A record is only considered processed once its offset is committed
//! - Uncommitted records are delivered again after a restart (or a `seek`)
//!
//! Group membership and partition assignment are delegated to the adapter.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`. A single publisher is shared by the HTTP
//! producer path and the dead-letter router; a single subscription is polled by
//! one dispatcher thread while partition lanes commit and seek concurrently.

use std::sync::Arc;
use std::time::Duration;

use courier_core::{BrokerRecord, Delivery, OutboundRecord, TopicPartition};

use crate::error::BrokerError;

/// Publish side of a broker client.
pub trait Publisher: Send + Sync {
    /// Publish one record and wait for the broker acknowledgement.
    fn publish(&self, record: OutboundRecord) -> Result<Delivery, BrokerError>;
}

/// A consumer-group subscription to one or more topics.
pub trait Subscription: Send + Sync {
    /// Wait up to `timeout` for the next record. `Ok(None)` means the timeout
    /// elapsed; `Err(BrokerError::Closed)` means no more records will arrive.
    fn poll(&self, timeout: Duration) -> Result<Option<BrokerRecord>, BrokerError>;

    /// Mark the record at `offset` (and everything before it) as processed.
    fn commit(&self, tp: &TopicPartition, offset: i64) -> Result<(), BrokerError>;

    /// Reposition the partition so the next delivered record is `offset`.
    fn seek(&self, tp: &TopicPartition, offset: i64) -> Result<(), BrokerError>;

    /// Stop handing out records of `tp` until [`Subscription::resume`].
    ///
    /// The position is kept: nothing past the last delivered record is read.
    fn pause(&self, tp: &TopicPartition) -> Result<(), BrokerError>;

    /// Hand out records of `tp` again, starting at its current position.
    fn resume(&self, tp: &TopicPartition) -> Result<(), BrokerError>;
}

/// Full broker client: publish + subscribe.
pub trait Broker: Publisher {
    type Subscription: Subscription + 'static;

    fn subscribe(
        &self,
        topics: &[String],
        group_id: &str,
    ) -> Result<Self::Subscription, BrokerError>;
}

impl<P> Publisher for Arc<P>
where
    P: Publisher + ?Sized,
{
    fn publish(&self, record: OutboundRecord) -> Result<Delivery, BrokerError> {
        (**self).publish(record)
    }
}

impl<B> Broker for Arc<B>
where
    B: Broker + ?Sized,
{
    type Subscription = B::Subscription;

    fn subscribe(
        &self,
        topics: &[String],
        group_id: &str,
    ) -> Result<Self::Subscription, BrokerError> {
        (**self).subscribe(topics, group_id)
    }
}

impl<S> Subscription for Arc<S>
where
    S: Subscription + ?Sized,
{
    fn poll(&self, timeout: Duration) -> Result<Option<BrokerRecord>, BrokerError> {
        (**self).poll(timeout)
    }

    fn commit(&self, tp: &TopicPartition, offset: i64) -> Result<(), BrokerError> {
        (**self).commit(tp, offset)
    }

    fn seek(&self, tp: &TopicPartition, offset: i64) -> Result<(), BrokerError> {
        (**self).seek(tp, offset)
    }

    fn pause(&self, tp: &TopicPartition) -> Result<(), BrokerError> {
        (**self).pause(tp)
    }

    fn resume(&self, tp: &TopicPartition) -> Result<(), BrokerError> {
        (**self).resume(tp)
    }
}
