//! Dead-letter routing: where a failed record goes, and the publish itself.

use serde::Serialize;
use tracing::{info, warn};

use courier_broker::Publisher;
use courier_core::{BrokerRecord, Delivery, OutboundRecord, TopicPartition};

use crate::error::{FailureKind, HandlerError, PipelineError};

pub const HEADER_EXCEPTION_MESSAGE: &str = "courier-dlt-exception-message";
pub const HEADER_EXCEPTION_KIND: &str = "courier-dlt-exception-kind";
pub const HEADER_ORIGINAL_TOPIC: &str = "courier-dlt-original-topic";
pub const HEADER_ORIGINAL_PARTITION: &str = "courier-dlt-original-partition";
pub const HEADER_ORIGINAL_OFFSET: &str = "courier-dlt-original-offset";
pub const HEADER_ATTEMPTS: &str = "courier-dlt-attempts";
pub const HEADER_REQUEUE_COUNT: &str = "courier-requeue-count";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    /// Back to the original topic and partition (transient infrastructure failure).
    Requeue,
    /// The configured dead-letter topic.
    DeadLetter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub topic_partition: TopicPartition,
    pub kind: DestinationKind,
}

impl Destination {
    pub fn is_requeue(&self) -> bool {
        self.kind == DestinationKind::Requeue
    }
}

/// Decides the destination of records that will not be retried in place.
///
/// Rules, first match wins:
/// 1. root cause is a transient infrastructure failure: same topic, same partition
/// 2. otherwise: dead-letter topic, same partition number (remapped modulo the
///    dead-letter partition count when one is configured)
///
/// With no dead-letter topic configured, rule 2 yields no destination and the
/// record is discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterRouter {
    dead_letter_topic: Option<String>,
    dead_letter_partitions: Option<i32>,
    max_requeues: Option<u32>,
}

impl DeadLetterRouter {
    pub fn new(dead_letter_topic: impl Into<String>) -> Self {
        Self {
            dead_letter_topic: Some(dead_letter_topic.into()),
            dead_letter_partitions: None,
            max_requeues: None,
        }
    }

    /// Router without a dead-letter topic (terminal failures are discarded).
    pub fn discarding() -> Self {
        Self {
            dead_letter_topic: None,
            dead_letter_partitions: None,
            max_requeues: None,
        }
    }

    /// Partition count of the dead-letter topic, when it may be smaller than the source's.
    pub fn with_dead_letter_partitions(mut self, partitions: i32) -> Self {
        self.dead_letter_partitions = Some(partitions.max(1));
        self
    }

    /// Stop re-queuing a record after it has been re-queued `max` times.
    pub fn with_max_requeues(mut self, max: u32) -> Self {
        self.max_requeues = Some(max);
        self
    }

    pub fn dead_letter_topic(&self) -> Option<&str> {
        self.dead_letter_topic.as_deref()
    }

    pub fn route(&self, record: &BrokerRecord, error: &HandlerError) -> Option<Destination> {
        if error.root_cause().kind() == FailureKind::TransientInfra && !self.requeues_exhausted(record)
        {
            return Some(Destination {
                topic_partition: record.topic_partition(),
                kind: DestinationKind::Requeue,
            });
        }

        let topic = self.dead_letter_topic.as_ref()?;
        let partition = match self.dead_letter_partitions {
            Some(count) if record.partition >= count => record.partition % count,
            _ => record.partition,
        };

        Some(Destination {
            topic_partition: TopicPartition::new(topic.clone(), partition),
            kind: DestinationKind::DeadLetter,
        })
    }

    fn requeues_exhausted(&self, record: &BrokerRecord) -> bool {
        match self.max_requeues {
            Some(max) => requeue_count(record) >= max,
            None => false,
        }
    }

    /// Publish the failed record (original key and value) to `destination` with
    /// failure headers. A publish failure is not retried.
    pub fn publish<P>(
        &self,
        publisher: &P,
        record: &BrokerRecord,
        error: &HandlerError,
        attempts: u32,
        destination: &Destination,
    ) -> Result<Delivery, PipelineError>
    where
        P: Publisher + ?Sized,
    {
        let outbound = failed_record(record, error, attempts, destination);

        match publisher.publish(outbound) {
            Ok(delivery) => {
                info!(
                    original = %record.topic_partition(),
                    offset = record.offset,
                    destination = %destination.topic_partition,
                    kind = ?destination.kind,
                    "failed record published"
                );
                Ok(delivery)
            }
            Err(source) => {
                warn!(
                    destination = %destination.topic_partition,
                    error = %source,
                    "failed record could not be published"
                );
                Err(PipelineError::DeadLetterPublish {
                    destination: destination.topic_partition.clone(),
                    source,
                })
            }
        }
    }
}

fn requeue_count(record: &BrokerRecord) -> u32 {
    record
        .headers
        .get(HEADER_REQUEUE_COUNT)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn failed_record(
    record: &BrokerRecord,
    error: &HandlerError,
    attempts: u32,
    destination: &Destination,
) -> OutboundRecord {
    let mut outbound = OutboundRecord::new(
        destination.topic_partition.topic(),
        record.payload.clone(),
    )
    .with_partition(destination.topic_partition.partition());

    outbound.key = record.key.clone();
    outbound.headers = record.headers.clone();

    outbound = outbound
        .with_header(HEADER_EXCEPTION_MESSAGE, error.summary())
        .with_header(HEADER_EXCEPTION_KIND, error.root_cause().kind().as_str())
        .with_header(HEADER_ORIGINAL_TOPIC, record.topic.clone())
        .with_header(HEADER_ORIGINAL_PARTITION, record.partition.to_string())
        .with_header(HEADER_ORIGINAL_OFFSET, record.offset.to_string())
        .with_header(HEADER_ATTEMPTS, attempts.to_string());

    if destination.is_requeue() {
        outbound = outbound.with_header(HEADER_REQUEUE_COUNT, (requeue_count(record) + 1).to_string());
    }

    outbound
}
