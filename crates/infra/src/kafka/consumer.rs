use std::time::Duration;

use chrono::DateTime;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Headers as _, Message};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info};

use courier_broker::{BrokerError, Subscription};
use courier_core::{BrokerRecord, Headers, TopicPartition};

use super::client_config::KafkaSettings;
use super::error::map_kafka_error;

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer-group subscription backed by a `BaseConsumer`.
///
/// Auto-commit is off: offsets move only through [`Subscription::commit`].
pub struct KafkaSubscription {
    consumer: BaseConsumer,
    group_id: String,
}

impl core::fmt::Debug for KafkaSubscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KafkaSubscription")
            .field("group_id", &self.group_id)
            .finish_non_exhaustive()
    }
}

impl KafkaSubscription {
    pub fn new(
        settings: &KafkaSettings,
        topics: &[String],
        group_id: &str,
    ) -> Result<Self, BrokerError> {
        if topics.is_empty() {
            return Err(BrokerError::client("at least one topic is required"));
        }

        let consumer: BaseConsumer = settings
            .consumer_config(group_id)
            .create()
            .map_err(|e| map_kafka_error(&e))?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| map_kafka_error(&e))?;

        info!(group_id, topics = ?topics, "kafka consumer subscribed");

        Ok(Self {
            consumer,
            group_id: group_id.to_string(),
        })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

fn to_record(message: &BorrowedMessage<'_>) -> BrokerRecord {
    let headers: Headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|h| {
                    let value = h
                        .value
                        .map(|v| String::from_utf8_lossy(v).into_owned())
                        .unwrap_or_default();
                    (h.key.to_string(), value)
                })
                .collect()
        })
        .unwrap_or_default();

    BrokerRecord {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message
            .key()
            .map(|k| String::from_utf8_lossy(k).into_owned()),
        payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
        timestamp: message
            .timestamp()
            .to_millis()
            .and_then(DateTime::from_timestamp_millis),
    }
}

impl Subscription for KafkaSubscription {
    fn poll(&self, timeout: Duration) -> Result<Option<BrokerRecord>, BrokerError> {
        match self.consumer.poll(timeout) {
            None => Ok(None),
            Some(Ok(message)) => Ok(Some(to_record(&message))),
            Some(Err(KafkaError::PartitionEOF(_))) => Ok(None),
            Some(Err(err)) => Err(map_kafka_error(&err)),
        }
    }

    fn commit(&self, tp: &TopicPartition, offset: i64) -> Result<(), BrokerError> {
        let mut tpl = TopicPartitionList::new();
        // Committed offset is the next offset to read.
        tpl.add_partition_offset(tp.topic(), tp.partition(), Offset::Offset(offset + 1))
            .map_err(|e| map_kafka_error(&e))?;

        self.consumer
            .commit(&tpl, CommitMode::Sync)
            .map_err(|e| map_kafka_error(&e))?;

        debug!(topic_partition = %tp, offset, "offset committed");
        Ok(())
    }

    fn seek(&self, tp: &TopicPartition, offset: i64) -> Result<(), BrokerError> {
        self.consumer
            .seek(
                tp.topic(),
                tp.partition(),
                Offset::Offset(offset),
                Timeout::After(SEEK_TIMEOUT),
            )
            .map_err(|e| map_kafka_error(&e))?;

        debug!(topic_partition = %tp, offset, "partition rewound");
        Ok(())
    }

    // librdkafka drops records already fetched for a paused partition and
    // fetches again from the consumer position on resume.
    fn pause(&self, tp: &TopicPartition) -> Result<(), BrokerError> {
        self.consumer
            .pause(&single_partition(tp))
            .map_err(|e| map_kafka_error(&e))?;

        debug!(topic_partition = %tp, "partition paused");
        Ok(())
    }

    fn resume(&self, tp: &TopicPartition) -> Result<(), BrokerError> {
        self.consumer
            .resume(&single_partition(tp))
            .map_err(|e| map_kafka_error(&e))?;

        debug!(topic_partition = %tp, "partition resumed");
        Ok(())
    }
}

fn single_partition(tp: &TopicPartition) -> TopicPartitionList {
    let mut tpl = TopicPartitionList::new();
    tpl.add_partition(tp.topic(), tp.partition());
    tpl
}
