use std::sync::Arc;
use std::time::Duration;

use futures::executor::block_on;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info, warn};

use courier_broker::{Broker, BrokerError, Publisher};
use courier_core::{Delivery, Headers, OutboundRecord};

use super::client_config::KafkaSettings;
use super::consumer::KafkaSubscription;
use super::error::map_kafka_error;

/// Kafka-backed broker client.
///
/// One producer is shared by every clone (HTTP producer path and dead-letter
/// router alike); each `subscribe` creates a new consumer.
#[derive(Clone)]
pub struct KafkaBroker {
    producer: Arc<FutureProducer>,
    settings: KafkaSettings,
}

impl core::fmt::Debug for KafkaBroker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KafkaBroker")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl KafkaBroker {
    pub fn new(settings: KafkaSettings) -> Result<Self, BrokerError> {
        let producer: FutureProducer = settings
            .producer_config()
            .create()
            .map_err(|e| map_kafka_error(&e))?;

        info!(brokers = settings.brokers.as_str(), "kafka producer created");

        Ok(Self {
            producer: Arc::new(producer),
            settings,
        })
    }

    /// Wait for in-flight publishes (graceful shutdown).
    pub fn flush(&self, timeout: Duration) -> Result<(), BrokerError> {
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| map_kafka_error(&e))
    }
}

fn owned_headers(headers: &Headers) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new(), |acc, (key, value)| {
            acc.insert(Header {
                key: key.as_str(),
                value: Some(value.as_str()),
            })
        })
}

impl Publisher for KafkaBroker {
    fn publish(&self, record: OutboundRecord) -> Result<Delivery, BrokerError> {
        let mut future_record: FutureRecord<'_, str, [u8]> = FutureRecord::to(&record.topic)
            .payload(record.payload.as_slice())
            .headers(owned_headers(&record.headers));
        if let Some(key) = record.key.as_deref() {
            future_record = future_record.key(key);
        }
        if let Some(partition) = record.partition {
            future_record = future_record.partition(partition);
        }

        let delivery = self
            .producer
            .send_result(future_record)
            .map_err(|(err, _)| map_kafka_error(&err))?;

        // `message.timeout.ms` bounds how long the delivery report can take.
        match block_on(delivery) {
            Ok(Ok((partition, offset))) => {
                debug!(topic = record.topic.as_str(), partition, offset, "record published");
                Ok(Delivery {
                    topic: record.topic.clone(),
                    partition,
                    offset,
                })
            }
            Ok(Err((err, _message))) => {
                warn!(topic = record.topic.as_str(), error = %err, "publish failed");
                Err(map_kafka_error(&err))
            }
            Err(_canceled) => Err(BrokerError::Closed),
        }
    }
}

impl Broker for KafkaBroker {
    type Subscription = KafkaSubscription;

    fn subscribe(
        &self,
        topics: &[String],
        group_id: &str,
    ) -> Result<Self::Subscription, BrokerError> {
        KafkaSubscription::new(&self.settings, topics, group_id)
    }
}
