use std::time::Duration;

use rdkafka::config::ClientConfig;

use crate::config::BridgeConfig;

/// Connection settings shared by the producer and every consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSettings {
    /// Comma-separated bootstrap servers.
    pub brokers: String,
    /// Upper bound on one publish (delivery report included).
    pub publish_timeout: Duration,
}

impl KafkaSettings {
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            publish_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            brokers: config.brokers.clone(),
            publish_timeout: config.publish_timeout,
        }
    }

    fn base(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config.set("bootstrap.servers", &self.brokers);
        client_config
    }

    pub(crate) fn producer_config(&self) -> ClientConfig {
        let mut client_config = self.base();
        client_config
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("message.timeout.ms", self.publish_timeout.as_millis().to_string());
        client_config
    }

    pub(crate) fn consumer_config(&self, group_id: &str) -> ClientConfig {
        let mut client_config = self.base();
        client_config
            .set("group.id", group_id)
            // Offsets are committed by the pipeline once a record is settled.
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            // A lane may block in backoff (10s + 30s by default) before it commits.
            .set("max.poll.interval.ms", "300000");
        client_config
    }
}
