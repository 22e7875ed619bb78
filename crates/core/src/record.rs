//! Broker-level record types (what travels over the wire, plus delivery metadata).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MessageResult;
use crate::message::Message;

/// Record headers. Ordered so emitted headers are deterministic.
pub type Headers = BTreeMap<String, String>;

/// A topic + partition pair (the unit of ordering and offset tracking).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    topic: String,
    partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }
}

impl core::fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// A record as delivered by a broker subscription (value not yet decoded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: Headers,
    pub timestamp: Option<DateTime<Utc>>,
}

impl BrokerRecord {
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }

    /// Decode the value into a [`ConsumedRecord`].
    pub fn decode(&self) -> MessageResult<ConsumedRecord> {
        let message = Message::from_json(&self.payload)?;
        Ok(ConsumedRecord {
            message,
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
            key: self.key.clone(),
        })
    }
}

/// A record to publish. `partition: None` lets the broker pick (key hashing).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub partition: Option<i32>,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub headers: Headers,
}

impl OutboundRecord {
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            key: None,
            payload,
            headers: Headers::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Build a record carrying a JSON-encoded [`Message`].
    pub fn for_message(topic: impl Into<String>, message: &Message) -> MessageResult<Self> {
        Ok(Self::new(topic, message.to_json()?))
    }
}

/// Where a published record landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A decoded message plus its delivery metadata.
///
/// Owned by the consumption pipeline for one processing run; read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedRecord {
    message: Message,
    topic: String,
    partition: i32,
    offset: i64,
    key: Option<String>,
}

impl ConsumedRecord {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(payload: &[u8]) -> BrokerRecord {
        BrokerRecord {
            topic: "messages".to_string(),
            partition: 2,
            offset: 41,
            key: Some("k".to_string()),
            payload: payload.to_vec(),
            headers: Headers::new(),
            timestamp: None,
        }
    }

    #[test]
    fn decode_keeps_delivery_metadata() {
        let rec = raw(br#"{"messageId":"m1","message":"hi","date":"2024-01-01"}"#)
            .decode()
            .unwrap();

        assert_eq!(rec.topic(), "messages");
        assert_eq!(rec.partition(), 2);
        assert_eq!(rec.offset(), 41);
        assert_eq!(rec.key(), Some("k"));
        assert_eq!(rec.message().message_id(), "m1");
    }

    #[test]
    fn decode_fails_on_bad_value() {
        assert!(raw(b"{}").decode().is_err());
    }

    #[test]
    fn topic_partition_display() {
        assert_eq!(TopicPartition::new("messages", 3).to_string(), "messages-3");
    }
}
