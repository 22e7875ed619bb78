use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{MessageError, MessageResult};

/// Payload published by the producer endpoint and consumed by the pipeline.
///
/// Immutable once built. The JSON shape is
/// `{"messageId": "...", "message": "...", "date": "YYYY-MM-DD"}`; older
/// producers send the date as `localDate`, which is accepted as an alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "WireMessage")]
pub struct Message {
    message_id: String,
    message: String,
    #[serde(rename = "date")]
    produced_date: NaiveDate,
}

/// Decoded shape, validated through [`Message::new`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    message_id: String,
    message: String,
    #[serde(rename = "date", alias = "localDate", alias = "producedDate")]
    produced_date: NaiveDate,
}

impl TryFrom<WireMessage> for Message {
    type Error = MessageError;

    fn try_from(wire: WireMessage) -> MessageResult<Self> {
        Message::new(wire.message_id, wire.message, wire.produced_date)
    }
}

impl Message {
    pub fn new(
        message_id: impl Into<String>,
        message: impl Into<String>,
        produced_date: NaiveDate,
    ) -> MessageResult<Self> {
        let message_id = message_id.into();
        if message_id.trim().is_empty() {
            return Err(MessageError::validation("messageId is required"));
        }

        Ok(Self {
            message_id,
            message: message.into(),
            produced_date,
        })
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn produced_date(&self) -> NaiveDate {
        self.produced_date
    }

    /// Decode a record value. Any shape mismatch is a `Malformed` error.
    pub fn from_json(payload: &[u8]) -> MessageResult<Self> {
        serde_json::from_slice(payload).map_err(|e| MessageError::malformed(e.to_string()))
    }

    pub fn to_json(&self) -> MessageResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| MessageError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn decodes_wire_shape() {
        let msg =
            Message::from_json(br#"{"messageId":"m1","message":"hello","date":"2024-01-01"}"#)
                .unwrap();

        assert_eq!(msg.message_id(), "m1");
        assert_eq!(msg.message(), "hello");
        assert_eq!(msg.produced_date(), date(2024, 1, 1));
    }

    #[test]
    fn accepts_legacy_local_date_field() {
        let msg =
            Message::from_json(br#"{"messageId":"m2","message":"x","localDate":"2023-05-17"}"#)
                .unwrap();
        assert_eq!(msg.produced_date(), date(2023, 5, 17));
    }

    #[test]
    fn encodes_date_as_iso() {
        let msg = Message::new("m1", "hello", date(2024, 1, 1)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&msg.to_json().unwrap()).unwrap();

        assert_eq!(json["messageId"], "m1");
        assert_eq!(json["date"], "2024-01-01");
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(matches!(
            Message::from_json(b"not json"),
            Err(MessageError::Malformed(_))
        ));
        assert!(matches!(
            Message::from_json(br#"{"messageId":"m1","message":"x","date":"yesterday"}"#),
            Err(MessageError::Malformed(_))
        ));
        assert!(matches!(
            Message::from_json(br#"{"message":"x","date":"2024-01-01"}"#),
            Err(MessageError::Malformed(_))
        ));
    }

    #[test]
    fn empty_message_id_is_rejected_on_decode() {
        assert!(matches!(
            Message::from_json(br#"{"messageId":"","message":"x","date":"2024-01-01"}"#),
            Err(MessageError::Malformed(_))
        ));
    }

    #[test]
    fn empty_message_id_is_rejected_on_construction() {
        assert!(matches!(
            Message::new("  ", "x", date(2024, 1, 1)),
            Err(MessageError::Validation(_))
        ));
    }
}
