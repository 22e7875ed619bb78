use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use courier_core::{Message, MessageResult};

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /kafka/message`.
///
/// `date` accepts the `localDate` / `producedDate` aliases and defaults to
/// today (UTC) when absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishMessageRequest {
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "localDate", alias = "producedDate")]
    pub date: Option<NaiveDate>,
}

impl PublishMessageRequest {
    pub fn into_message(self) -> MessageResult<Message> {
        let date = self.date.unwrap_or_else(|| Utc::now().date_naive());
        Message::new(self.message_id, self.message, date)
    }
}
