//! Per-record attempt tracking and decisions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use courier_core::ConsumedRecord;

use crate::error::HandlerError;
use crate::router::Destination;

/// Retry bookkeeping for one record.
///
/// Created on the first failure, updated on every later failure, dropped once
/// the record is acknowledged (success, dead-letter, discard).
#[derive(Debug, Clone)]
pub struct AttemptContext {
    record: ConsumedRecord,
    attempt_number: u32,
    last_error: HandlerError,
    first_attempt_at: DateTime<Utc>,
}

impl AttemptContext {
    pub fn first_failure(
        record: ConsumedRecord,
        error: HandlerError,
        first_attempt_at: DateTime<Utc>,
    ) -> Self {
        Self {
            record,
            attempt_number: 1,
            last_error: error,
            first_attempt_at,
        }
    }

    /// Register the failure of the next attempt.
    pub fn record_failure(&mut self, error: HandlerError) {
        self.attempt_number += 1;
        self.last_error = error;
    }

    pub fn record(&self) -> &ConsumedRecord {
        &self.record
    }

    /// Attempts made so far (all of them failed).
    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }

    pub fn last_error(&self) -> &HandlerError {
        &self.last_error
    }

    pub fn first_attempt_at(&self) -> DateTime<Utc> {
        self.first_attempt_at
    }
}

/// What to do with a failed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Block the partition for the delay, then attempt again.
    Retry(Duration),
    /// Publish to the destination, then acknowledge.
    DeadLetter(Destination),
    /// Acknowledge without publishing anywhere.
    Discard,
}

/// Per-record processing states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Received,
    Processing,
    Succeeded,
    RetryScheduled,
    DeadLettered,
    Discarded,
    Aborted,
    Fatal,
}

impl RecordState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecordState::Succeeded
                | RecordState::DeadLettered
                | RecordState::Discarded
                | RecordState::Aborted
                | RecordState::Fatal
        )
    }

    /// Whether the record's offset is committed in this state.
    pub fn is_acknowledged(&self) -> bool {
        matches!(
            self,
            RecordState::Succeeded | RecordState::DeadLettered | RecordState::Discarded
        )
    }
}
