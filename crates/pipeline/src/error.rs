//! Failure taxonomy for record processing.

use serde::Serialize;
use thiserror::Error;

use courier_broker::BrokerError;
use courier_core::{MessageError, TopicPartition};

/// Tag carried by every handler failure; drives classification and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network / broker connectivity failure.
    TransientInfra,
    /// A required value was missing while handling the record.
    MissingValue,
    /// The record carried an argument the handler rejects.
    InvalidArgument,
    /// The record value is not a valid message.
    Deserialization,
    /// Anything the handler did not tag more precisely.
    Unclassified,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::TransientInfra => "transient_infra",
            FailureKind::MissingValue => "missing_value",
            FailureKind::InvalidArgument => "invalid_argument",
            FailureKind::Deserialization => "deserialization",
            FailureKind::Unclassified => "unclassified",
        }
    }
}

impl core::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure returned by a message handler.
///
/// Errors form a cause chain (outermost first). Classification walks the chain
/// from the outside in; dead-letter routing looks at the root cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    kind: FailureKind,
    message: String,
    #[source]
    cause: Option<Box<HandlerError>>,
}

impl HandlerError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientInfra, message)
    }

    pub fn missing_value(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MissingValue, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidArgument, message)
    }

    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Deserialization, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unclassified, message)
    }

    /// Attach the underlying cause of this failure.
    pub fn caused_by(mut self, cause: HandlerError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&HandlerError> {
        self.cause.as_deref()
    }

    /// This error followed by its causes, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &HandlerError> {
        core::iter::successors(Some(self), |e| e.cause())
    }

    /// The innermost cause (the error itself when it has none).
    pub fn root_cause(&self) -> &HandlerError {
        self.chain().last().unwrap_or(self)
    }

    /// `outer: inner: root` style summary used in logs and headers.
    pub fn summary(&self) -> String {
        self.chain()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join(": ")
    }
}

impl From<BrokerError> for HandlerError {
    fn from(err: BrokerError) -> Self {
        if err.is_transient() {
            HandlerError::transient(err.to_string())
        } else {
            HandlerError::other(err.to_string())
        }
    }
}

impl From<MessageError> for HandlerError {
    fn from(err: MessageError) -> Self {
        match err {
            MessageError::Malformed(msg) => HandlerError::deserialization(msg),
            MessageError::Validation(msg) => HandlerError::invalid_argument(msg),
            MessageError::Encoding(msg) => HandlerError::other(msg),
        }
    }
}

/// Failures that stop a partition lane. The record is left unacknowledged.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("dead-letter publish to {destination} failed: {source}")]
    DeadLetterPublish {
        destination: TopicPartition,
        #[source]
        source: BrokerError,
    },

    #[error("offset commit for {tp} at offset {offset} failed: {source}")]
    Commit {
        tp: TopicPartition,
        offset: i64,
        #[source]
        source: BrokerError,
    },

    #[error("subscription failed: {0}")]
    Subscription(#[source] BrokerError),

    #[error("worker failed to start: {0}")]
    Spawn(String),
}
