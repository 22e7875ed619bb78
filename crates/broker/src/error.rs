use thiserror::Error;

/// Typed failure surfaced by a broker client adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    /// Network / connectivity failure (broker unreachable, request timed out).
    #[error("broker transport failure: {0}")]
    Transport(String),

    /// The topic or partition does not exist on the broker.
    #[error("unknown topic or partition: {0}")]
    UnknownTopicPartition(String),

    /// The subscription was closed (consumer shut down, broker gone).
    #[error("subscription closed")]
    Closed,

    /// Any other client-side failure (bad configuration, rejected request).
    #[error("broker client error: {0}")]
    Client(String),

    /// Internal lock poisoning (in-process adapters only).
    #[error("broker state poisoned")]
    Poisoned,
}

impl BrokerError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client(msg.into())
    }

    /// Whether this failure is a transient connectivity problem.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transport(_))
    }
}
