//! Error classification (retryable / non-retryable / unclassified).

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{FailureKind, HandlerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Retrying could plausibly succeed.
    Retryable,
    /// Retrying cannot succeed; dead-letter on first failure.
    NonRetryable,
    /// No explicit rule; retried until attempts are exhausted.
    Unclassified,
}

/// Fixed `FailureKind -> Classification` table.
///
/// Built once at startup (extend with [`ExceptionClassifier::with_rule`]) and
/// immutable afterwards. `classify` is a pure function of the error.
#[derive(Debug, Clone)]
pub struct ExceptionClassifier {
    table: HashMap<FailureKind, Classification>,
}

impl Default for ExceptionClassifier {
    fn default() -> Self {
        Self::empty()
            .with_rule(FailureKind::TransientInfra, Classification::Retryable)
            .with_rule(FailureKind::MissingValue, Classification::Retryable)
            .with_rule(FailureKind::InvalidArgument, Classification::NonRetryable)
            .with_rule(FailureKind::Deserialization, Classification::NonRetryable)
    }
}

impl ExceptionClassifier {
    /// Classifier with no rules: everything is `Unclassified`.
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, kind: FailureKind, classification: Classification) -> Self {
        self.table.insert(kind, classification);
        self
    }

    /// Classify an error by walking its cause chain outermost first; the first
    /// kind with a rule wins.
    pub fn classify(&self, error: &HandlerError) -> Classification {
        error
            .chain()
            .find_map(|e| self.table.get(&e.kind()).copied())
            .unwrap_or(Classification::Unclassified)
    }
}
