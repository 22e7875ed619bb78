//! Pipeline events, sinks and counters.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info, warn};

use courier_core::TopicPartition;

use crate::classify::Classification;
use crate::error::FailureKind;
use crate::router::DestinationKind;

/// Observable outcome of a pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Received {
        /// `None` when the value could not be decoded.
        message_id: Option<String>,
        topic: String,
        partition: i32,
        offset: i64,
    },
    RetryScheduled {
        message_id: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
        kind: FailureKind,
        classification: Classification,
    },
    DeadLettered {
        message_id: Option<String>,
        attempt: u32,
        destination: TopicPartition,
        destination_kind: DestinationKind,
        error: String,
        kind: FailureKind,
        classification: Classification,
    },
    Discarded {
        message_id: Option<String>,
        attempt: u32,
        error: String,
        classification: Classification,
    },
    Succeeded {
        message_id: String,
        attempt: u32,
    },
    /// Shutdown interrupted processing; the record stays unacknowledged.
    Aborted {
        message_id: Option<String>,
        attempt: u32,
    },
    Fatal {
        message_id: Option<String>,
        topic_partition: TopicPartition,
        offset: i64,
        error: String,
    },
}

/// Receiver of pipeline events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

impl<S> EventSink for Arc<S>
where
    S: EventSink + ?Sized,
{
    fn emit(&self, event: &PipelineEvent) {
        (**self).emit(event)
    }
}

/// Sink that logs events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Received {
                message_id,
                topic,
                partition,
                offset,
            } => info!(
                message_id = message_id.as_deref().unwrap_or("-"),
                topic = topic.as_str(),
                partition,
                offset,
                "record received"
            ),
            PipelineEvent::RetryScheduled {
                message_id,
                attempt,
                delay_ms,
                error,
                kind,
                classification,
            } => warn!(
                message_id = message_id.as_str(),
                attempt,
                delay_ms,
                error = error.as_str(),
                kind = %kind,
                classification = ?classification,
                "retry scheduled"
            ),
            PipelineEvent::DeadLettered {
                message_id,
                attempt,
                destination,
                destination_kind,
                error,
                kind,
                classification,
            } => warn!(
                message_id = message_id.as_deref().unwrap_or("-"),
                attempt,
                destination = %destination,
                destination_kind = ?destination_kind,
                error = error.as_str(),
                kind = %kind,
                classification = ?classification,
                "record routed to dead-letter destination"
            ),
            PipelineEvent::Discarded {
                message_id,
                attempt,
                error,
                classification,
            } => warn!(
                message_id = message_id.as_deref().unwrap_or("-"),
                attempt,
                error = error.as_str(),
                classification = ?classification,
                "record discarded (no dead-letter topic)"
            ),
            PipelineEvent::Succeeded {
                message_id,
                attempt,
            } => info!(message_id = message_id.as_str(), attempt, "record processed"),
            PipelineEvent::Aborted {
                message_id,
                attempt,
            } => info!(
                message_id = message_id.as_deref().unwrap_or("-"),
                attempt,
                "record processing interrupted by shutdown"
            ),
            PipelineEvent::Fatal {
                message_id,
                topic_partition,
                offset,
                error,
            } => error!(
                message_id = message_id.as_deref().unwrap_or("-"),
                topic_partition = %topic_partition,
                offset,
                error = error.as_str(),
                "fatal pipeline error"
            ),
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self, predicate: impl Fn(&PipelineEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}

/// Pipeline counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub records_received: u64,
    pub records_succeeded: u64,
    pub retries_scheduled: u64,
    pub dead_lettered: u64,
    pub requeued: u64,
    pub discarded: u64,
    pub aborted: u64,
    pub fatal_errors: u64,
}

impl PipelineStats {
    pub fn record(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Received { .. } => self.records_received += 1,
            PipelineEvent::RetryScheduled { .. } => self.retries_scheduled += 1,
            PipelineEvent::DeadLettered {
                destination_kind: DestinationKind::Requeue,
                ..
            } => self.requeued += 1,
            PipelineEvent::DeadLettered { .. } => self.dead_lettered += 1,
            PipelineEvent::Discarded { .. } => self.discarded += 1,
            PipelineEvent::Succeeded { .. } => self.records_succeeded += 1,
            PipelineEvent::Aborted { .. } => self.aborted += 1,
            PipelineEvent::Fatal { .. } => self.fatal_errors += 1,
        }
    }
}

/// Shared handle to a pipeline's counters.
#[derive(Debug, Clone, Default)]
pub struct StatsHandle(Arc<Mutex<PipelineStats>>);

impl StatsHandle {
    pub fn snapshot(&self) -> PipelineStats {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub(crate) fn record(&self, event: &PipelineEvent) {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record(event);
    }
}
