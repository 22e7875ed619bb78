//! Failure-handling consumption pipeline.
//!
//! A record flows through handler -> classifier -> retry policy -> dead-letter
//! router. Retries block the record's partition lane; terminal failures are
//! published to a dead-letter destination (or re-queued to their origin on
//! transient infrastructure failures) before the offset is committed.

pub mod attempt;
pub mod classify;
pub mod error;
pub mod events;
pub mod handler;
pub mod pipeline;
pub mod policy;
pub mod router;
pub mod shutdown;
pub mod worker;

pub use attempt::{AttemptContext, RecordState, RetryDecision};
pub use classify::{Classification, ExceptionClassifier};
pub use error::{FailureKind, HandlerError, PipelineError};
pub use events::{
    EventSink, PipelineEvent, PipelineStats, RecordingEventSink, StatsHandle, TracingEventSink,
};
pub use handler::{LoggingHandler, MessageHandler};
pub use pipeline::{ConsumptionPipeline, ProcessOutcome};
pub use policy::RetryPolicy;
pub use router::{DeadLetterRouter, Destination, DestinationKind};
pub use shutdown::{RecordingSleeper, ShutdownAwareSleeper, ShutdownSignal, SleepOutcome, Sleeper};
pub use worker::{ConsumerWorker, WorkerConfig, WorkerHandle};
