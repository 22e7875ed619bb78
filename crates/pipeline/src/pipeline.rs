//! Consumption pipeline: handler invocation, retry loop and settlement.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use courier_broker::{Publisher, Subscription};
use courier_core::BrokerRecord;

use crate::attempt::{AttemptContext, RecordState, RetryDecision};
use crate::classify::{Classification, ExceptionClassifier};
use crate::error::{HandlerError, PipelineError};
use crate::events::{EventSink, PipelineEvent, StatsHandle, TracingEventSink};
use crate::handler::MessageHandler;
use crate::policy::RetryPolicy;
use crate::router::{DeadLetterRouter, Destination};
use crate::shutdown::{ShutdownAwareSleeper, ShutdownSignal, SleepOutcome, Sleeper};

/// How a record left the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Succeeded {
        attempts: u32,
    },
    /// Published to `destination` (dead-letter topic or re-queue) and committed.
    DeadLettered {
        destination: Destination,
        attempts: u32,
    },
    /// Committed without publishing (no dead-letter topic configured).
    Discarded {
        attempts: u32,
    },
    /// Interrupted by shutdown; not committed, partition rewound.
    Aborted {
        attempts: u32,
    },
}

impl ProcessOutcome {
    pub fn state(&self) -> RecordState {
        match self {
            ProcessOutcome::Succeeded { .. } => RecordState::Succeeded,
            ProcessOutcome::DeadLettered { .. } => RecordState::DeadLettered,
            ProcessOutcome::Discarded { .. } => RecordState::Discarded,
            ProcessOutcome::Aborted { .. } => RecordState::Aborted,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            ProcessOutcome::Succeeded { attempts }
            | ProcessOutcome::DeadLettered { attempts, .. }
            | ProcessOutcome::Discarded { attempts }
            | ProcessOutcome::Aborted { attempts } => *attempts,
        }
    }
}

/// Drives one record at a time through handler, classifier, retry policy and
/// dead-letter router.
///
/// The pipeline holds no per-record state between calls; one instance is
/// shared (`Arc`) by every partition lane.
pub struct ConsumptionPipeline<P, H> {
    publisher: P,
    handler: H,
    policy: RetryPolicy,
    classifier: ExceptionClassifier,
    router: DeadLetterRouter,
    sleeper: Arc<dyn Sleeper>,
    sink: Arc<dyn EventSink>,
    stats: StatsHandle,
}

impl<P, H> ConsumptionPipeline<P, H>
where
    P: Publisher,
    H: MessageHandler,
{
    pub fn new(publisher: P, handler: H, router: DeadLetterRouter) -> Self {
        Self {
            publisher,
            handler,
            policy: RetryPolicy::default(),
            classifier: ExceptionClassifier::default(),
            router,
            sleeper: Arc::new(ShutdownAwareSleeper),
            sink: Arc::new(TracingEventSink),
            stats: StatsHandle::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_classifier(mut self, classifier: ExceptionClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn router(&self) -> &DeadLetterRouter {
        &self.router
    }

    pub fn stats(&self) -> StatsHandle {
        self.stats.clone()
    }

    /// What to do after attempt `attempt` failed with `error`.
    pub fn decide(
        &self,
        record: &BrokerRecord,
        error: &HandlerError,
        attempt: u32,
    ) -> (Classification, RetryDecision) {
        let classification = self.classifier.classify(error);

        let decision = if classification != Classification::NonRetryable
            && self.policy.has_retries_left(attempt)
        {
            RetryDecision::Retry(self.policy.next_delay(attempt))
        } else {
            match self.router.route(record, error) {
                Some(destination) => RetryDecision::DeadLetter(destination),
                None => RetryDecision::Discard,
            }
        };

        (classification, decision)
    }

    /// Process one record to completion.
    ///
    /// Blocks through backoff delays. `offsets` is the subscription the record
    /// came from; the record's offset is committed once it succeeded, was
    /// dead-lettered or was discarded. On `Err` (and on `Aborted`) the offset is
    /// not committed and the partition is rewound to the record.
    pub fn process<S>(
        &self,
        record: BrokerRecord,
        offsets: &S,
        shutdown: &ShutdownSignal,
    ) -> Result<ProcessOutcome, PipelineError>
    where
        S: Subscription + ?Sized,
    {
        if shutdown.is_requested() {
            return Ok(self.abort(&record, None, 0, offsets));
        }

        let consumed = match record.decode() {
            Ok(consumed) => consumed,
            Err(err) => {
                self.emit(PipelineEvent::Received {
                    message_id: None,
                    topic: record.topic.clone(),
                    partition: record.partition,
                    offset: record.offset,
                });
                // Decoding again cannot succeed, so the record is never retried.
                let error = HandlerError::from(err);
                let classification = self.classifier.classify(&error);
                let destination = self.router.route(&record, &error);
                return self.settle(&record, None, &error, classification, 1, destination, offsets);
            }
        };

        let message_id = consumed.message().message_id().to_string();
        self.emit(PipelineEvent::Received {
            message_id: Some(message_id.clone()),
            topic: record.topic.clone(),
            partition: record.partition,
            offset: record.offset,
        });

        let first_attempt_at = Utc::now();
        let mut context: Option<AttemptContext> = None;

        loop {
            let attempt = context.as_ref().map_or(1, |ctx| ctx.attempt_number() + 1);

            if shutdown.is_requested() {
                return Ok(self.abort(&record, Some(&message_id), attempt - 1, offsets));
            }

            debug!(
                message_id = message_id.as_str(),
                attempt,
                state = ?RecordState::Processing,
                "invoking handler"
            );

            let error = match self.handler.handle(&consumed) {
                Ok(()) => {
                    self.commit(&record, Some(&message_id), offsets)?;
                    self.emit(PipelineEvent::Succeeded {
                        message_id,
                        attempt,
                    });
                    return Ok(ProcessOutcome::Succeeded { attempts: attempt });
                }
                Err(error) => error,
            };

            let ctx = match context.take() {
                Some(mut ctx) => {
                    ctx.record_failure(error);
                    ctx
                }
                None => AttemptContext::first_failure(consumed.clone(), error, first_attempt_at),
            };

            let (classification, decision) = self.decide(&record, ctx.last_error(), attempt);

            match decision {
                RetryDecision::Retry(delay) => {
                    self.emit(PipelineEvent::RetryScheduled {
                        message_id: message_id.clone(),
                        attempt,
                        delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error: ctx.last_error().summary(),
                        kind: ctx.last_error().kind(),
                        classification,
                    });
                    debug!(
                        message_id = message_id.as_str(),
                        state = ?RecordState::RetryScheduled,
                        since_first_attempt_ms = (Utc::now() - ctx.first_attempt_at()).num_milliseconds(),
                        "backing off"
                    );

                    if self.sleeper.sleep(delay, shutdown) == SleepOutcome::Interrupted {
                        return Ok(self.abort(&record, Some(&message_id), attempt, offsets));
                    }
                    context = Some(ctx);
                }
                RetryDecision::DeadLetter(destination) => {
                    return self.settle(
                        &record,
                        Some(&message_id),
                        ctx.last_error(),
                        classification,
                        attempt,
                        Some(destination),
                        offsets,
                    );
                }
                RetryDecision::Discard => {
                    return self.settle(
                        &record,
                        Some(&message_id),
                        ctx.last_error(),
                        classification,
                        attempt,
                        None,
                        offsets,
                    );
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn settle<S>(
        &self,
        record: &BrokerRecord,
        message_id: Option<&str>,
        error: &HandlerError,
        classification: Classification,
        attempts: u32,
        destination: Option<Destination>,
        offsets: &S,
    ) -> Result<ProcessOutcome, PipelineError>
    where
        S: Subscription + ?Sized,
    {
        match destination {
            Some(destination) => {
                if let Err(err) =
                    self.router
                        .publish(&self.publisher, record, error, attempts, &destination)
                {
                    return Err(self.fail(record, message_id, offsets, err));
                }

                self.emit(PipelineEvent::DeadLettered {
                    message_id: message_id.map(str::to_string),
                    attempt: attempts,
                    destination: destination.topic_partition.clone(),
                    destination_kind: destination.kind,
                    error: error.summary(),
                    kind: error.root_cause().kind(),
                    classification,
                });
                self.commit(record, message_id, offsets)?;

                Ok(ProcessOutcome::DeadLettered {
                    destination,
                    attempts,
                })
            }
            None => {
                self.emit(PipelineEvent::Discarded {
                    message_id: message_id.map(str::to_string),
                    attempt: attempts,
                    error: error.summary(),
                    classification,
                });
                self.commit(record, message_id, offsets)?;

                Ok(ProcessOutcome::Discarded { attempts })
            }
        }
    }

    fn commit<S>(
        &self,
        record: &BrokerRecord,
        message_id: Option<&str>,
        offsets: &S,
    ) -> Result<(), PipelineError>
    where
        S: Subscription + ?Sized,
    {
        let tp = record.topic_partition();
        offsets.commit(&tp, record.offset).map_err(|source| {
            self.fail(
                record,
                message_id,
                offsets,
                PipelineError::Commit {
                    tp: tp.clone(),
                    offset: record.offset,
                    source,
                },
            )
        })
    }

    /// Rewind the partition to the record and report the fatal error.
    fn fail<S>(
        &self,
        record: &BrokerRecord,
        message_id: Option<&str>,
        offsets: &S,
        err: PipelineError,
    ) -> PipelineError
    where
        S: Subscription + ?Sized,
    {
        self.rewind(record, offsets);
        self.emit(PipelineEvent::Fatal {
            message_id: message_id.map(str::to_string),
            topic_partition: record.topic_partition(),
            offset: record.offset,
            error: err.to_string(),
        });
        err
    }

    fn abort<S>(
        &self,
        record: &BrokerRecord,
        message_id: Option<&str>,
        attempts: u32,
        offsets: &S,
    ) -> ProcessOutcome
    where
        S: Subscription + ?Sized,
    {
        self.rewind(record, offsets);
        self.emit(PipelineEvent::Aborted {
            message_id: message_id.map(str::to_string),
            attempt: attempts,
        });
        ProcessOutcome::Aborted { attempts }
    }

    fn rewind<S>(&self, record: &BrokerRecord, offsets: &S)
    where
        S: Subscription + ?Sized,
    {
        let tp = record.topic_partition();
        if let Err(err) = offsets.seek(&tp, record.offset) {
            warn!(
                topic_partition = %tp,
                offset = record.offset,
                error = %err,
                "failed to rewind partition"
            );
        }
    }

    fn emit(&self, event: PipelineEvent) {
        self.stats.record(&event);
        self.sink.emit(&event);
    }
}
