//! Failure-handling scenarios against the in-memory broker.
//!
//! Backoff is observed through a recording sleeper, so no test waits for the
//! real 10s/30s schedule.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use courier_broker::{Broker, BrokerError, InMemoryBroker, InMemorySubscription, Publisher, Subscription};
use courier_core::{BrokerRecord, ConsumedRecord, Message, OutboundRecord, TopicPartition};
use courier_pipeline::router::{HEADER_ATTEMPTS, HEADER_REQUEUE_COUNT};
use courier_pipeline::{
    ConsumerWorker, ConsumptionPipeline, DeadLetterRouter, DestinationKind, HandlerError,
    LoggingHandler, MessageHandler, PipelineError, PipelineEvent, ProcessOutcome,
    RecordState, RecordingEventSink, RecordingSleeper, RetryPolicy, ShutdownAwareSleeper,
    ShutdownSignal, SleepOutcome, Sleeper, WorkerConfig,
};

const SOURCE: &str = "messages";
const DLT: &str = "messages.DLT";
const GROUP: &str = "courier-group";
const POLL: Duration = Duration::from_millis(200);

struct Harness {
    broker: InMemoryBroker,
    subscription: InMemorySubscription,
    sleeper: Arc<RecordingSleeper>,
    sink: Arc<RecordingEventSink>,
    shutdown: ShutdownSignal,
}

fn harness() -> Harness {
    let broker = InMemoryBroker::with_default_partitions(3);
    broker.create_topic(SOURCE, 3).unwrap();
    let subscription = broker.subscribe(&[SOURCE.to_string()], GROUP).unwrap();

    Harness {
        broker,
        subscription,
        sleeper: Arc::new(RecordingSleeper::new()),
        sink: Arc::new(RecordingEventSink::new()),
        shutdown: ShutdownSignal::new(),
    }
}

impl Harness {
    fn pipeline<H: MessageHandler>(
        &self,
        handler: H,
        router: DeadLetterRouter,
    ) -> ConsumptionPipeline<InMemoryBroker, H> {
        ConsumptionPipeline::new(self.broker.clone(), handler, router)
            .with_sleeper(self.sleeper.clone())
            .with_event_sink(self.sink.clone())
    }

    fn publish(&self, id: &str, partition: i32) -> i64 {
        let message = Message::new(id, "hello", date()).unwrap();
        let record = OutboundRecord::for_message(SOURCE, &message)
            .unwrap()
            .with_key(id)
            .with_partition(partition);
        self.broker.publish(record).unwrap().offset
    }

    fn next_record(&self) -> BrokerRecord {
        self.subscription
            .poll(POLL)
            .unwrap()
            .expect("a record should be available")
    }

    fn committed(&self, partition: i32) -> Option<i64> {
        self.broker
            .committed(GROUP, &TopicPartition::new(SOURCE, partition))
            .unwrap()
    }

    fn count(&self, predicate: impl Fn(&PipelineEvent) -> bool) -> usize {
        self.sink.count(predicate)
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn dlt_router() -> DeadLetterRouter {
    DeadLetterRouter::new(DLT)
}

/// Handler that always fails with `make()` and counts its invocations.
fn failing(
    calls: Arc<AtomicU32>,
    make: fn() -> HandlerError,
) -> impl Fn(&ConsumedRecord) -> Result<(), HandlerError> + Send + Sync {
    move |_record: &ConsumedRecord| {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(make())
    }
}

fn is_retry(e: &PipelineEvent) -> bool {
    matches!(e, PipelineEvent::RetryScheduled { .. })
}

fn is_dead_letter(e: &PipelineEvent) -> bool {
    matches!(e, PipelineEvent::DeadLettered { .. })
}

fn is_received(e: &PipelineEvent) -> bool {
    matches!(e, PipelineEvent::Received { .. })
}

#[test]
fn successful_message_is_committed_with_one_received_event() {
    let h = harness();
    let message = Message::new("m1", "hello", date()).unwrap();
    let delivery = h
        .broker
        .publish(OutboundRecord::for_message(SOURCE, &message).unwrap())
        .unwrap();

    let pipeline = h.pipeline(LoggingHandler, dlt_router());
    let outcome = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Succeeded { attempts: 1 });
    assert_eq!(outcome.state(), RecordState::Succeeded);
    assert_eq!(h.committed(delivery.partition), Some(delivery.offset + 1));
    assert_eq!(h.count(is_received), 1);
    assert_eq!(h.count(is_retry), 0);
    assert_eq!(h.count(is_dead_letter), 0);
    assert!(h.sleeper.delays().is_empty());
    assert!(h.broker.records(DLT).unwrap().is_empty());

    let stats = pipeline.stats().snapshot();
    assert_eq!(stats.records_received, 1);
    assert_eq!(stats.records_succeeded, 1);
}

#[test]
fn non_retryable_failure_is_dead_lettered_after_one_attempt() {
    let h = harness();
    let offset = h.publish("m1", 1);
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = h.pipeline(
        failing(calls.clone(), || HandlerError::invalid_argument("negative amount")),
        dlt_router(),
    );
    let outcome = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();

    match outcome {
        ProcessOutcome::DeadLettered {
            destination,
            attempts,
        } => {
            assert_eq!(attempts, 1);
            assert_eq!(destination.topic_partition, TopicPartition::new(DLT, 1));
            assert_eq!(destination.kind, DestinationKind::DeadLetter);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(h.sleeper.delays().is_empty());
    assert_eq!(h.committed(1), Some(offset + 1));

    let dead = h.broker.records(DLT).unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].partition, 1);
    assert_eq!(dead[0].key.as_deref(), Some("m1"));
    assert_eq!(dead[0].headers[HEADER_ATTEMPTS], "1");
}

#[test]
fn retryable_failure_backs_off_then_dead_letters_after_three_attempts() {
    let h = harness();
    h.publish("m1", 2);
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = h.pipeline(
        failing(calls.clone(), || HandlerError::missing_value("customer not found")),
        dlt_router(),
    );
    let outcome = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();

    assert_eq!(outcome.attempts(), 3);
    assert_eq!(outcome.state(), RecordState::DeadLettered);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        h.sleeper.delays(),
        vec![Duration::from_secs(10), Duration::from_secs(30)]
    );

    let retries: Vec<(u32, u64)> = h
        .sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            PipelineEvent::RetryScheduled {
                attempt, delay_ms, ..
            } => Some((attempt, delay_ms)),
            _ => None,
        })
        .collect();
    assert_eq!(retries, vec![(1, 10_000), (2, 30_000)]);

    let dead = h.broker.records(DLT).unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].partition, 2);
    assert_eq!(dead[0].headers[HEADER_ATTEMPTS], "3");
}

#[test]
fn unclassified_failure_is_retried_until_exhausted() {
    let h = harness();
    h.publish("m1", 0);
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = h.pipeline(failing(calls.clone(), || HandlerError::other("boom")), dlt_router());
    let outcome = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();

    assert_eq!(outcome.attempts(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.count(is_retry), 2);
    assert_eq!(h.broker.records(DLT).unwrap().len(), 1);
}

#[test]
fn transient_failure_is_requeued_to_original_partition() {
    let h = harness();
    let offset = h.publish("m1", 1);
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = h.pipeline(
        failing(calls.clone(), || {
            HandlerError::other("listener failed")
                .caused_by(HandlerError::transient("connection reset"))
        }),
        dlt_router(),
    );
    let outcome = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();

    match outcome {
        ProcessOutcome::DeadLettered { destination, .. } => {
            assert_eq!(destination.topic_partition, TopicPartition::new(SOURCE, 1));
            assert!(destination.is_requeue());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    assert!(h.broker.records(DLT).unwrap().is_empty());
    assert_eq!(h.committed(1), Some(offset + 1));

    let requeued = h.next_record();
    assert_eq!(requeued.partition, 1);
    assert_eq!(requeued.offset, offset + 1);
    assert_eq!(requeued.headers[HEADER_REQUEUE_COUNT], "1");
    assert_eq!(pipeline.stats().snapshot().requeued, 1);
}

#[test]
fn requeue_bound_sends_record_to_dead_letter_topic() {
    let h = harness();
    h.publish("m1", 0);
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = h
        .pipeline(
            failing(calls.clone(), || HandlerError::transient("broker unreachable")),
            dlt_router().with_max_requeues(1),
        )
        .with_policy(RetryPolicy::no_retry());

    let first = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();
    assert!(matches!(
        first,
        ProcessOutcome::DeadLettered { ref destination, .. } if destination.is_requeue()
    ));

    let second = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();
    match second {
        ProcessOutcome::DeadLettered { destination, .. } => {
            assert_eq!(destination.kind, DestinationKind::DeadLetter);
            assert_eq!(destination.topic_partition, TopicPartition::new(DLT, 0));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn recovery_on_retry_commits_without_dead_lettering() {
    let h = harness();
    let offset = h.publish("m1", 0);
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let pipeline = h.pipeline(
        move |_record: &ConsumedRecord| -> Result<(), HandlerError> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(HandlerError::missing_value("not yet"))
            } else {
                Ok(())
            }
        },
        dlt_router(),
    );
    let outcome = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Succeeded { attempts: 2 });
    assert_eq!(h.sleeper.delays(), vec![Duration::from_secs(10)]);
    assert_eq!(h.committed(0), Some(offset + 1));
    assert_eq!(h.count(is_dead_letter), 0);
}

#[test]
fn malformed_payload_is_dead_lettered_without_invoking_handler() {
    let h = harness();
    h.broker
        .publish(OutboundRecord::new(SOURCE, b"not json".to_vec()).with_partition(2))
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = h.pipeline(failing(calls.clone(), || HandlerError::other("unused")), dlt_router());
    let outcome = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();

    assert_eq!(outcome.attempts(), 1);
    assert_eq!(outcome.state(), RecordState::DeadLettered);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(h.sleeper.delays().is_empty());
    assert_eq!(h.committed(2), Some(1));

    let dead = h.broker.records(DLT).unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].payload, b"not json".to_vec());

    assert!(h.sink.events().iter().any(|e| matches!(
        e,
        PipelineEvent::Received {
            message_id: None,
            ..
        }
    )));
}

#[test]
fn failed_dead_letter_publish_is_fatal_and_rewinds() {
    let h = harness();
    let offset = h.publish("m1", 0);
    h.broker
        .fail_publishes_to(DLT, BrokerError::transport("dead-letter topic unreachable"))
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = h.pipeline(
        failing(calls.clone(), || HandlerError::invalid_argument("bad")),
        dlt_router(),
    );
    let err = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap_err();

    assert!(matches!(err, PipelineError::DeadLetterPublish { .. }));
    assert_eq!(h.committed(0), None);
    assert_eq!(pipeline.stats().snapshot().fatal_errors, 1);

    // The record is delivered again.
    assert_eq!(h.next_record().offset, offset);
}

#[test]
fn commit_failure_is_fatal() {
    let h = harness();
    h.publish("m1", 0);
    let record = h.next_record();
    h.broker.close().unwrap();

    let pipeline = h.pipeline(LoggingHandler, dlt_router());
    let err = pipeline
        .process(record, &h.subscription, &h.shutdown)
        .unwrap_err();

    assert!(matches!(err, PipelineError::Commit { offset: 0, .. }));
    assert_eq!(h.count(|e| matches!(e, PipelineEvent::Fatal { .. })), 1);
}

#[test]
fn failures_are_discarded_when_dead_lettering_is_disabled() {
    let h = harness();
    let offset = h.publish("m1", 1);
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = h.pipeline(
        failing(calls.clone(), || HandlerError::invalid_argument("bad")),
        DeadLetterRouter::discarding(),
    );
    let outcome = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Discarded { attempts: 1 });
    assert_eq!(h.committed(1), Some(offset + 1));
    assert!(h.broker.records(DLT).unwrap().is_empty());
    assert_eq!(pipeline.stats().snapshot().discarded, 1);
}

#[test]
fn dead_letter_partition_is_remapped_when_topic_is_smaller() {
    let h = harness();
    h.broker.create_topic(DLT, 1).unwrap();
    h.publish("m1", 2);
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = h.pipeline(
        failing(calls.clone(), || HandlerError::invalid_argument("bad")),
        dlt_router().with_dead_letter_partitions(1),
    );
    let outcome = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();

    match outcome {
        ProcessOutcome::DeadLettered { destination, .. } => {
            assert_eq!(destination.topic_partition, TopicPartition::new(DLT, 0));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

/// Requests shutdown as soon as a backoff starts.
struct InterruptingSleeper;

impl Sleeper for InterruptingSleeper {
    fn sleep(&self, _delay: Duration, shutdown: &ShutdownSignal) -> SleepOutcome {
        shutdown.request();
        SleepOutcome::Interrupted
    }
}

#[test]
fn shutdown_during_backoff_leaves_record_uncommitted() {
    let h = harness();
    let offset = h.publish("m1", 0);
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = h
        .pipeline(
            failing(calls.clone(), || HandlerError::missing_value("later")),
            dlt_router(),
        )
        .with_sleeper(Arc::new(InterruptingSleeper));
    let outcome = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Aborted { attempts: 1 });
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.committed(0), None);
    assert!(h.broker.records(DLT).unwrap().is_empty());
    assert_eq!(h.next_record().offset, offset);
}

#[test]
fn shutdown_wakes_a_real_backoff_early() {
    let h = harness();
    h.publish("m1", 0);
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = h
        .pipeline(
            failing(calls.clone(), || HandlerError::missing_value("later")),
            dlt_router(),
        )
        .with_sleeper(Arc::new(ShutdownAwareSleeper));

    let remote = h.shutdown.clone();
    let trigger = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        remote.request();
    });

    let started = Instant::now();
    let outcome = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();
    trigger.join().unwrap();

    assert_eq!(outcome.state(), RecordState::Aborted);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(h.committed(0), None);
}

#[test]
fn pending_shutdown_prevents_the_first_attempt() {
    let h = harness();
    h.publish("m1", 0);
    let calls = Arc::new(AtomicU32::new(0));
    h.shutdown.request();

    let pipeline = h.pipeline(failing(calls.clone(), || HandlerError::other("unused")), dlt_router());
    let outcome = pipeline
        .process(h.next_record(), &h.subscription, &h.shutdown)
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Aborted { attempts: 0 });
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

fn wait_until(deadline: Duration, done: impl Fn() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    done()
}

#[test]
fn worker_processes_each_partition_in_offset_order() {
    let h = harness();
    for partition in 0..3 {
        for i in 0..5 {
            h.publish(&format!("p{partition}-m{i}"), partition);
        }
    }

    let seen: Arc<Mutex<Vec<(i32, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let pipeline = Arc::new(h.pipeline(
        move |record: &ConsumedRecord| -> Result<(), HandlerError> {
            recorder
                .lock()
                .unwrap()
                .push((record.partition(), record.message().message_id().to_string()));
            Ok(())
        },
        dlt_router(),
    ));
    let stats = pipeline.stats();

    let handle = ConsumerWorker::spawn(
        WorkerConfig::default().with_poll_interval(Duration::from_millis(20)),
        h.broker.subscribe(&[SOURCE.to_string()], GROUP).unwrap(),
        pipeline,
        ShutdownSignal::new(),
    )
    .unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        stats.snapshot().records_succeeded == 15
    }));
    handle.shutdown().unwrap();

    let seen = seen.lock().unwrap();
    for partition in 0..3 {
        let ids: Vec<&str> = seen
            .iter()
            .filter(|(p, _)| *p == partition)
            .map(|(_, id)| id.as_str())
            .collect();
        let expected: Vec<String> = (0..5).map(|i| format!("p{partition}-m{i}")).collect();
        assert_eq!(ids, expected);
        assert_eq!(h.committed(partition), Some(5));
    }
}

#[test]
fn worker_stops_on_fatal_dead_letter_failure() {
    let h = harness();
    h.publish("m1", 0);
    h.broker
        .fail_publishes_to(DLT, BrokerError::transport("down"))
        .unwrap();
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = Arc::new(h.pipeline(
        failing(calls.clone(), || HandlerError::invalid_argument("bad")),
        dlt_router(),
    ));

    let handle = ConsumerWorker::spawn(
        WorkerConfig::default().with_poll_interval(Duration::from_millis(20)),
        h.broker.subscribe(&[SOURCE.to_string()], GROUP).unwrap(),
        pipeline,
        ShutdownSignal::new(),
    )
    .unwrap();
    let signal = handle.signal();

    assert!(signal.wait_timeout(Duration::from_secs(5)));
    let err = handle.join().unwrap_err();
    assert!(matches!(err, PipelineError::DeadLetterPublish { .. }));
    assert_eq!(h.committed(0), None);
}

#[test]
fn worker_shutdown_interrupts_backoff_without_committing() {
    let h = harness();
    h.publish("m1", 0);
    let calls = Arc::new(AtomicU32::new(0));

    let pipeline = Arc::new(
        h.pipeline(
            failing(calls.clone(), || HandlerError::missing_value("later")),
            dlt_router(),
        )
        .with_sleeper(Arc::new(ShutdownAwareSleeper)),
    );

    let handle = ConsumerWorker::spawn(
        WorkerConfig::default().with_poll_interval(Duration::from_millis(20)),
        h.broker.subscribe(&[SOURCE.to_string()], GROUP).unwrap(),
        pipeline,
        ShutdownSignal::new(),
    )
    .unwrap();

    assert!(wait_until(Duration::from_secs(5), || calls.load(Ordering::SeqCst) == 1));

    let started = Instant::now();
    handle.shutdown().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(h.committed(0), None);
    assert!(h.broker.records(DLT).unwrap().is_empty());
}

/// Subscription that counts the records it hands out per partition.
struct CountingSubscription {
    inner: InMemorySubscription,
    handed_out: Arc<Mutex<Vec<(i32, i64)>>>,
}

impl Subscription for CountingSubscription {
    fn poll(&self, timeout: Duration) -> Result<Option<BrokerRecord>, BrokerError> {
        let record = self.inner.poll(timeout)?;
        if let Some(record) = &record {
            self.handed_out
                .lock()
                .unwrap()
                .push((record.partition, record.offset));
        }
        Ok(record)
    }

    fn commit(&self, tp: &TopicPartition, offset: i64) -> Result<(), BrokerError> {
        self.inner.commit(tp, offset)
    }

    fn seek(&self, tp: &TopicPartition, offset: i64) -> Result<(), BrokerError> {
        self.inner.seek(tp, offset)
    }

    fn pause(&self, tp: &TopicPartition) -> Result<(), BrokerError> {
        self.inner.pause(tp)
    }

    fn resume(&self, tp: &TopicPartition) -> Result<(), BrokerError> {
        self.inner.resume(tp)
    }
}

#[test]
fn partition_in_backoff_is_not_polled_further() {
    let h = harness();
    for i in 0..50 {
        h.publish(&format!("m{i}"), 0);
    }
    h.publish("other", 1);

    let calls = Arc::new(AtomicU32::new(0));
    let pipeline = Arc::new(
        h.pipeline(
            failing(calls.clone(), || HandlerError::missing_value("later")),
            dlt_router(),
        )
        .with_sleeper(Arc::new(ShutdownAwareSleeper)),
    );

    let handed_out = Arc::new(Mutex::new(Vec::new()));
    let subscription = CountingSubscription {
        inner: h.broker.subscribe(&[SOURCE.to_string()], GROUP).unwrap(),
        handed_out: handed_out.clone(),
    };

    let handle = ConsumerWorker::spawn(
        WorkerConfig::default().with_poll_interval(Duration::from_millis(20)),
        subscription,
        pipeline,
        ShutdownSignal::new(),
    )
    .unwrap();

    // Both lanes enter the 10s backoff of their first record.
    assert!(wait_until(Duration::from_secs(5), || calls.load(Ordering::SeqCst) == 2));
    std::thread::sleep(Duration::from_millis(300));

    let polled_from_blocked: Vec<i64> = handed_out
        .lock()
        .unwrap()
        .iter()
        .filter(|(partition, _)| *partition == 0)
        .map(|(_, offset)| *offset)
        .collect();
    assert_eq!(polled_from_blocked, vec![0]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    handle.shutdown().unwrap();
    assert_eq!(h.committed(0), None);
}

#[test]
fn settled_record_resumes_its_partition() {
    let h = harness();
    for i in 0..3 {
        h.publish(&format!("m{i}"), 0);
    }

    let pipeline = Arc::new(h.pipeline(
        |record: &ConsumedRecord| -> Result<(), HandlerError> {
            if record.offset() == 0 {
                Err(HandlerError::invalid_argument("bad"))
            } else {
                Ok(())
            }
        },
        dlt_router(),
    ));
    let stats = pipeline.stats();

    let handle = ConsumerWorker::spawn(
        WorkerConfig::default().with_poll_interval(Duration::from_millis(20)),
        h.broker.subscribe(&[SOURCE.to_string()], GROUP).unwrap(),
        pipeline,
        ShutdownSignal::new(),
    )
    .unwrap();

    assert!(wait_until(Duration::from_secs(5), || {
        stats.snapshot().records_succeeded == 2
    }));
    handle.shutdown().unwrap();

    assert_eq!(stats.snapshot().dead_lettered, 1);
    assert_eq!(h.committed(0), Some(3));
}
