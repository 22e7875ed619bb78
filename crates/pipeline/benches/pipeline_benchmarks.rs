use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::sync::Arc;

use chrono::NaiveDate;
use courier_broker::{Broker, InMemoryBroker, Publisher, Subscription};
use courier_core::{BrokerRecord, ConsumedRecord, Message, OutboundRecord};
use courier_pipeline::{
    Classification, ConsumptionPipeline, DeadLetterRouter, EventSink, ExceptionClassifier,
    HandlerError, PipelineEvent, RecordingSleeper, RetryPolicy, ShutdownSignal,
};

const SOURCE: &str = "messages";

/// Drops every event (keeps logging out of the measurement).
struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

fn seed(broker: &InMemoryBroker, count: usize) {
    let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    for i in 0..count {
        let message = Message::new(format!("m{i}"), "hello", date).unwrap();
        broker
            .publish(OutboundRecord::for_message(SOURCE, &message).unwrap())
            .unwrap();
    }
}

fn bench_happy_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_happy_path");

    for count in [100usize, 1_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_with_setup(
                || {
                    let broker = InMemoryBroker::with_default_partitions(3);
                    seed(&broker, count);
                    let subscription = broker.subscribe(&[SOURCE.to_string()], "bench").unwrap();
                    let records: Vec<BrokerRecord> = (0..count)
                        .filter_map(|_| subscription.poll(std::time::Duration::ZERO).unwrap())
                        .collect();
                    let pipeline = ConsumptionPipeline::new(
                        broker.clone(),
                        |_record: &ConsumedRecord| -> Result<(), HandlerError> { Ok(()) },
                        DeadLetterRouter::new("messages.DLT"),
                    )
                    .with_event_sink(Arc::new(NullSink));
                    (pipeline, subscription, records)
                },
                |(pipeline, subscription, records)| {
                    let shutdown = ShutdownSignal::new();
                    for record in records {
                        black_box(pipeline.process(record, &subscription, &shutdown).unwrap());
                    }
                },
            );
        });
    }

    group.finish();
}

fn bench_failure_path(c: &mut Criterion) {
    let broker = InMemoryBroker::with_default_partitions(3);
    seed(&broker, 1);
    let subscription = broker.subscribe(&[SOURCE.to_string()], "bench").unwrap();
    let record = subscription
        .poll(std::time::Duration::ZERO)
        .unwrap()
        .unwrap();

    let pipeline = ConsumptionPipeline::new(
        broker.clone(),
        |_record: &ConsumedRecord| -> Result<(), HandlerError> {
            Err(HandlerError::missing_value("absent"))
        },
        DeadLetterRouter::new("messages.DLT"),
    )
    .with_policy(RetryPolicy::default())
    .with_sleeper(Arc::new(RecordingSleeper::new()))
    .with_event_sink(Arc::new(NullSink));

    c.bench_function("retry_then_dead_letter", |b| {
        let shutdown = ShutdownSignal::new();
        b.iter(|| black_box(pipeline.process(record.clone(), &subscription, &shutdown).unwrap()))
    });

    let classifier = ExceptionClassifier::default();
    let error = HandlerError::other("listener failed")
        .caused_by(HandlerError::other("wrapped").caused_by(HandlerError::invalid_argument("bad")));
    c.bench_function("classify_wrapped_error", |b| {
        b.iter(|| {
            let c = classifier.classify(black_box(&error));
            assert_eq!(c, Classification::NonRetryable);
        })
    });
}

criterion_group!(benches, bench_happy_path, bench_failure_path);
criterion_main!(benches);
