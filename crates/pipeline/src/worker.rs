//! Consumer worker: one dispatcher thread, one lane thread per partition.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use courier_broker::{BrokerError, Publisher, Subscription};
use courier_core::{BrokerRecord, TopicPartition};

use crate::error::PipelineError;
use crate::handler::MessageHandler;
use crate::pipeline::{ConsumptionPipeline, ProcessOutcome};
use crate::shutdown::ShutdownSignal;

/// Consumer worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Thread name prefix, also used in logs.
    pub name: String,
    /// Upper bound on a single subscription poll.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "courier-consumer".to_string(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

type FatalSlot = Arc<Mutex<Option<PipelineError>>>;

fn record_fatal(slot: &FatalSlot, err: PipelineError) {
    let mut fatal = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if fatal.is_none() {
        *fatal = Some(err);
    }
}

/// Handle to control and join a running consumer worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: ShutdownSignal,
    join: Option<thread::JoinHandle<()>>,
    fatal: FatalSlot,
}

impl WorkerHandle {
    /// The signal the worker stops on. Fatal errors request it too.
    pub fn signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// First fatal error raised by any lane, if any.
    pub fn fatal_error(&self) -> Option<PipelineError> {
        self.fatal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Request graceful shutdown, wait for every lane to stop, and report the
    /// fatal error that stopped the worker (if one did).
    pub fn shutdown(mut self) -> Result<(), PipelineError> {
        self.shutdown.request();
        self.join_inner()
    }

    /// Wait for the worker to stop on its own (shutdown requested elsewhere or
    /// fatal error).
    pub fn join(mut self) -> Result<(), PipelineError> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<(), PipelineError> {
        if let Some(j) = self.join.take() {
            if j.join().is_err() {
                record_fatal(
                    &self.fatal,
                    PipelineError::Spawn("consumer worker thread panicked".to_string()),
                );
            }
        }

        match self.fatal_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Background consumer.
///
/// - Polls the subscription from a dispatcher thread
/// - Hands each record to the lane of its topic-partition, so partitions run
///   in parallel and each partition strictly in offset order
/// - Pauses the partition while its lane holds a record; the lane resumes it
///   once the record settled. A partition in backoff is not polled, and at most
///   one record per partition is in flight
/// - A fatal pipeline error stops every lane and requests shutdown
#[derive(Debug)]
pub struct ConsumerWorker;

impl ConsumerWorker {
    pub fn spawn<S, P, H>(
        config: WorkerConfig,
        subscription: S,
        pipeline: Arc<ConsumptionPipeline<P, H>>,
        shutdown: ShutdownSignal,
    ) -> Result<WorkerHandle, PipelineError>
    where
        S: Subscription + 'static,
        P: Publisher + 'static,
        H: MessageHandler + 'static,
    {
        let fatal: FatalSlot = Arc::new(Mutex::new(None));
        let dispatcher = Dispatcher {
            config: config.clone(),
            subscription: Arc::new(subscription),
            pipeline,
            shutdown: shutdown.clone(),
            fatal: fatal.clone(),
        };

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || dispatcher.run())
            .map_err(|e| PipelineError::Spawn(e.to_string()))?;

        info!(worker = config.name.as_str(), "consumer worker started");

        Ok(WorkerHandle {
            shutdown,
            join: Some(join),
            fatal,
        })
    }
}

struct Lane {
    records: mpsc::SyncSender<BrokerRecord>,
    join: thread::JoinHandle<()>,
}

struct Dispatcher<S, P, H> {
    config: WorkerConfig,
    subscription: Arc<S>,
    pipeline: Arc<ConsumptionPipeline<P, H>>,
    shutdown: ShutdownSignal,
    fatal: FatalSlot,
}

impl<S, P, H> Dispatcher<S, P, H>
where
    S: Subscription + 'static,
    P: Publisher + 'static,
    H: MessageHandler + 'static,
{
    fn run(self) {
        let name = self.config.name.as_str();
        let mut lanes: HashMap<TopicPartition, Lane> = HashMap::new();

        while !self.shutdown.is_requested() {
            match self.subscription.poll(self.config.poll_interval) {
                Ok(Some(record)) => {
                    let tp = record.topic_partition();
                    let lane = match lanes.entry(tp.clone()) {
                        Entry::Occupied(e) => e.into_mut(),
                        Entry::Vacant(e) => match self.spawn_lane(e.key()) {
                            Ok(lane) => e.insert(lane),
                            Err(err) => {
                                self.stop_with(err);
                                break;
                            }
                        },
                    };

                    if let Err(err) = self.subscription.pause(&tp) {
                        self.stop_with(PipelineError::Subscription(err));
                        break;
                    }
                    if lane.records.send(record).is_err() {
                        // Lane stopped (fatal error or shutdown).
                        break;
                    }
                }
                Ok(None) => continue,
                Err(BrokerError::Closed) => {
                    info!(worker = name, "subscription closed");
                    break;
                }
                Err(err) if err.is_transient() => {
                    warn!(worker = name, error = %err, "poll failed, backing off");
                    self.shutdown.wait_timeout(self.config.poll_interval);
                }
                Err(err) => {
                    self.stop_with(PipelineError::Subscription(err));
                    break;
                }
            }
        }

        for (tp, lane) in lanes {
            drop(lane.records);
            if lane.join.join().is_err() {
                self.stop_with(PipelineError::Spawn(format!("lane {tp} panicked")));
            }
        }

        info!(worker = name, "consumer worker stopped");
    }

    fn spawn_lane(&self, tp: &TopicPartition) -> Result<Lane, PipelineError> {
        let (tx, rx) = mpsc::sync_channel::<BrokerRecord>(1);
        let subscription = self.subscription.clone();
        let pipeline = self.pipeline.clone();
        let shutdown = self.shutdown.clone();
        let fatal = self.fatal.clone();
        let lane_name = format!("{}-{}", self.config.name, tp);

        debug!(lane = lane_name.as_str(), "starting partition lane");

        let join = thread::Builder::new()
            .name(lane_name.clone())
            .spawn(move || {
                for record in rx {
                    let tp = record.topic_partition();
                    match pipeline.process(record, &*subscription, &shutdown) {
                        Ok(ProcessOutcome::Aborted { .. }) => break,
                        Ok(_) => {
                            if let Err(err) = subscription.resume(&tp) {
                                error!(lane = lane_name.as_str(), error = %err, "failed to resume partition");
                                record_fatal(&fatal, PipelineError::Subscription(err));
                                shutdown.request();
                                break;
                            }
                        }
                        Err(err) => {
                            error!(lane = lane_name.as_str(), error = %err, "partition lane stopped");
                            record_fatal(&fatal, err);
                            shutdown.request();
                            break;
                        }
                    }
                }
            })
            .map_err(|e| PipelineError::Spawn(e.to_string()))?;

        Ok(Lane { records: tx, join })
    }

    fn stop_with(&self, err: PipelineError) {
        error!(worker = self.config.name.as_str(), error = %err, "consumer worker failed");
        record_fatal(&self.fatal, err);
        self.shutdown.request();
    }
}
