//! In-memory broker for tests/dev.

use std::collections::{HashMap, HashSet};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::debug;

use courier_core::{BrokerRecord, Delivery, OutboundRecord, TopicPartition};

use crate::broker::{Broker, Publisher, Subscription};
use crate::error::BrokerError;

const DEFAULT_PARTITIONS: i32 = 3;

#[derive(Debug)]
struct Shared {
    state: Mutex<BrokerState>,
    published: Condvar,
}

#[derive(Debug)]
struct BrokerState {
    default_partitions: i32,
    /// topic -> partition logs (index = offset).
    topics: HashMap<String, Vec<Vec<BrokerRecord>>>,
    /// (group, partition) -> next offset to read.
    committed: HashMap<(String, TopicPartition), i64>,
    publish_faults: HashMap<String, BrokerError>,
    round_robin: u64,
    closed: bool,
}

impl BrokerState {
    fn partitions_mut(&mut self, topic: &str) -> &mut Vec<Vec<BrokerRecord>> {
        let count = self.default_partitions as usize;
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); count])
    }
}

/// In-memory partitioned log with consumer-group offsets.
///
/// - No IO; subscribers block on a condition variable
/// - Topics are created on first publish (or explicitly with `create_topic`)
/// - Each subscription starts at its group's committed offsets
/// - No group rebalancing: two live subscriptions in one group both see every record
///
/// Cloning is cheap and clones share the same log.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_default_partitions(DEFAULT_PARTITIONS)
    }

    /// Broker whose auto-created topics get `partitions` partitions.
    pub fn with_default_partitions(partitions: i32) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BrokerState {
                    default_partitions: partitions.max(1),
                    topics: HashMap::new(),
                    committed: HashMap::new(),
                    publish_faults: HashMap::new(),
                    round_robin: 0,
                    closed: false,
                }),
                published: Condvar::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>, BrokerError> {
        self.shared.state.lock().map_err(|_| BrokerError::Poisoned)
    }

    /// Create a topic with an explicit partition count (no-op if it exists).
    pub fn create_topic(&self, topic: &str, partitions: i32) -> Result<(), BrokerError> {
        let mut state = self.lock()?;
        state
            .topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); partitions.max(1) as usize]);
        Ok(())
    }

    /// Make every publish to `topic` fail with `error` until cleared.
    pub fn fail_publishes_to(&self, topic: &str, error: BrokerError) -> Result<(), BrokerError> {
        self.lock()?.publish_faults.insert(topic.to_string(), error);
        Ok(())
    }

    pub fn clear_publish_failures(&self) -> Result<(), BrokerError> {
        self.lock()?.publish_faults.clear();
        Ok(())
    }

    /// All records of a topic, partition by partition, in offset order.
    pub fn records(&self, topic: &str) -> Result<Vec<BrokerRecord>, BrokerError> {
        let state = self.lock()?;
        Ok(state
            .topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default())
    }

    /// Next offset to read for `group_id` on `tp`, if the group ever committed.
    pub fn committed(&self, group_id: &str, tp: &TopicPartition) -> Result<Option<i64>, BrokerError> {
        let state = self.lock()?;
        Ok(state
            .committed
            .get(&(group_id.to_string(), tp.clone()))
            .copied())
    }

    /// Close the broker: every subscription poll returns `Closed`.
    pub fn close(&self) -> Result<(), BrokerError> {
        self.lock()?.closed = true;
        self.shared.published.notify_all();
        Ok(())
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

fn partition_for_key(key: &str, count: i32) -> i32 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % count as u64) as i32
}

impl Publisher for InMemoryBroker {
    fn publish(&self, record: OutboundRecord) -> Result<Delivery, BrokerError> {
        let mut state = self.lock()?;

        if let Some(err) = state.publish_faults.get(&record.topic) {
            return Err(err.clone());
        }

        let rr = state.round_robin;
        state.round_robin = rr.wrapping_add(1);

        let partitions = state.partitions_mut(&record.topic);
        let count = partitions.len() as i32;

        let partition = match record.partition {
            Some(p) if (0..count).contains(&p) => p,
            Some(p) => {
                return Err(BrokerError::UnknownTopicPartition(format!(
                    "{}-{}",
                    record.topic, p
                )));
            }
            None => match record.key.as_deref() {
                Some(key) => partition_for_key(key, count),
                None => (rr % count as u64) as i32,
            },
        };

        let log = &mut partitions[partition as usize];
        let offset = log.len() as i64;
        log.push(BrokerRecord {
            topic: record.topic.clone(),
            partition,
            offset,
            key: record.key,
            payload: record.payload,
            headers: record.headers,
            timestamp: Some(Utc::now()),
        });

        drop(state);
        self.shared.published.notify_all();

        Ok(Delivery {
            topic: record.topic,
            partition,
            offset,
        })
    }
}

impl Broker for InMemoryBroker {
    type Subscription = InMemorySubscription;

    fn subscribe(
        &self,
        topics: &[String],
        group_id: &str,
    ) -> Result<Self::Subscription, BrokerError> {
        if topics.is_empty() {
            return Err(BrokerError::client("at least one topic is required"));
        }

        debug!(group_id, topics = ?topics, "in-memory subscription created");

        Ok(InMemorySubscription {
            shared: self.shared.clone(),
            group_id: group_id.to_string(),
            topics: topics.to_vec(),
            cursor: Mutex::new(Cursor::default()),
        })
    }
}

#[derive(Debug, Default)]
struct Cursor {
    positions: HashMap<TopicPartition, i64>,
    paused: HashSet<TopicPartition>,
    /// Round-robin start index so one busy partition cannot starve the others.
    rotation: usize,
}

/// Subscription handed out by [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemorySubscription {
    shared: Arc<Shared>,
    group_id: String,
    topics: Vec<String>,
    cursor: Mutex<Cursor>,
}

impl InMemorySubscription {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    fn next_record(&self, state: &BrokerState) -> Result<Option<BrokerRecord>, BrokerError> {
        let mut cursor = self.cursor.lock().map_err(|_| BrokerError::Poisoned)?;

        let assigned: Vec<TopicPartition> = self
            .topics
            .iter()
            .filter_map(|t| state.topics.get(t).map(|partitions| (t, partitions.len())))
            .flat_map(|(t, n)| (0..n as i32).map(move |p| TopicPartition::new(t.clone(), p)))
            .collect();

        if assigned.is_empty() {
            return Ok(None);
        }

        let start = cursor.rotation % assigned.len();
        for i in 0..assigned.len() {
            let idx = (start + i) % assigned.len();
            let tp = &assigned[idx];
            if cursor.paused.contains(tp) {
                continue;
            }

            let position = match cursor.positions.get(tp) {
                Some(p) => *p,
                None => state
                    .committed
                    .get(&(self.group_id.clone(), tp.clone()))
                    .copied()
                    .unwrap_or(0),
            };

            let record = usize::try_from(position)
                .ok()
                .and_then(|pos| state.topics.get(tp.topic())?.get(tp.partition() as usize)?.get(pos));

            if let Some(record) = record {
                let record = record.clone();
                cursor.positions.insert(tp.clone(), position + 1);
                cursor.rotation = (idx + 1) % assigned.len();
                return Ok(Some(record));
            }
        }

        Ok(None)
    }
}

impl Subscription for InMemorySubscription {
    fn poll(&self, timeout: Duration) -> Result<Option<BrokerRecord>, BrokerError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().map_err(|_| BrokerError::Poisoned)?;

        loop {
            if state.closed {
                return Err(BrokerError::Closed);
            }

            if let Some(record) = self.next_record(&state)? {
                return Ok(Some(record));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let (guard, _) = self
                .shared
                .published
                .wait_timeout(state, deadline - now)
                .map_err(|_| BrokerError::Poisoned)?;
            state = guard;
        }
    }

    fn commit(&self, tp: &TopicPartition, offset: i64) -> Result<(), BrokerError> {
        let mut state = self.shared.state.lock().map_err(|_| BrokerError::Poisoned)?;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        state
            .committed
            .insert((self.group_id.clone(), tp.clone()), offset + 1);
        Ok(())
    }

    fn seek(&self, tp: &TopicPartition, offset: i64) -> Result<(), BrokerError> {
        let state = self.shared.state.lock().map_err(|_| BrokerError::Poisoned)?;
        let mut cursor = self.cursor.lock().map_err(|_| BrokerError::Poisoned)?;
        cursor.positions.insert(tp.clone(), offset.max(0));
        drop(cursor);
        drop(state);
        self.shared.published.notify_all();
        Ok(())
    }

    fn pause(&self, tp: &TopicPartition) -> Result<(), BrokerError> {
        let _state = self.shared.state.lock().map_err(|_| BrokerError::Poisoned)?;
        let mut cursor = self.cursor.lock().map_err(|_| BrokerError::Poisoned)?;
        cursor.paused.insert(tp.clone());
        Ok(())
    }

    fn resume(&self, tp: &TopicPartition) -> Result<(), BrokerError> {
        let state = self.shared.state.lock().map_err(|_| BrokerError::Poisoned)?;
        let mut cursor = self.cursor.lock().map_err(|_| BrokerError::Poisoned)?;
        let was_paused = cursor.paused.remove(tp);
        drop(cursor);
        drop(state);
        if was_paused {
            // Wake a poll blocked while this partition was the only one with records.
            self.shared.published.notify_all();
        }
        Ok(())
    }
}
