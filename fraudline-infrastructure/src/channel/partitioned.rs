use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use fraudline_domain::ports::{Acknowledge, ChannelError, Delivery, EventChannel, Subscription};
use fraudline_domain::{PublishReceipt, Record, Topic};

pub const DEFAULT_PARTITIONS: u32 = 3;
pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    pub partitions: u32,
    /// Records retained per partition before publishing is refused.
    pub capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// FNV-1a over the key bytes; stable across processes and restarts.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in key.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash % partitions.max(1)
}

/// In-process partitioned log with consumer groups.
///
/// Each group keeps one lane per partition. A lane hands out at most one
/// record at a time, in offset order, skipping records whose key is held
/// back by an earlier record waiting out its retry delay.
pub struct PartitionedChannel {
    shared: Arc<Shared>,
}

struct Shared {
    settings: ChannelSettings,
    state: Mutex<ChannelState>,
    version: watch::Sender<u64>,
}

struct ChannelState {
    closed: bool,
    next_member: u64,
    topics: HashMap<Topic, TopicLog>,
}

struct TopicLog {
    partitions: Vec<PartitionLog>,
    groups: BTreeMap<String, GroupState>,
}

#[derive(Default)]
struct PartitionLog {
    /// Offset of `records[0]`.
    base: u64,
    records: VecDeque<StoredRecord>,
}

struct StoredRecord {
    key: String,
    payload: String,
    published_at: DateTime<Utc>,
}

struct GroupState {
    members: BTreeSet<String>,
    lanes: Vec<Lane>,
}

struct Lane {
    /// Every offset below this one is acknowledged.
    next_unacked: u64,
    acked: BTreeSet<u64>,
    retries: HashMap<u64, RetryState>,
    in_flight: Option<InFlight>,
}

#[derive(Default)]
struct RetryState {
    deliveries: u32,
    not_before: Option<Instant>,
}

struct InFlight {
    offset: u64,
    consumer: String,
}

enum Claim {
    Ready(Record),
    Wait(Option<Instant>),
}

impl PartitionLog {
    fn end(&self) -> u64 {
        self.base + self.records.len() as u64
    }

    fn get(&self, offset: u64) -> Option<&StoredRecord> {
        offset
            .checked_sub(self.base)
            .and_then(|index| self.records.get(index as usize))
    }

    fn trim_below(&mut self, offset: u64) {
        while self.base < offset && self.records.pop_front().is_some() {
            self.base += 1;
        }
    }
}

impl Lane {
    fn starting_at(offset: u64) -> Self {
        Self {
            next_unacked: offset,
            acked: BTreeSet::new(),
            retries: HashMap::new(),
            in_flight: None,
        }
    }

    fn pending(&self, end: u64) -> usize {
        let outstanding = end.saturating_sub(self.next_unacked) as usize;
        outstanding.saturating_sub(self.acked.len())
    }

    fn holds(&self, offset: u64, consumer: &str) -> bool {
        matches!(&self.in_flight, Some(held) if held.offset == offset && held.consumer == consumer)
    }

    fn candidate(&self, log: &PartitionLog, now: Instant) -> Result<u64, Option<Instant>> {
        let mut held_keys: HashSet<&str> = HashSet::new();
        let mut wake_at: Option<Instant> = None;
        for offset in self.next_unacked.max(log.base)..log.end() {
            if self.acked.contains(&offset) {
                continue;
            }
            let Some(stored) = log.get(offset) else {
                continue;
            };
            if held_keys.contains(stored.key.as_str()) {
                continue;
            }
            match self.retries.get(&offset).and_then(|retry| retry.not_before) {
                Some(not_before) if not_before > now => {
                    held_keys.insert(stored.key.as_str());
                    wake_at = Some(wake_at.map_or(not_before, |current| current.min(not_before)));
                }
                _ => return Ok(offset),
            }
        }
        Err(wake_at)
    }
}

impl GroupState {
    fn owner_of(&self, partition: usize) -> Option<&String> {
        if self.members.is_empty() {
            return None;
        }
        self.members.iter().nth(partition % self.members.len())
    }

    fn assigned(&self, consumer: &str) -> Vec<usize> {
        (0..self.lanes.len())
            .filter(|partition| self.owner_of(*partition).map(String::as_str) == Some(consumer))
            .collect()
    }
}

impl TopicLog {
    fn new(partitions: u32) -> Self {
        Self {
            partitions: (0..partitions).map(|_| PartitionLog::default()).collect(),
            groups: BTreeMap::new(),
        }
    }

    fn trim(&mut self, partition: usize) {
        let low_water = self
            .groups
            .values()
            .map(|group| group.lanes[partition].next_unacked)
            .min();
        if let Some(low_water) = low_water {
            self.partitions[partition].trim_below(low_water);
        }
    }

    fn claim(&mut self, topic: Topic, group: &str, consumer: &str, cursor: &mut usize, now: Instant) -> Claim {
        let Some(state) = self.groups.get_mut(group) else {
            return Claim::Wait(None);
        };
        let assigned = state.assigned(consumer);
        if assigned.is_empty() {
            return Claim::Wait(None);
        }

        let mut wake_at: Option<Instant> = None;
        let start = *cursor % assigned.len();
        for step in 0..assigned.len() {
            let partition = assigned[(start + step) % assigned.len()];
            let lane = &mut state.lanes[partition];
            if lane.in_flight.is_some() {
                continue;
            }
            let log = &self.partitions[partition];
            match lane.candidate(log, now) {
                Ok(offset) => {
                    let Some(stored) = log.get(offset) else {
                        continue;
                    };
                    let retry = lane.retries.entry(offset).or_default();
                    retry.deliveries += 1;
                    retry.not_before = None;
                    let attempt = retry.deliveries;
                    lane.in_flight = Some(InFlight {
                        offset,
                        consumer: consumer.to_string(),
                    });
                    *cursor = (start + step + 1) % assigned.len();
                    return Claim::Ready(Record {
                        topic,
                        partition: partition as u32,
                        offset,
                        key: stored.key.clone(),
                        payload: stored.payload.clone(),
                        published_at: stored.published_at,
                        attempt,
                    });
                }
                Err(Some(at)) => wake_at = Some(wake_at.map_or(at, |current| current.min(at))),
                Err(None) => {}
            }
        }
        Claim::Wait(wake_at)
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.version.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn settle(
        &self,
        topic: Topic,
        group: &str,
        partition: u32,
        offset: u64,
        consumer: &str,
        delay: Option<Duration>,
    ) -> Result<(), ChannelError> {
        let stale = ChannelError::Stale {
            topic,
            partition,
            offset,
        };
        {
            let mut state = self.lock();
            let Some(log) = state.topics.get_mut(&topic) else {
                return Err(stale);
            };
            let index = partition as usize;
            let Some(lane) = log
                .groups
                .get_mut(group)
                .and_then(|group| group.lanes.get_mut(index))
            else {
                return Err(stale);
            };
            if !lane.holds(offset, consumer) {
                return Err(stale);
            }
            lane.in_flight = None;
            match delay {
                None => {
                    lane.retries.remove(&offset);
                    lane.acked.insert(offset);
                    while lane.acked.remove(&lane.next_unacked) {
                        lane.next_unacked += 1;
                    }
                    log.trim(index);
                }
                Some(delay) => {
                    let retry = lane.retries.entry(offset).or_default();
                    retry.not_before = (!delay.is_zero()).then(|| Instant::now() + delay);
                }
            }
        }
        self.bump();
        Ok(())
    }

    fn leave(&self, topic: Topic, group: &str, consumer: &str) {
        {
            let mut state = self.lock();
            let Some(group_state) = state
                .topics
                .get_mut(&topic)
                .and_then(|log| log.groups.get_mut(group))
            else {
                return;
            };
            group_state.members.remove(consumer);
            for lane in &mut group_state.lanes {
                if matches!(&lane.in_flight, Some(held) if held.consumer == consumer) {
                    lane.in_flight = None;
                }
            }
            info!(%topic, group, consumer, members = group_state.members.len(), "consumer left group, rebalancing");
        }
        self.bump();
    }
}

impl PartitionedChannel {
    pub fn new(settings: ChannelSettings) -> Self {
        let settings = ChannelSettings {
            partitions: settings.partitions.max(1),
            capacity: settings.capacity.max(1),
        };
        let topics = Topic::ALL
            .iter()
            .map(|topic| (*topic, TopicLog::new(settings.partitions)))
            .collect();
        let (version, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                settings,
                state: Mutex::new(ChannelState {
                    closed: false,
                    next_member: 0,
                    topics,
                }),
                version,
            }),
        }
    }

    pub fn settings(&self) -> ChannelSettings {
        self.shared.settings
    }
}

impl Default for PartitionedChannel {
    fn default() -> Self {
        Self::new(ChannelSettings::default())
    }
}

#[async_trait]
impl EventChannel for PartitionedChannel {
    async fn publish(&self, topic: Topic, key: &str, payload: String) -> Result<PublishReceipt, ChannelError> {
        let partition = partition_for(key, self.shared.settings.partitions);
        let receipt = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(ChannelError::Closed);
            }
            let Some(log) = state.topics.get_mut(&topic) else {
                return Err(ChannelError::Closed);
            };
            let index = partition as usize;
            log.trim(index);
            let capacity = self.shared.settings.capacity;
            let partition_log = &mut log.partitions[index];
            if partition_log.records.len() >= capacity {
                return Err(ChannelError::Full {
                    topic,
                    partition,
                    capacity,
                });
            }
            let offset = partition_log.end();
            partition_log.records.push_back(StoredRecord {
                key: key.to_string(),
                payload,
                published_at: Utc::now(),
            });
            PublishReceipt {
                topic,
                partition,
                offset,
            }
        };
        self.shared.bump();
        debug!(%topic, key, partition, offset = receipt.offset, "record published");
        Ok(receipt)
    }

    async fn subscribe(&self, topic: Topic, group: &str) -> Result<Box<dyn Subscription>, ChannelError> {
        let group = group.trim();
        if group.is_empty() {
            return Err(ChannelError::InvalidGroup("group id must not be empty".to_string()));
        }
        let consumer_id = {
            let mut state = self.shared.lock();
            if state.closed {
                return Err(ChannelError::Closed);
            }
            state.next_member += 1;
            let consumer_id = format!("{}-{:06}", group, state.next_member);
            let Some(log) = state.topics.get_mut(&topic) else {
                return Err(ChannelError::Closed);
            };
            let bases: Vec<u64> = log.partitions.iter().map(|partition| partition.base).collect();
            let group_state = log.groups.entry(group.to_string()).or_insert_with(|| GroupState {
                members: BTreeSet::new(),
                lanes: bases.into_iter().map(Lane::starting_at).collect(),
            });
            group_state.members.insert(consumer_id.clone());
            info!(
                %topic,
                group,
                consumer = %consumer_id,
                members = group_state.members.len(),
                "consumer joined group, rebalancing"
            );
            consumer_id
        };
        self.shared.bump();
        Ok(Box::new(PartitionedSubscription {
            shared: Arc::clone(&self.shared),
            topic,
            group: group.to_string(),
            consumer_id,
            version: self.shared.version.subscribe(),
            cursor: 0,
        }))
    }

    async fn backlog(&self, topic: Topic) -> usize {
        let state = self.shared.lock();
        let Some(log) = state.topics.get(&topic) else {
            return 0;
        };
        if log.groups.is_empty() {
            return log.partitions.iter().map(|partition| partition.records.len()).sum();
        }
        log.groups
            .values()
            .map(|group| {
                group
                    .lanes
                    .iter()
                    .zip(&log.partitions)
                    .map(|(lane, partition)| lane.pending(partition.end()))
                    .sum::<usize>()
            })
            .sum()
    }

    fn partition_count(&self) -> u32 {
        self.shared.settings.partitions
    }

    async fn close(&self) {
        {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.shared.bump();
        info!("event channel closed");
    }
}

struct PartitionedSubscription {
    shared: Arc<Shared>,
    topic: Topic,
    group: String,
    consumer_id: String,
    version: watch::Receiver<u64>,
    cursor: usize,
}

#[async_trait]
impl Subscription for PartitionedSubscription {
    fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    async fn next(&mut self) -> Option<Delivery> {
        loop {
            self.version.borrow_and_update();
            let wake_at = {
                let mut state = self.shared.lock();
                if state.closed {
                    return None;
                }
                let log = state.topics.get_mut(&self.topic)?;
                match log.claim(
                    self.topic,
                    &self.group,
                    &self.consumer_id,
                    &mut self.cursor,
                    Instant::now(),
                ) {
                    Claim::Ready(record) => {
                        let handle = LaneHandle {
                            shared: Arc::clone(&self.shared),
                            topic: self.topic,
                            group: self.group.clone(),
                            partition: record.partition,
                            offset: record.offset,
                            consumer: self.consumer_id.clone(),
                        };
                        return Some(Delivery::new(record, Box::new(handle)));
                    }
                    Claim::Wait(wake_at) => wake_at,
                }
            };

            match wake_at {
                Some(deadline) => {
                    tokio::select! {
                        changed = self.version.changed() => {
                            if changed.is_err() {
                                return None;
                            }
                        }
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => {
                    if self.version.changed().await.is_err() {
                        return None;
                    }
                }
            }
        }
    }

    fn assigned_partitions(&self) -> Vec<u32> {
        let state = self.shared.lock();
        state
            .topics
            .get(&self.topic)
            .and_then(|log| log.groups.get(&self.group))
            .map(|group| {
                group
                    .assigned(&self.consumer_id)
                    .into_iter()
                    .map(|partition| partition as u32)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Drop for PartitionedSubscription {
    fn drop(&mut self) {
        self.shared.leave(self.topic, &self.group, &self.consumer_id);
    }
}

struct LaneHandle {
    shared: Arc<Shared>,
    topic: Topic,
    group: String,
    partition: u32,
    offset: u64,
    consumer: String,
}

impl Acknowledge for LaneHandle {
    fn ack(&self) -> Result<(), ChannelError> {
        self.shared
            .settle(self.topic, &self.group, self.partition, self.offset, &self.consumer, None)
    }

    fn nack(&self, delay: Duration) -> Result<(), ChannelError> {
        self.shared.settle(
            self.topic,
            &self.group,
            self.partition,
            self.offset,
            &self.consumer,
            Some(delay),
        )
    }
}
