// In-memory doubles for the application ports

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fraudline_domain::ports::{
    Acknowledge, AlertRepository, AlertSink, ChannelError, DeadLetterSink, Delivery, EntityStore,
    EventChannel, FlaggedTransaction, StoredAlert, Subscription,
};
use fraudline_domain::{
    AlertDeliveryRecord, DeadLetterEntry, EventId, FraudAlertEvent, Owner, PipelineMode,
    PublishReceipt, Record, ScoreResult, ScoringEngine, ScoringPolicy, TemporalBasis, Topic,
    Transaction, TransactionId, UserId,
};
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use crate::consumer::RetryPolicy;
use crate::{AppState, Metrics, PipelineSettings};

pub(crate) struct Fixture {
    pub state: AppState,
    pub store: Arc<FakeStore>,
    pub channel: Arc<RecordingChannel>,
    pub dead_letters: Arc<RecordingDeadLetters>,
    pub sink: Arc<RecordingSink>,
}

pub(crate) fn fixture() -> Fixture {
    fixture_with_mode(PipelineMode::Sync)
}

pub(crate) fn fixture_with_mode(mode: PipelineMode) -> Fixture {
    let store = Arc::new(FakeStore::default());
    let channel = Arc::new(RecordingChannel::default());
    let dead_letters = Arc::new(RecordingDeadLetters::default());
    let sink = Arc::new(RecordingSink::default());
    let policy = ScoringPolicy {
        temporal_basis: TemporalBasis::TransactionTime,
        utc_offset_minutes: Some(0),
        ..ScoringPolicy::default()
    };
    let state = AppState {
        mode: Arc::new(RwLock::new(mode)),
        engine: Arc::new(ScoringEngine::new(policy)),
        store: store.clone(),
        alerts: store.clone(),
        channel: channel.clone(),
        alert_sink: sink.clone(),
        dead_letters: dead_letters.clone(),
        metrics: Arc::new(Metrics::default()),
        settings: PipelineSettings {
            store_timeout: Duration::from_millis(50),
            publish_max_attempts: 3,
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
            },
        },
    };
    Fixture {
        state,
        store,
        channel,
        dead_letters,
        sink,
    }
}

pub(crate) fn sample_owner(id: u64) -> Owner {
    Owner {
        id: UserId(id),
        username: format!("user-{}", id),
    }
}

pub(crate) fn at_minute(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
}

pub(crate) fn sample_transaction(id: u64, user: u64, amount: Decimal, minute: u32) -> Transaction {
    Transaction {
        id: TransactionId(id),
        user_id: UserId(user),
        amount,
        currency: "USD".to_string(),
        merchant_name: Some("Corner Shop".to_string()),
        merchant_category: None,
        location: None,
        ip_address: None,
        device_id: None,
        created_at: at_minute(minute),
    }
}

#[derive(Default)]
pub(crate) struct FakeStore {
    transactions: Mutex<Vec<(Transaction, Owner)>>,
    scores: Mutex<Vec<ScoreResult>>,
    alerts: Mutex<Vec<StoredAlert>>,
    fail_save_alert: AtomicUsize,
}

impl FakeStore {
    /// Fails the next `count` calls to `save_alert`.
    pub fn fail_next_save_alert(&self, count: usize) {
        self.fail_save_alert.store(count, Ordering::SeqCst);
    }

    pub fn score_count(&self) -> usize {
        self.scores.lock().unwrap().len()
    }

    fn latest_for(&self, id: TransactionId) -> Option<ScoreResult> {
        self.scores
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|score| score.transaction_id == id)
            .cloned()
    }

    fn prior(&self, user_id: UserId, prior_to: &Transaction) -> Vec<Transaction> {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .map(|(tx, _)| tx)
            .filter(|tx| tx.user_id == user_id && tx.is_prior_to(prior_to))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EntityStore for FakeStore {
    async fn save_transaction(&self, transaction: &Transaction, owner: &Owner) -> anyhow::Result<()> {
        let mut transactions = self.transactions.lock().unwrap();
        transactions.retain(|(tx, _)| tx.id != transaction.id);
        transactions.push((transaction.clone(), owner.clone()));
        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> anyhow::Result<Option<Transaction>> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .find(|(tx, _)| tx.id == id)
            .map(|(tx, _)| tx.clone()))
    }

    async fn get_owner(&self, transaction: &Transaction) -> anyhow::Result<Option<Owner>> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .find(|(tx, _)| tx.id == transaction.id)
            .map(|(_, owner)| owner.clone()))
    }

    async fn count_transactions_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        prior_to: &Transaction,
    ) -> anyhow::Result<u64> {
        Ok(self
            .prior(user_id, prior_to)
            .iter()
            .filter(|tx| tx.created_at >= since)
            .count() as u64)
    }

    async fn sum_amount_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        prior_to: &Transaction,
    ) -> anyhow::Result<Decimal> {
        Ok(self
            .prior(user_id, prior_to)
            .iter()
            .filter(|tx| tx.created_at >= since)
            .map(|tx| tx.amount)
            .sum())
    }

    async fn count_prior_flagged(&self, user_id: UserId, prior_to: &Transaction) -> anyhow::Result<u64> {
        Ok(self
            .prior(user_id, prior_to)
            .iter()
            .filter(|tx| self.latest_for(tx.id).map(|s| s.is_fraudulent).unwrap_or(false))
            .count() as u64)
    }

    async fn save_score_result(&self, result: &ScoreResult) -> anyhow::Result<ScoreResult> {
        let mut scores = self.scores.lock().unwrap();
        if let Some(existing) = scores.iter().find(|s| s.evaluation_id == result.evaluation_id) {
            return Ok(existing.clone());
        }
        scores.push(result.clone());
        Ok(result.clone())
    }

    async fn latest_score(&self, transaction_id: TransactionId) -> anyhow::Result<Option<ScoreResult>> {
        Ok(self.latest_for(transaction_id))
    }

    async fn list_flagged(&self, limit: usize) -> anyhow::Result<Vec<FlaggedTransaction>> {
        let transactions: Vec<Transaction> = self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .map(|(tx, _)| tx.clone())
            .collect();
        Ok(transactions
            .into_iter()
            .filter_map(|transaction| {
                let score = self.latest_for(transaction.id)?;
                score.is_fraudulent.then_some(FlaggedTransaction { transaction, score })
            })
            .take(limit)
            .collect())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AlertRepository for FakeStore {
    async fn save_alert(&self, alert: &FraudAlertEvent) -> anyhow::Result<bool> {
        let pending = self.fail_save_alert.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_save_alert.store(pending - 1, Ordering::SeqCst);
            anyhow::bail!("connection reset");
        }
        let mut alerts = self.alerts.lock().unwrap();
        if alerts.iter().any(|a| a.alert.source_event_id == alert.source_event_id) {
            return Ok(false);
        }
        alerts.push(StoredAlert {
            alert: alert.clone(),
            published: false,
        });
        Ok(true)
    }

    async fn mark_alert_published(&self, source_event_id: &EventId) -> anyhow::Result<()> {
        let mut alerts = self.alerts.lock().unwrap();
        match alerts.iter_mut().find(|a| &a.alert.source_event_id == source_event_id) {
            Some(stored) => {
                stored.published = true;
                Ok(())
            }
            None => anyhow::bail!("no alert for {}", source_event_id),
        }
    }

    async fn find_alert_by_source(&self, source_event_id: &EventId) -> anyhow::Result<Option<StoredAlert>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .find(|a| &a.alert.source_event_id == source_event_id)
            .cloned())
    }

    async fn recent_alerts(&self, limit: usize) -> anyhow::Result<Vec<FraudAlertEvent>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit)
            .map(|stored| stored.alert.clone())
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Settled {
    Acked,
    Nacked(Duration),
}

type SettledLog = Arc<Mutex<Vec<(u64, Settled)>>>;

/// Records publishes and replays queued records to the first subscriber.
#[derive(Default)]
pub(crate) struct RecordingChannel {
    published: Mutex<Vec<(Topic, String, String)>>,
    attempts: AtomicUsize,
    reject: AtomicBool,
    hold_open: AtomicBool,
    queued: Mutex<HashMap<Topic, VecDeque<Record>>>,
    settled: SettledLog,
}

impl RecordingChannel {
    pub fn published(&self, topic: Topic) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| *t == topic)
            .map(|(_, key, payload)| (key.clone(), payload.clone()))
            .collect()
    }

    pub fn publish_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn reject_publishes(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Keeps subscriptions pending instead of ending once the queue is empty.
    pub fn hold_open(&self, hold: bool) {
        self.hold_open.store(hold, Ordering::SeqCst);
    }

    pub fn queue(&self, topic: Topic, key: &str, attempt: u32) {
        self.queue_payload(topic, key, "{}", attempt);
    }

    pub fn queue_payload(&self, topic: Topic, key: &str, payload: &str, attempt: u32) {
        let mut queued = self.queued.lock().unwrap();
        let lane = queued.entry(topic).or_default();
        let offset = lane.len() as u64;
        lane.push_back(Record {
            topic,
            partition: 0,
            offset,
            key: key.to_string(),
            payload: payload.to_string(),
            published_at: Utc::now(),
            attempt,
        });
    }

    pub fn settled(&self) -> Vec<(u64, Settled)> {
        self.settled.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventChannel for RecordingChannel {
    async fn publish(&self, topic: Topic, key: &str, payload: String) -> Result<PublishReceipt, ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(ChannelError::Full {
                topic,
                partition: 0,
                capacity: 0,
            });
        }
        let mut published = self.published.lock().unwrap();
        let offset = published.iter().filter(|(t, _, _)| *t == topic).count() as u64;
        published.push((topic, key.to_string(), payload));
        Ok(PublishReceipt {
            topic,
            partition: 0,
            offset,
        })
    }

    async fn subscribe(&self, topic: Topic, _group: &str) -> Result<Box<dyn Subscription>, ChannelError> {
        let records = self.queued.lock().unwrap().remove(&topic).unwrap_or_default();
        Ok(Box::new(ScriptedSubscription {
            records,
            hold_open: self.hold_open.load(Ordering::SeqCst),
            settled: Arc::clone(&self.settled),
        }))
    }

    async fn backlog(&self, _topic: Topic) -> usize {
        0
    }

    fn partition_count(&self) -> u32 {
        1
    }

    async fn close(&self) {}
}

struct ScriptedSubscription {
    records: VecDeque<Record>,
    hold_open: bool,
    settled: SettledLog,
}

#[async_trait]
impl Subscription for ScriptedSubscription {
    fn consumer_id(&self) -> &str {
        "scripted"
    }

    async fn next(&mut self) -> Option<Delivery> {
        match self.records.pop_front() {
            Some(record) => {
                let offset = record.offset;
                Some(Delivery::new(
                    record,
                    Box::new(ScriptedAck {
                        offset,
                        settled: Arc::clone(&self.settled),
                    }),
                ))
            }
            None if self.hold_open => std::future::pending().await,
            None => None,
        }
    }

    fn assigned_partitions(&self) -> Vec<u32> {
        vec![0]
    }
}

struct ScriptedAck {
    offset: u64,
    settled: SettledLog,
}

impl Acknowledge for ScriptedAck {
    fn ack(&self) -> Result<(), ChannelError> {
        self.settled.lock().unwrap().push((self.offset, Settled::Acked));
        Ok(())
    }

    fn nack(&self, delay: Duration) -> Result<(), ChannelError> {
        self.settled.lock().unwrap().push((self.offset, Settled::Nacked(delay)));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingDeadLetters {
    entries: Mutex<Vec<DeadLetterEntry>>,
    fail: AtomicBool,
}

impl RecordingDeadLetters {
    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn fail_routing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeadLetterSink for RecordingDeadLetters {
    async fn route(&self, entry: DeadLetterEntry) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("dead-letter store offline");
        }
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    async fn list(&self, topic: Option<Topic>, limit: usize) -> Vec<DeadLetterEntry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| topic.map_or(true, |t| entry.topic == t))
            .take(limit)
            .cloned()
            .collect()
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    delivered: Mutex<Vec<FraudAlertEvent>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<FraudAlertEvent> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn fail_delivery(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn deliver(&self, alert: &FraudAlertEvent) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("webhook unreachable");
        }
        self.delivered.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn recent_deliveries(&self, _limit: usize) -> Vec<AlertDeliveryRecord> {
        Vec::new()
    }
}
