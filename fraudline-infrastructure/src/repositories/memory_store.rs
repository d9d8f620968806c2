use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use fraudline_domain::ports::{AlertRepository, EntityStore, FlaggedTransaction, StoredAlert};
use fraudline_domain::{
    EventId, FraudAlertEvent, Owner, ScoreResult, Transaction, TransactionId, UserId,
};

type HistoryKey = (DateTime<Utc>, TransactionId);

/// Entity store kept in process memory.
///
/// Transactions are write-once; score results are appended and never
/// replaced, so the latest result of a transaction is the last one saved.
#[derive(Default)]
pub struct MemoryEntityStore {
    entities: RwLock<Entities>,
    alerts: RwLock<AlertLog>,
}

#[derive(Default)]
struct Entities {
    transactions: HashMap<TransactionId, (Transaction, Owner)>,
    /// Per user, amounts ordered by `(created_at, id)`.
    history: HashMap<UserId, BTreeMap<HistoryKey, Decimal>>,
    scores: HashMap<EventId, ScoreResult>,
    evaluations: HashMap<TransactionId, Vec<EventId>>,
}

#[derive(Default)]
struct AlertLog {
    alerts: Vec<StoredAlert>,
    by_source: HashMap<EventId, usize>,
}

impl Entities {
    fn latest(&self, transaction_id: TransactionId) -> Option<&ScoreResult> {
        self.evaluations
            .get(&transaction_id)
            .and_then(|ids| ids.last())
            .and_then(|id| self.scores.get(id))
    }

    fn prior(
        &self,
        user_id: UserId,
        since: Option<DateTime<Utc>>,
        prior_to: &Transaction,
    ) -> impl Iterator<Item = (&HistoryKey, &Decimal)> {
        let end = (prior_to.created_at, prior_to.id);
        let lower = match since {
            Some(since) => Bound::Included((since, TransactionId(0))),
            None => Bound::Unbounded,
        };
        let empty = matches!(lower, Bound::Included(start) if start > end);
        let upper = Bound::Excluded(end);
        self.history
            .get(&user_id)
            .filter(|_| !empty)
            .into_iter()
            .flat_map(move |history| history.range((lower, upper)))
    }
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn transaction_count(&self) -> usize {
        self.entities.read().await.transactions.len()
    }

    pub async fn score_count(&self) -> usize {
        self.entities.read().await.scores.len()
    }

    pub async fn evaluations_of(&self, transaction_id: TransactionId) -> Vec<ScoreResult> {
        let entities = self.entities.read().await;
        entities
            .evaluations
            .get(&transaction_id)
            .map(|ids| ids.iter().filter_map(|id| entities.scores.get(id).cloned()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn save_transaction(&self, transaction: &Transaction, owner: &Owner) -> anyhow::Result<()> {
        let mut entities = self.entities.write().await;
        if entities.transactions.contains_key(&transaction.id) {
            debug!(transaction_id = %transaction.id, "transaction already stored, keeping original");
            return Ok(());
        }
        entities
            .history
            .entry(transaction.user_id)
            .or_default()
            .insert((transaction.created_at, transaction.id), transaction.amount);
        entities
            .transactions
            .insert(transaction.id, (transaction.clone(), owner.clone()));
        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> anyhow::Result<Option<Transaction>> {
        let entities = self.entities.read().await;
        Ok(entities.transactions.get(&id).map(|(tx, _)| tx.clone()))
    }

    async fn get_owner(&self, transaction: &Transaction) -> anyhow::Result<Option<Owner>> {
        let entities = self.entities.read().await;
        Ok(entities
            .transactions
            .get(&transaction.id)
            .map(|(_, owner)| owner.clone()))
    }

    async fn count_transactions_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        prior_to: &Transaction,
    ) -> anyhow::Result<u64> {
        let entities = self.entities.read().await;
        Ok(entities.prior(user_id, Some(since), prior_to).count() as u64)
    }

    async fn sum_amount_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        prior_to: &Transaction,
    ) -> anyhow::Result<Decimal> {
        let entities = self.entities.read().await;
        Ok(entities
            .prior(user_id, Some(since), prior_to)
            .map(|(_, amount)| *amount)
            .sum())
    }

    async fn count_prior_flagged(&self, user_id: UserId, prior_to: &Transaction) -> anyhow::Result<u64> {
        let entities = self.entities.read().await;
        Ok(entities
            .prior(user_id, None, prior_to)
            .filter(|((_, id), _)| entities.latest(*id).is_some_and(|score| score.is_fraudulent))
            .count() as u64)
    }

    async fn save_score_result(&self, result: &ScoreResult) -> anyhow::Result<ScoreResult> {
        let mut entities = self.entities.write().await;
        if let Some(existing) = entities.scores.get(&result.evaluation_id) {
            debug!(evaluation_id = %result.evaluation_id, "score already persisted");
            return Ok(existing.clone());
        }
        entities
            .scores
            .insert(result.evaluation_id.clone(), result.clone());
        entities
            .evaluations
            .entry(result.transaction_id)
            .or_default()
            .push(result.evaluation_id.clone());
        Ok(result.clone())
    }

    async fn latest_score(&self, transaction_id: TransactionId) -> anyhow::Result<Option<ScoreResult>> {
        let entities = self.entities.read().await;
        Ok(entities.latest(transaction_id).cloned())
    }

    async fn list_flagged(&self, limit: usize) -> anyhow::Result<Vec<FlaggedTransaction>> {
        let entities = self.entities.read().await;
        let mut flagged: Vec<FlaggedTransaction> = entities
            .transactions
            .values()
            .filter_map(|(transaction, _)| {
                let score = entities.latest(transaction.id)?;
                score.is_fraudulent.then(|| FlaggedTransaction {
                    transaction: transaction.clone(),
                    score: score.clone(),
                })
            })
            .collect();
        flagged.sort_by(|a, b| {
            (b.transaction.created_at, b.transaction.id).cmp(&(a.transaction.created_at, a.transaction.id))
        });
        flagged.truncate(limit);
        Ok(flagged)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait]
impl AlertRepository for MemoryEntityStore {
    async fn save_alert(&self, alert: &FraudAlertEvent) -> anyhow::Result<bool> {
        let mut log = self.alerts.write().await;
        if log.by_source.contains_key(&alert.source_event_id) {
            return Ok(false);
        }
        let index = log.alerts.len();
        log.by_source.insert(alert.source_event_id.clone(), index);
        log.alerts.push(StoredAlert {
            alert: alert.clone(),
            published: false,
        });
        Ok(true)
    }

    async fn mark_alert_published(&self, source_event_id: &EventId) -> anyhow::Result<()> {
        let mut log = self.alerts.write().await;
        let Some(index) = log.by_source.get(source_event_id).copied() else {
            anyhow::bail!("no alert recorded for {}", source_event_id);
        };
        if let Some(stored) = log.alerts.get_mut(index) {
            stored.published = true;
        }
        Ok(())
    }

    async fn find_alert_by_source(&self, source_event_id: &EventId) -> anyhow::Result<Option<StoredAlert>> {
        let log = self.alerts.read().await;
        Ok(log
            .by_source
            .get(source_event_id)
            .and_then(|index| log.alerts.get(*index))
            .cloned())
    }

    async fn recent_alerts(&self, limit: usize) -> anyhow::Result<Vec<FraudAlertEvent>> {
        let log = self.alerts.read().await;
        Ok(log
            .alerts
            .iter()
            .rev()
            .take(limit)
            .map(|stored| stored.alert.clone())
            .collect())
    }
}
