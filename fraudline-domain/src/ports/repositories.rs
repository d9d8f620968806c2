use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::entities::{FraudAlertEvent, Owner, ScoreResult, ScoringPolicy, Transaction};
use crate::value_objects::{EventId, TransactionId, UserId};

#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedTransaction {
    pub transaction: Transaction,
    pub score: ScoreResult,
}

/// An alert row. `published` turns true once the alert reached the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAlert {
    pub alert: FraudAlertEvent,
    pub published: bool,
}

/// Narrow view of the entity store.
///
/// Aggregate queries only ever see transactions strictly before `prior_to`
/// in `(created_at, id)` order, so a transaction never counts towards its
/// own score and later arrivals never leak into an earlier evaluation.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn save_transaction(&self, transaction: &Transaction, owner: &Owner) -> anyhow::Result<()>;
    async fn get_transaction(&self, id: TransactionId) -> anyhow::Result<Option<Transaction>>;
    async fn get_owner(&self, transaction: &Transaction) -> anyhow::Result<Option<Owner>>;
    async fn count_transactions_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        prior_to: &Transaction,
    ) -> anyhow::Result<u64>;
    async fn sum_amount_since(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        prior_to: &Transaction,
    ) -> anyhow::Result<Decimal>;
    async fn count_prior_flagged(&self, user_id: UserId, prior_to: &Transaction) -> anyhow::Result<u64>;
    /// Insert-if-absent keyed by evaluation id. Returns the persisted result,
    /// which is the first one written for that id.
    async fn save_score_result(&self, result: &ScoreResult) -> anyhow::Result<ScoreResult>;
    async fn latest_score(&self, transaction_id: TransactionId) -> anyhow::Result<Option<ScoreResult>>;
    async fn list_flagged(&self, limit: usize) -> anyhow::Result<Vec<FlaggedTransaction>>;
    async fn ping(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// Reserves the alert as unpublished. Returns false when an alert for
    /// the same source event already exists.
    async fn save_alert(&self, alert: &FraudAlertEvent) -> anyhow::Result<bool>;
    async fn mark_alert_published(&self, source_event_id: &EventId) -> anyhow::Result<()>;
    async fn find_alert_by_source(&self, source_event_id: &EventId) -> anyhow::Result<Option<StoredAlert>>;
    async fn recent_alerts(&self, limit: usize) -> anyhow::Result<Vec<FraudAlertEvent>>;
}

/// Rule tables kept outside the main config file.
#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn load_policy(&self, path: &str) -> anyhow::Result<ScoringPolicy>;
    async fn save_policy(&self, path: &str, policy: &ScoringPolicy) -> anyhow::Result<()>;
}
