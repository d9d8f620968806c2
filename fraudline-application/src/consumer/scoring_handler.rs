use async_trait::async_trait;
use fraudline_domain::{Record, TransactionEvent};
use tracing::debug;

use crate::consumer::{decode_payload, EventHandler};
use crate::pipeline::{evaluate_and_persist, raise_alert, store_call};
use crate::{AppError, AppState};

pub const SCORING_GROUP: &str = "fraud-detection-group";

/// `transaction-events` consumer: score, persist, alert.
pub struct ScoringHandler {
    state: AppState,
}

impl ScoringHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl EventHandler for ScoringHandler {
    fn name(&self) -> &'static str {
        "scoring"
    }

    async fn handle(&self, record: &Record) -> Result<(), AppError> {
        let event: TransactionEvent = decode_payload(record)?;
        let state = &self.state;
        let transaction = store_call(
            state,
            "get_transaction",
            state.store.get_transaction(event.transaction_id),
        )
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", event.transaction_id)))?;
        let owner = store_call(state, "get_owner", state.store.get_owner(&transaction))
            .await?
            .unwrap_or_else(|| event.owner());

        let result = evaluate_and_persist(state, event.event_id.clone(), &transaction).await?;
        raise_alert(state, &result, &transaction, &owner).await?;
        debug!(
            event_id = %event.event_id,
            partition = record.partition,
            offset = record.offset,
            attempt = record.attempt,
            "transaction event processed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fraudline_domain::ports::EntityStore;
    use fraudline_domain::{FraudAlertEvent, Topic};
    use rust_decimal_macros::dec;

    use crate::testing::{fixture, sample_owner, sample_transaction};

    fn record(payload: String, attempt: u32) -> Record {
        Record {
            topic: Topic::TransactionEvents,
            partition: 1,
            offset: 0,
            key: "7".to_string(),
            payload,
            published_at: Utc::now(),
            attempt,
        }
    }

    #[tokio::test]
    async fn redelivered_event_scores_once_and_alerts_once() {
        let fx = fixture();
        let owner = sample_owner(7);
        let mut tx = sample_transaction(11, 7, dec!(15000), 0);
        tx.ip_address = Some("45.2.2.2".to_string());
        tx.merchant_category = Some("Money Services".to_string());
        fx.store.save_transaction(&tx, &owner).await.expect("save");
        let payload = serde_json::to_string(&TransactionEvent::new(&tx, &owner)).expect("encode");

        let handler = ScoringHandler::new(fx.state.clone());
        handler.handle(&record(payload.clone(), 1)).await.expect("first");
        let first = fx.store.latest_score(tx.id).await.expect("score").expect("present");
        handler.handle(&record(payload, 2)).await.expect("redelivery");
        let second = fx.store.latest_score(tx.id).await.expect("score").expect("present");

        assert_eq!(first, second);
        assert_eq!(fx.store.score_count(), 1);
        assert_eq!(fx.channel.published(Topic::FraudAlerts).len(), 1);
    }

    #[tokio::test]
    async fn failed_alert_save_does_not_duplicate_on_redelivery() {
        let fx = fixture();
        let owner = sample_owner(7);
        let mut tx = sample_transaction(13, 7, dec!(15000), 0);
        tx.ip_address = Some("45.2.2.2".to_string());
        tx.merchant_category = Some("Money Services".to_string());
        fx.store.save_transaction(&tx, &owner).await.expect("save");
        let event = TransactionEvent::new(&tx, &owner);
        let payload = serde_json::to_string(&event).expect("encode");

        fx.store.fail_next_save_alert(1);
        let handler = ScoringHandler::new(fx.state.clone());
        let err = handler.handle(&record(payload.clone(), 1)).await.expect_err("alert store down");
        assert!(matches!(err, AppError::TransientStoreFailure(_)));
        assert!(fx.channel.published(Topic::FraudAlerts).is_empty());

        handler.handle(&record(payload.clone(), 2)).await.expect("redelivery");
        handler.handle(&record(payload, 3)).await.expect("late duplicate");
        let published = fx.channel.published(Topic::FraudAlerts);
        assert_eq!(published.len(), 1);
        let alert: FraudAlertEvent = serde_json::from_str(&published[0].1).expect("decode");
        assert_eq!(alert.alert_id, FraudAlertEvent::alert_id_for(&event.event_id));
    }

    #[tokio::test]
    async fn missing_transaction_id_is_permanent() {
        let fx = fixture();
        let payload = r#"{"event_id":"e-1","amount":"10.00","currency":"USD","user_id":7,"username":"u","created_at":"2024-03-01T12:00:00Z"}"#;
        let err = ScoringHandler::new(fx.state.clone())
            .handle(&record(payload.to_string(), 1))
            .await
            .expect_err("undecodable");
        assert!(err.is_permanent());
    }

    #[tokio::test]
    async fn unknown_transaction_is_permanent() {
        let fx = fixture();
        let tx = sample_transaction(12, 7, dec!(10), 0);
        let payload = serde_json::to_string(&TransactionEvent::new(&tx, &sample_owner(7))).expect("encode");
        let err = ScoringHandler::new(fx.state.clone())
            .handle(&record(payload, 1))
            .await
            .expect_err("not stored");
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
