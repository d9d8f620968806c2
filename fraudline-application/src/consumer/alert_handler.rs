use async_trait::async_trait;
use fraudline_domain::{FraudAlertEvent, Record};

use crate::consumer::{decode_payload, EventHandler};
use crate::{AppError, AppState};

pub const ALERT_GROUP: &str = "fraud-alerts-group";

/// `fraud-alerts` consumer feeding the alert sink.
pub struct AlertHandler {
    state: AppState,
}

impl AlertHandler {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl EventHandler for AlertHandler {
    fn name(&self) -> &'static str {
        "alerts"
    }

    async fn handle(&self, record: &Record) -> Result<(), AppError> {
        let alert: FraudAlertEvent = decode_payload(record)?;
        self.state.alert_sink.deliver(&alert).await?;
        self.state.metrics.record_alert_delivered();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fraudline_domain::{EventId, Severity, Topic, TransactionId, UserId};
    use rust_decimal_macros::dec;

    use crate::testing::fixture;

    fn alert_record() -> Record {
        let alert = FraudAlertEvent {
            alert_id: "a-1".to_string(),
            source_event_id: EventId::from("e-1"),
            transaction_id: TransactionId(1),
            user_id: UserId(2),
            username: "bob".to_string(),
            amount: dec!(15000.00),
            fraud_score: 92,
            reason: "High transaction amount ($15000.00)".to_string(),
            severity: Severity::High,
            created_at: Utc::now(),
        };
        Record {
            topic: Topic::FraudAlerts,
            partition: 0,
            offset: 3,
            key: "2".to_string(),
            payload: serde_json::to_string(&alert).expect("encode"),
            published_at: Utc::now(),
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn delivers_decoded_alert() {
        let fx = fixture();
        AlertHandler::new(fx.state.clone())
            .handle(&alert_record())
            .await
            .expect("deliver");
        let delivered = fx.sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn sink_failure_is_retryable() {
        let fx = fixture();
        fx.sink.fail_delivery(true);
        let err = AlertHandler::new(fx.state.clone())
            .handle(&alert_record())
            .await
            .expect_err("sink down");
        assert!(!err.is_permanent());
    }
}
