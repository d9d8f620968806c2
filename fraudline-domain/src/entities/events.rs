// Transport envelopes
// Created at publish time, never mutated afterwards

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::{Owner, ScoreResult, Transaction};
use crate::value_objects::{EventId, Severity, TransactionId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    pub event_id: EventId,
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    pub currency: String,
    pub user_id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransactionEvent {
    pub fn new(transaction: &Transaction, owner: &Owner) -> Self {
        Self {
            event_id: EventId::generate(),
            transaction_id: transaction.id,
            amount: transaction.amount,
            currency: transaction.currency.clone(),
            user_id: transaction.user_id,
            username: owner.username.clone(),
            merchant_name: transaction.merchant_name.clone(),
            merchant_category: transaction.merchant_category.clone(),
            location: transaction.location.clone(),
            ip_address: transaction.ip_address.clone(),
            device_id: transaction.device_id.clone(),
            created_at: transaction.created_at,
        }
    }

    pub fn partition_key(&self) -> String {
        self.user_id.partition_key()
    }

    pub fn owner(&self) -> Owner {
        Owner {
            id: self.user_id,
            username: self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudAlertEvent {
    pub alert_id: String,
    /// Evaluation that raised the alert; at most one alert exists per source.
    pub source_event_id: EventId,
    pub transaction_id: TransactionId,
    pub user_id: UserId,
    pub username: String,
    pub amount: Decimal,
    pub fraud_score: u32,
    pub reason: String,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl FraudAlertEvent {
    pub fn from_score(result: &ScoreResult, transaction: &Transaction, owner: &Owner) -> Self {
        Self {
            alert_id: Self::alert_id_for(&result.evaluation_id),
            source_event_id: result.evaluation_id.clone(),
            transaction_id: transaction.id,
            user_id: owner.id,
            username: owner.username.clone(),
            amount: transaction.amount,
            fraud_score: result.total,
            reason: result.summary(),
            severity: result.severity(),
            created_at: Utc::now(),
        }
    }

    /// One evaluation maps to one alert id, so a re-published alert keeps its identity.
    pub fn alert_id_for(source_event_id: &EventId) -> String {
        format!("alert-{}", source_event_id)
    }

    pub fn partition_key(&self) -> String {
        self.user_id.partition_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transaction_event_requires_transaction_id() {
        let payload = json!({
            "event_id": "e-1",
            "amount": "12.50",
            "currency": "USD",
            "user_id": 4,
            "username": "alice",
            "created_at": "2024-03-01T12:00:00Z"
        });
        let err = serde_json::from_value::<TransactionEvent>(payload).expect_err("missing id");
        assert!(err.to_string().contains("transaction_id"));
    }

    #[test]
    fn transaction_event_reads_decimal_string_amounts() {
        let payload = json!({
            "event_id": "e-2",
            "transaction_id": 10,
            "amount": "99.50",
            "currency": "EUR",
            "user_id": 4,
            "username": "alice",
            "ip_address": "45.1.2.3",
            "created_at": "2024-03-01T12:00:00Z"
        });
        let event: TransactionEvent = serde_json::from_value(payload).expect("decode");
        assert_eq!(event.transaction_id, TransactionId(10));
        assert_eq!(event.amount.to_string(), "99.50");
        assert_eq!(event.partition_key(), "4");
    }
}
