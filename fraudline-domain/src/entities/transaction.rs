// Transaction entity
// Immutable once created; scoring results live in separate records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value_objects::{TransactionId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
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

impl Transaction {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.amount <= Decimal::ZERO {
            anyhow::bail!("amount must be positive, got {}", self.amount);
        }
        if self.currency.trim().is_empty() {
            anyhow::bail!("currency is required");
        }
        Ok(())
    }

    /// Strict history order used by behavioral aggregates: creation time, then id.
    pub fn is_prior_to(&self, other: &Transaction) -> bool {
        (self.created_at, self.id) < (other.created_at, other.id)
    }
}

/// The only user fields the pipeline reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: UserId,
    pub username: String,
}
