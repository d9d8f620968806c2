// Behavioral aggregate
// Computed on demand from the entity store, never persisted

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehavioralAggregate {
    /// Owner's transactions inside the velocity window, excluding the scored one.
    pub recent_count: u64,
    /// Sum of those transactions' amounts.
    pub recent_amount: Decimal,
    /// Owner's earlier transactions whose latest evaluation was flagged.
    pub prior_flagged: u64,
}
