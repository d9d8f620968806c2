// Score result entity
// One immutable record per evaluation of a transaction

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{EventId, Severity, TransactionId};

pub const NO_INDICATORS_REASON: &str = "No fraud indicators detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    HighAmount,
    Velocity,
    AmountVelocity,
    UnusualTime,
    Geographic,
    FraudHistory,
    MerchantRisk,
}

impl Rule {
    /// Declaration order; reasons are always reported in this order.
    pub const ALL: [Rule; 7] = [
        Rule::HighAmount,
        Rule::Velocity,
        Rule::AmountVelocity,
        Rule::UnusualTime,
        Rule::Geographic,
        Rule::FraudHistory,
        Rule::MerchantRisk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::HighAmount => "high_amount",
            Rule::Velocity => "velocity",
            Rule::AmountVelocity => "amount_velocity",
            Rule::UnusualTime => "unusual_time",
            Rule::Geographic => "geographic",
            Rule::FraudHistory => "fraud_history",
            Rule::MerchantRisk => "merchant_risk",
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHit {
    pub rule: Rule,
    pub points: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub evaluation_id: EventId,
    pub transaction_id: TransactionId,
    pub total: u32,
    pub is_fraudulent: bool,
    pub reasons: Vec<RuleHit>,
    pub computed_at: DateTime<Utc>,
}

impl ScoreResult {
    pub fn summary(&self) -> String {
        if self.reasons.is_empty() {
            return NO_INDICATORS_REASON.to_string();
        }
        self.reasons
            .iter()
            .map(|hit| hit.reason.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn rule_scores(&self) -> BTreeMap<Rule, u32> {
        self.reasons.iter().map(|hit| (hit.rule, hit.points)).collect()
    }

    pub fn severity(&self) -> Severity {
        Severity::from_score(self.total)
    }

    pub fn fired(&self, rule: Rule) -> bool {
        self.reasons.iter().any(|hit| hit.rule == rule)
    }
}
