use chrono::{DateTime, Duration, FixedOffset, Local, TimeZone, Timelike, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::entities::{
    band_points, BehavioralAggregate, RuleHit, Rule, ScoreResult, ScoringPolicy, TemporalBasis,
    Transaction, MAX_SCORE,
};
use crate::value_objects::EventId;

const HIGH_AMOUNT_REASON: &str = "High transaction amount";
const VELOCITY_REASON: &str = "Multiple transactions in short time period";
const AMOUNT_VELOCITY_REASON: &str = "High transaction volume in short time period";
const UNUSUAL_TIME_REASON: &str = "Transaction at unusual time";
const GEOGRAPHIC_REASON: &str = "Suspicious geographic location";
const FRAUD_HISTORY_REASON: &str = "User has previous fraudulent transactions";
const MERCHANT_RISK_REASON: &str = "High-risk merchant category";

/// Rule-based risk scoring. Pure: every input, including the evaluation
/// instant, is passed in by the caller.
#[derive(Debug, Clone, Default)]
pub struct ScoringEngine {
    policy: ScoringPolicy,
}

impl ScoringEngine {
    pub fn new(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn threshold(&self) -> f64 {
        self.policy.fraud_threshold
    }

    pub fn is_fraudulent(&self, total: u32) -> bool {
        f64::from(total) >= self.policy.fraud_threshold
    }

    /// Instant the time-of-day rule and the velocity window are anchored to.
    pub fn evaluation_instant(&self, transaction: &Transaction) -> DateTime<Utc> {
        match self.policy.temporal_basis {
            TemporalBasis::ProcessingTime => Utc::now(),
            TemporalBasis::TransactionTime => transaction.created_at,
        }
    }

    /// Saturates at the earliest representable instant for windows that
    /// reach past it.
    pub fn window_start(&self, evaluated_at: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_minutes(self.policy.velocity_window_minutes)
            .and_then(|window| evaluated_at.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn score(
        &self,
        evaluation_id: EventId,
        transaction: &Transaction,
        aggregate: &BehavioralAggregate,
    ) -> ScoreResult {
        let evaluated_at = self.evaluation_instant(transaction);
        self.evaluate(evaluation_id, transaction, aggregate, evaluated_at)
    }

    /// Scores at `evaluated_at`, reading the hour in the policy's clock.
    pub fn evaluate(
        &self,
        evaluation_id: EventId,
        transaction: &Transaction,
        aggregate: &BehavioralAggregate,
        evaluated_at: DateTime<Utc>,
    ) -> ScoreResult {
        match self
            .policy
            .utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
        {
            Some(offset) => self.score_at(
                evaluation_id,
                transaction,
                aggregate,
                &evaluated_at.with_timezone(&offset),
            ),
            None => self.score_at(
                evaluation_id,
                transaction,
                aggregate,
                &evaluated_at.with_timezone(&Local),
            ),
        }
    }

    pub fn score_at<Tz: TimeZone>(
        &self,
        evaluation_id: EventId,
        transaction: &Transaction,
        aggregate: &BehavioralAggregate,
        evaluated_at: &DateTime<Tz>,
    ) -> ScoreResult {
        let mut reasons = Vec::new();

        let points = band_points(&self.policy.amount_bands, &transaction.amount);
        if points > 0 {
            let shown = transaction
                .amount
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            reasons.push(hit(
                Rule::HighAmount,
                points,
                format!("{} (${})", HIGH_AMOUNT_REASON, two_places(shown)),
            ));
        }

        let points = band_points(&self.policy.count_bands, &aggregate.recent_count);
        if points > 0 {
            reasons.push(hit(Rule::Velocity, points, VELOCITY_REASON.to_string()));
        }

        let points = band_points(&self.policy.volume_bands, &aggregate.recent_amount);
        if points > 0 {
            reasons.push(hit(Rule::AmountVelocity, points, AMOUNT_VELOCITY_REASON.to_string()));
        }

        let points = self.unusual_time_points(evaluated_at.hour());
        if points > 0 {
            reasons.push(hit(Rule::UnusualTime, points, UNUSUAL_TIME_REASON.to_string()));
        }

        let points = self.geographic_points(transaction.ip_address.as_deref());
        if points > 0 {
            reasons.push(hit(Rule::Geographic, points, GEOGRAPHIC_REASON.to_string()));
        }

        let points = band_points(&self.policy.history_bands, &aggregate.prior_flagged);
        if points > 0 {
            reasons.push(hit(Rule::FraudHistory, points, FRAUD_HISTORY_REASON.to_string()));
        }

        let points = self.merchant_points(transaction.merchant_category.as_deref());
        if points > 0 {
            reasons.push(hit(Rule::MerchantRisk, points, MERCHANT_RISK_REASON.to_string()));
        }

        let raw: u32 = reasons.iter().map(|hit| hit.points).sum();
        let total = raw.min(MAX_SCORE);

        ScoreResult {
            evaluation_id,
            transaction_id: transaction.id,
            total,
            is_fraudulent: self.is_fraudulent(total),
            reasons,
            computed_at: evaluated_at.with_timezone(&Utc),
        }
    }

    fn unusual_time_points(&self, hour: u32) -> u32 {
        self.policy
            .hour_bands
            .iter()
            .find(|band| band.contains(hour))
            .map(|band| band.points)
            .unwrap_or(0)
    }

    fn geographic_points(&self, ip_address: Option<&str>) -> u32 {
        let Some(ip) = ip_address.map(str::trim).filter(|ip| !ip.is_empty()) else {
            return 0;
        };
        let prefixes = &self.policy.ip_prefixes;
        if prefixes.high_risk.iter().any(|prefix| ip.starts_with(prefix.as_str())) {
            return prefixes.high_risk_points;
        }
        if prefixes.private.iter().any(|prefix| ip.starts_with(prefix.as_str())) {
            return prefixes.private_points;
        }
        0
    }

    fn merchant_points(&self, category: Option<&str>) -> u32 {
        let Some(category) = category.map(str::to_lowercase) else {
            return 0;
        };
        let listed = |entries: &[String]| {
            entries
                .iter()
                .any(|entry| category.contains(&entry.to_lowercase()))
        };
        let categories = &self.policy.categories;
        if listed(categories.high_risk.as_slice()) {
            return categories.high_risk_points;
        }
        if listed(categories.medium_risk.as_slice()) {
            return categories.medium_risk_points;
        }
        0
    }
}

fn hit(rule: Rule, points: u32, reason: String) -> RuleHit {
    RuleHit { rule, points, reason }
}

fn two_places(amount: Decimal) -> String {
    let mut amount = amount;
    amount.rescale(2);
    amount.to_string()
}
