// Evaluation steps shared by the inline path, the workers and reanalysis

use std::future::Future;

use chrono::{DateTime, Utc};
use fraudline_domain::ports::ChannelError;
use fraudline_domain::{
    BehavioralAggregate, EventId, FraudAlertEvent, Owner, PublishReceipt, ScoreResult, Topic,
    Transaction,
};
use tracing::{debug, info, warn};

use crate::{AppError, AppState};

/// Runs one store call under the configured timeout. Both an elapsed
/// timeout and a store error are reported as transient.
pub async fn store_call<T, F>(state: &AppState, operation: &'static str, call: F) -> Result<T, AppError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(state.settings.store_timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(AppError::TransientStoreFailure(format!("{}: {}", operation, err))),
        Err(_) => Err(AppError::TransientStoreFailure(format!(
            "{}: timed out after {}ms",
            operation,
            state.settings.store_timeout.as_millis()
        ))),
    }
}

pub async fn load_aggregate(
    state: &AppState,
    transaction: &Transaction,
    evaluated_at: DateTime<Utc>,
) -> Result<BehavioralAggregate, AppError> {
    let since = state.engine.window_start(evaluated_at);
    let user_id = transaction.user_id;
    let recent_count = store_call(
        state,
        "count_transactions_since",
        state.store.count_transactions_since(user_id, since, transaction),
    )
    .await?;
    let recent_amount = store_call(
        state,
        "sum_amount_since",
        state.store.sum_amount_since(user_id, since, transaction),
    )
    .await?;
    let prior_flagged = store_call(
        state,
        "count_prior_flagged",
        state.store.count_prior_flagged(user_id, transaction),
    )
    .await?;
    Ok(BehavioralAggregate {
        recent_count,
        recent_amount,
        prior_flagged,
    })
}

/// Scores `transaction` and persists the result under `evaluation_id`.
/// Returns whatever the store holds for that id, so a repeated evaluation
/// yields the first persisted result.
pub async fn evaluate_and_persist(
    state: &AppState,
    evaluation_id: EventId,
    transaction: &Transaction,
) -> Result<ScoreResult, AppError> {
    let evaluated_at = state.engine.evaluation_instant(transaction);
    let aggregate = load_aggregate(state, transaction, evaluated_at).await?;
    let result = state
        .engine
        .evaluate(evaluation_id, transaction, &aggregate, evaluated_at);
    let persisted = store_call(state, "save_score_result", state.store.save_score_result(&result)).await?;
    state.metrics.record_score(persisted.is_fraudulent);
    debug!(
        transaction_id = %transaction.id,
        evaluation_id = %persisted.evaluation_id,
        score = persisted.total,
        flagged = persisted.is_fraudulent,
        "transaction scored"
    );
    Ok(persisted)
}

/// Publishes a fraud alert for a flagged result unless one was already
/// published for the same evaluation.
///
/// The alert row is reserved before publishing. A redelivery that finds a
/// reserved but unpublished row publishes that same alert again instead of
/// building a new one.
pub async fn raise_alert(
    state: &AppState,
    result: &ScoreResult,
    transaction: &Transaction,
    owner: &Owner,
) -> Result<Option<FraudAlertEvent>, AppError> {
    if !result.is_fraudulent {
        return Ok(None);
    }
    let existing = store_call(
        state,
        "find_alert_by_source",
        state.alerts.find_alert_by_source(&result.evaluation_id),
    )
    .await?;
    let alert = match existing {
        Some(stored) if stored.published => {
            state.metrics.record_alert_deduplicated();
            debug!(evaluation_id = %result.evaluation_id, "alert already raised");
            return Ok(None);
        }
        Some(stored) => {
            debug!(alert_id = %stored.alert.alert_id, "republishing reserved alert");
            stored.alert
        }
        None => {
            let alert = FraudAlertEvent::from_score(result, transaction, owner);
            let reserved = store_call(state, "save_alert", state.alerts.save_alert(&alert)).await?;
            if !reserved {
                state.metrics.record_alert_deduplicated();
                debug!(evaluation_id = %result.evaluation_id, "alert reserved concurrently");
                return Ok(None);
            }
            alert
        }
    };

    let payload = serde_json::to_string(&alert).map_err(|err| AppError::Internal(err.into()))?;
    let receipt = publish_with_retry(state, Topic::FraudAlerts, &alert.partition_key(), payload).await?;
    // The alert is out; a failed mark only costs a republish on a later redelivery.
    if let Err(err) = store_call(
        state,
        "mark_alert_published",
        state.alerts.mark_alert_published(&alert.source_event_id),
    )
    .await
    {
        warn!(alert_id = %alert.alert_id, error = %err, "could not mark alert published");
    }
    state.metrics.record_alert_published();
    info!(
        alert_id = %alert.alert_id,
        transaction_id = %alert.transaction_id,
        score = alert.fraud_score,
        severity = %alert.severity,
        partition = receipt.partition,
        offset = receipt.offset,
        "fraud alert published"
    );
    Ok(Some(alert))
}

/// Publishes with up to `publish_max_attempts` tries, backing off between
/// attempts while the partition is full. A closed channel fails at once.
pub async fn publish_with_retry(
    state: &AppState,
    topic: Topic,
    key: &str,
    payload: String,
) -> Result<PublishReceipt, AppError> {
    let max_attempts = state.settings.publish_max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match state.channel.publish(topic, key, payload.clone()).await {
            Ok(receipt) => return Ok(receipt),
            Err(ChannelError::Closed) => return Err(AppError::PublishFailure(ChannelError::Closed.to_string())),
            Err(err) if attempt >= max_attempts => return Err(AppError::PublishFailure(err.to_string())),
            Err(err) => {
                let delay = state.settings.retry.delay_for(attempt);
                warn!(%topic, key, attempt, error = %err, "publish rejected, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
