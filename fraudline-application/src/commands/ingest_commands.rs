use fraudline_domain::{
    EventId, Owner, PipelineMode, PublishReceipt, ScoreResult, Topic, Transaction, TransactionEvent,
};
use tracing::{error, info};

use crate::pipeline::{evaluate_and_persist, publish_with_retry, raise_alert, store_call};
use crate::{AppError, AppState};

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Scored inline.
    Scored(ScoreResult),
    /// Handed to the channel. `receipt` is `None` when publishing failed.
    Accepted {
        event_id: EventId,
        receipt: Option<PublishReceipt>,
    },
}

pub async fn ingest_transaction(
    state: &AppState,
    transaction: Transaction,
    owner: Owner,
) -> Result<IngestOutcome, AppError> {
    if owner.id != transaction.user_id {
        state.metrics.record_ingest_error();
        return Err(AppError::BadRequest(format!(
            "transaction {} belongs to user {}, not {}",
            transaction.id, transaction.user_id, owner.id
        )));
    }
    if let Err(err) = transaction.validate() {
        state.metrics.record_ingest_error();
        return Err(AppError::BadRequest(err.to_string()));
    }

    if let Err(err) = store_call(
        state,
        "save_transaction",
        state.store.save_transaction(&transaction, &owner),
    )
    .await
    {
        state.metrics.record_ingest_error();
        return Err(err);
    }

    let mode = *state.mode.read().await;
    state.metrics.record_ingest(mode);
    match mode {
        PipelineMode::Sync => ingest_inline(state, &transaction, &owner).await,
        PipelineMode::Async => Ok(ingest_queued(state, &transaction, &owner).await),
    }
}

async fn ingest_inline(
    state: &AppState,
    transaction: &Transaction,
    owner: &Owner,
) -> Result<IngestOutcome, AppError> {
    let result = evaluate_and_persist(state, EventId::generate(), transaction).await?;
    raise_alert(state, &result, transaction, owner).await?;
    Ok(IngestOutcome::Scored(result))
}

async fn ingest_queued(state: &AppState, transaction: &Transaction, owner: &Owner) -> IngestOutcome {
    let event = TransactionEvent::new(transaction, owner);
    let event_id = event.event_id.clone();
    let published = match serde_json::to_string(&event) {
        Ok(payload) => {
            publish_with_retry(state, Topic::TransactionEvents, &event.partition_key(), payload).await
        }
        Err(err) => Err(AppError::Internal(err.into())),
    };
    match published {
        Ok(receipt) => {
            info!(
                transaction_id = %transaction.id,
                event_id = %event_id,
                partition = receipt.partition,
                offset = receipt.offset,
                "transaction queued for scoring"
            );
            IngestOutcome::Accepted {
                event_id,
                receipt: Some(receipt),
            }
        }
        Err(err) => {
            state.metrics.record_publish_failure();
            error!(
                transaction_id = %transaction.id,
                event_id = %event_id,
                error = %err,
                "failed to publish transaction event"
            );
            IngestOutcome::Accepted {
                event_id,
                receipt: None,
            }
        }
    }
}

pub async fn set_pipeline_mode(state: &AppState, mode: PipelineMode) -> PipelineMode {
    let mut current = state.mode.write().await;
    let previous = std::mem::replace(&mut *current, mode);
    if previous != mode {
        info!(from = %previous, to = %mode, "pipeline mode switched");
    }
    previous
}
