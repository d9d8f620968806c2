use fraudline_domain::{EventId, ScoreResult, TransactionId};
use tracing::info;

use crate::pipeline::{evaluate_and_persist, raise_alert, store_call};
use crate::{AppError, AppState};

/// Scores a stored transaction again. The new result gets its own
/// evaluation id; earlier results stay untouched.
pub async fn reanalyze_transaction(
    state: &AppState,
    transaction_id: TransactionId,
) -> Result<ScoreResult, AppError> {
    let transaction = store_call(state, "get_transaction", state.store.get_transaction(transaction_id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", transaction_id)))?;
    let owner = store_call(state, "get_owner", state.store.get_owner(&transaction))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("owner of transaction {}", transaction_id)))?;

    let result = evaluate_and_persist(state, EventId::generate(), &transaction).await?;
    raise_alert(state, &result, &transaction, &owner).await?;
    info!(
        transaction_id = %transaction_id,
        evaluation_id = %result.evaluation_id,
        score = result.total,
        "transaction reanalyzed"
    );
    Ok(result)
}
