use fraudline_domain::ports::FlaggedTransaction;
use fraudline_domain::{PipelineMode, ScoreResult, TransactionId};
use tracing::error;

use crate::pipeline::store_call;
use crate::{AppError, AppState};

pub const MAX_LIST_LIMIT: usize = 500;

pub async fn latest_score(state: &AppState, transaction_id: TransactionId) -> Result<ScoreResult, AppError> {
    store_call(state, "latest_score", state.store.latest_score(transaction_id))
        .await
        .map_err(|err| {
            error!("failed to fetch latest score: {}", err);
            err
        })?
        .ok_or_else(|| AppError::NotFound(format!("no score for transaction {}", transaction_id)))
}

pub async fn list_flagged_transactions(
    state: &AppState,
    limit: Option<usize>,
) -> Result<Vec<FlaggedTransaction>, AppError> {
    let limit = limit.unwrap_or(100).clamp(1, MAX_LIST_LIMIT);
    store_call(state, "list_flagged", state.store.list_flagged(limit)).await
}

pub fn fraud_threshold(state: &AppState) -> f64 {
    state.engine.threshold()
}

pub fn is_fraudulent(state: &AppState, score: u32) -> bool {
    state.engine.is_fraudulent(score)
}

pub async fn pipeline_mode(state: &AppState) -> PipelineMode {
    *state.mode.read().await
}
