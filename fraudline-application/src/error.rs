use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("store unavailable: {0}")]
    TransientStoreFailure(String),
    #[error("invalid input: {0}")]
    PermanentInputFailure(String),
    #[error("publish failed: {0}")]
    PublishFailure(String),
    #[error("rule evaluation failed: {0}")]
    RuleEvaluationFailure(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Failures that redelivery can never fix.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            AppError::PermanentInputFailure(_) | AppError::NotFound(_) | AppError::BadRequest(_)
        )
    }
}
