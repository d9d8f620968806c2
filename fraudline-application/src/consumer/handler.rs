use async_trait::async_trait;
use fraudline_domain::Record;
use serde::de::DeserializeOwned;

use crate::AppError;

/// Processes one record. Errors decide the record's fate: permanent ones
/// are dead-lettered at once, everything else is retried with backoff.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, record: &Record) -> Result<(), AppError>;
}

pub fn decode_payload<T: DeserializeOwned>(record: &Record) -> Result<T, AppError> {
    serde_json::from_str(&record.payload).map_err(|err| {
        AppError::PermanentInputFailure(format!(
            "undecodable {} payload at {}/{}: {}",
            record.topic, record.partition, record.offset, err
        ))
    })
}
