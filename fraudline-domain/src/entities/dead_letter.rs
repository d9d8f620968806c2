use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::Record;
use crate::value_objects::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterCause {
    /// Payload could not be decoded or referenced data does not exist.
    PermanentInput,
    /// Transient failures outlasted the retry budget.
    RetriesExhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub topic: Topic,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub payload: String,
    pub cause: DeadLetterCause,
    pub error: String,
    pub attempts: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    pub fn from_record(record: &Record, cause: DeadLetterCause, error: impl Into<String>) -> Self {
        Self {
            topic: record.topic,
            partition: record.partition,
            offset: record.offset,
            key: record.key.clone(),
            payload: record.payload.clone(),
            cause,
            error: error.into(),
            attempts: record.attempt,
            dead_lettered_at: Utc::now(),
        }
    }
}
