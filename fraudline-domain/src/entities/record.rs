// Channel record
// What a subscriber receives: the serialized event plus its log position

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::Topic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub topic: Topic,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub payload: String,
    pub published_at: DateTime<Utc>,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub topic: Topic,
    pub partition: u32,
    pub offset: u64,
}
