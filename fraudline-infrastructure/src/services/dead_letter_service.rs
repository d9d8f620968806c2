use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{error, warn};

use fraudline_domain::ports::DeadLetterSink;
use fraudline_domain::{DeadLetterEntry, Topic};

pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1_000;

/// Bounded queue of records that could not be processed; the oldest entry is evicted first.
pub struct InMemoryDeadLetterQueue {
    capacity: usize,
    entries: RwLock<VecDeque<DeadLetterEntry>>,
}

impl InMemoryDeadLetterQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryDeadLetterQueue {
    fn default() -> Self {
        Self::new(DEFAULT_DEAD_LETTER_CAPACITY)
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterQueue {
    async fn route(&self, entry: DeadLetterEntry) -> Result<()> {
        error!(
            topic = %entry.topic,
            partition = entry.partition,
            offset = entry.offset,
            key = %entry.key,
            cause = ?entry.cause,
            attempts = entry.attempts,
            error = %entry.error,
            "record dead-lettered"
        );
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        if entries.len() > self.capacity {
            entries.pop_front();
            warn!(capacity = self.capacity, "dead letter queue full, evicted oldest entry");
        }
        Ok(())
    }

    async fn list(&self, topic: Option<Topic>, limit: usize) -> Vec<DeadLetterEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .rev()
            .filter(|entry| topic.map_or(true, |topic| entry.topic == topic))
            .take(limit)
            .cloned()
            .collect()
    }
}
