use async_trait::async_trait;

use crate::entities::{AlertDeliveryRecord, DeadLetterEntry, FraudAlertEvent};
use crate::value_objects::Topic;

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &FraudAlertEvent) -> anyhow::Result<()>;
    async fn recent_deliveries(&self, limit: usize) -> Vec<AlertDeliveryRecord>;
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn route(&self, entry: DeadLetterEntry) -> anyhow::Result<()>;
    async fn list(&self, topic: Option<Topic>, limit: usize) -> Vec<DeadLetterEntry>;
}
