use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{PublishReceipt, Record};
use crate::value_objects::Topic;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("partition {partition} of {topic} is full ({capacity} records retained)")]
    Full {
        topic: Topic,
        partition: u32,
        capacity: usize,
    },
    #[error("channel is closed")]
    Closed,
    #[error("record {offset} on {topic}/{partition} is no longer held by this consumer")]
    Stale {
        topic: Topic,
        partition: u32,
        offset: u64,
    },
    #[error("invalid consumer group: {0}")]
    InvalidGroup(String),
}

/// Ordered, partitioned transport. Records sharing a key land on one
/// partition and reach a consumer group in publish order.
#[async_trait]
pub trait EventChannel: Send + Sync {
    async fn publish(&self, topic: Topic, key: &str, payload: String) -> Result<PublishReceipt, ChannelError>;
    async fn subscribe(&self, topic: Topic, group: &str) -> Result<Box<dyn Subscription>, ChannelError>;
    /// Unacknowledged records on `topic`, summed over its consumer groups.
    /// With no group yet, every retained record counts.
    async fn backlog(&self, topic: Topic) -> usize;
    fn partition_count(&self) -> u32;
    async fn close(&self);
}

/// One member of a consumer group. Dropping it leaves the group.
#[async_trait]
pub trait Subscription: Send {
    fn consumer_id(&self) -> &str;
    /// Waits for the next record this member may process. Cancel safe:
    /// dropping the future never loses a record. `None` once the channel closes.
    async fn next(&mut self) -> Option<Delivery>;
    fn assigned_partitions(&self) -> Vec<u32>;
}

pub trait Acknowledge: Send + Sync {
    fn ack(&self) -> Result<(), ChannelError>;
    fn nack(&self, delay: Duration) -> Result<(), ChannelError>;
}

/// A record handed to one consumer. Dropping it unresolved nacks it.
pub struct Delivery {
    record: Record,
    handle: Box<dyn Acknowledge>,
    resolved: bool,
}

impl Delivery {
    pub fn new(record: Record, handle: Box<dyn Acknowledge>) -> Self {
        Self {
            record,
            handle,
            resolved: false,
        }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn ack(mut self) -> Result<(), ChannelError> {
        self.resolved = true;
        self.handle.ack()
    }

    pub fn nack(mut self, delay: Duration) -> Result<(), ChannelError> {
        self.resolved = true;
        self.handle.nack(delay)
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("record", &self.record)
            .field("resolved", &self.resolved)
            .finish()
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if !self.resolved {
            let _ = self.handle.nack(Duration::ZERO);
        }
    }
}
