use std::sync::Arc;
use std::time::Duration;

use fraudline_domain::ports::{AlertRepository, AlertSink, DeadLetterSink, EntityStore, EventChannel};
use fraudline_domain::services::ScoringEngine;
use fraudline_domain::PipelineMode;
use tokio::sync::RwLock;

use crate::consumer::RetryPolicy;
use crate::Metrics;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub store_timeout: Duration,
    pub publish_max_attempts: u32,
    pub retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(2_000),
            publish_max_attempts: 3,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub mode: Arc<RwLock<PipelineMode>>,
    pub engine: Arc<ScoringEngine>,
    pub store: Arc<dyn EntityStore>,
    pub alerts: Arc<dyn AlertRepository>,
    pub channel: Arc<dyn EventChannel>,
    pub alert_sink: Arc<dyn AlertSink>,
    pub dead_letters: Arc<dyn DeadLetterSink>,
    pub metrics: Arc<Metrics>,
    pub settings: PipelineSettings,
}
