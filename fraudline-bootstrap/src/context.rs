use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::{info, warn};

use fraudline_application::{AppState, Metrics};
use fraudline_domain::ports::{EntityStore, EventChannel, PolicyRepository};
use fraudline_domain::{ScoringEngine, ScoringPolicy};
use fraudline_infrastructure::{
    AlertSinkSettings, AppConfig, DefaultAlertSink, InMemoryDeadLetterQueue, MemoryEntityStore,
    PartitionedChannel, PolicyFileRepository,
};

/// Every adapter wired once; the concrete handles stay reachable for the lifecycle and tests.
pub struct AppContext {
    pub config: AppConfig,
    pub state: AppState,
    pub store: Arc<MemoryEntityStore>,
    pub channel: Arc<PartitionedChannel>,
    pub alert_sink: Arc<DefaultAlertSink>,
    pub dead_letters: Arc<InMemoryDeadLetterQueue>,
}

impl AppContext {
    pub async fn new() -> Result<Self> {
        let config = AppConfig::load().await?;
        Self::from_config(config).await
    }

    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let policy = load_policy(&config).await?;

        let store = Arc::new(MemoryEntityStore::new());
        store.ping().await?;

        let channel = Arc::new(PartitionedChannel::new(config.channel_settings()));
        let alert_sink = Arc::new(DefaultAlertSink::new(AlertSinkSettings::from_config(&config))?);
        if alert_sink.webhook_enabled() {
            if let Err(err) = alert_sink.check_target().await {
                warn!(error = %err, "alert webhook not reachable, alerts will still be logged");
            }
        }
        let dead_letters = Arc::new(InMemoryDeadLetterQueue::new(config.dead_letter.capacity));

        info!(
            mode = %config.pipeline.mode,
            threshold = policy.fraud_threshold,
            temporal_basis = ?policy.temporal_basis,
            partitions = channel.partition_count(),
            workers = config.worker.concurrency,
            "pipeline context ready"
        );

        let state = AppState {
            mode: Arc::new(RwLock::new(config.pipeline.mode)),
            engine: Arc::new(ScoringEngine::new(policy)),
            store: store.clone(),
            alerts: store.clone(),
            channel: channel.clone(),
            alert_sink: alert_sink.clone(),
            dead_letters: dead_letters.clone(),
            metrics: Arc::new(Metrics::default()),
            settings: config.pipeline_settings(),
        };

        Ok(Self {
            config,
            state,
            store,
            channel,
            alert_sink,
            dead_letters,
        })
    }

    /// Writes the effective rule tables, config overrides included, as a rules file.
    pub async fn export_rules(&self, path: &str) -> Result<()> {
        PolicyFileRepository::new()
            .save_policy(path, self.state.engine.policy())
            .await?;
        info!(path = %path, "scoring rules exported");
        Ok(())
    }
}

async fn load_policy(config: &AppConfig) -> Result<ScoringPolicy> {
    let Some(path) = &config.rules.path else {
        return Ok(config.scoring_policy());
    };
    let policy = PolicyFileRepository::new().load_policy(path).await?;
    info!(path = %path, "scoring rules loaded from file");
    Ok(config.apply_overrides(policy))
}
