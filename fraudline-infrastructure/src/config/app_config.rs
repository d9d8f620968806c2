use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tokio::fs;
use tracing::warn;

use fraudline_application::consumer::RetryPolicy;
use fraudline_application::PipelineSettings;
use fraudline_domain::{PipelineMode, ScoringPolicy, TemporalBasis, DEFAULT_FRAUD_THRESHOLD};

use crate::channel::{ChannelSettings, DEFAULT_CAPACITY, DEFAULT_PARTITIONS};
use crate::config::validation::{ensure_positive, validate_webhook_url};

pub const CONFIG_ENV: &str = "FRAUDLINE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "./config.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineSection,
    pub fraud: FraudSection,
    pub rules: RulesSection,
    pub channel: ChannelSection,
    pub worker: WorkerSection,
    pub retry: RetrySection,
    pub store: StoreSection,
    pub publish: PublishSection,
    pub alert: AlertSection,
    pub dead_letter: DeadLetterSection,
    pub log: LogSection,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct PipelineSection {
    pub mode: PipelineMode,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FraudSection {
    pub threshold: f64,
}

impl Default for FraudSection {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FRAUD_THRESHOLD,
        }
    }
}

/// Rule tables inline under `[rules]`, or in a YAML file at `rules.path`.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RulesSection {
    pub path: Option<String>,
    #[serde(flatten)]
    pub policy: ScoringPolicy,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChannelSection {
    pub partitions: u32,
    pub capacity: usize,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkerSection {
    /// Workers per consumer group.
    pub concurrency: usize,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self { concurrency: 3 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 200,
            max_backoff_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreSection {
    pub timeout_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self { timeout_ms: 2_000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PublishSection {
    pub max_attempts: u32,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AlertSection {
    pub webhook_url: Option<String>,
    pub webhook_template: Option<String>,
    pub webhook_token: Option<String>,
    pub request_timeout_seconds: u64,
    pub delivery_log_size: usize,
}

impl Default for AlertSection {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_template: None,
            webhook_token: None,
            request_timeout_seconds: 5,
            delivery_log_size: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeadLetterSection {
    pub capacity: usize,
}

impl Default for DeadLetterSection {
    fn default() -> Self {
        Self { capacity: 1_000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogSection {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
    /// Daily rolling files are written here when set.
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
            file_prefix: "fraudline.log".to_string(),
        }
    }
}

impl AppConfig {
    pub async fn load() -> Result<Self> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path).await
    }

    pub async fn load_from(path: &str) -> Result<Self> {
        let file_path = Path::new(path);
        let base_dir = file_path.parent();
        let mut config = if file_path.exists() {
            let content = fs::read_to_string(file_path).await?;
            Self::from_toml(&content)?
        } else {
            warn!(path, "config file not found, using defaults");
            AppConfig::default()
        };
        config.apply_env_overrides();
        config.resolve_paths(base_dir);
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|err| anyhow!("invalid config: {}", err))
    }

    pub fn normalize(&mut self) {
        for value in [
            &mut self.rules.path,
            &mut self.alert.webhook_url,
            &mut self.alert.webhook_template,
            &mut self.alert.webhook_token,
            &mut self.log.directory,
        ] {
            if value.as_deref().map(str::trim).is_some_and(str::is_empty) {
                *value = None;
            }
        }
        if self.log.level.trim().is_empty() {
            self.log.level = LogSection::default().level;
        }
        if self.retry.max_backoff_ms < self.retry.backoff_ms {
            self.retry.max_backoff_ms = self.retry.backoff_ms;
        }
        self.rules.policy.normalize();
    }

    fn resolve_paths(&mut self, base_dir: Option<&Path>) {
        let Some(base) = base_dir else {
            return;
        };
        if let Some(path) = &self.rules.path {
            self.rules.path = Some(resolve_path(base, path));
        }
        if let Some(directory) = &self.log.directory {
            self.log.directory = Some(resolve_path(base, directory));
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure_positive("channel.partitions", u64::from(self.channel.partitions))?;
        ensure_positive("channel.capacity", self.channel.capacity as u64)?;
        ensure_positive("worker.concurrency", self.worker.concurrency as u64)?;
        ensure_positive("retry.max_attempts", u64::from(self.retry.max_attempts))?;
        ensure_positive("store.timeout_ms", self.store.timeout_ms)?;
        ensure_positive("publish.max_attempts", u64::from(self.publish.max_attempts))?;
        ensure_positive("dead_letter.capacity", self.dead_letter.capacity as u64)?;
        if !(0.0..=100.0).contains(&self.fraud.threshold) {
            return Err(anyhow!("fraud.threshold must be within 0..=100"));
        }
        if let Some(url) = &self.alert.webhook_url {
            validate_webhook_url(url)?;
        }
        self.rules.policy.validate()?;
        Ok(())
    }

    /// Inline rule tables with `fraud.threshold` applied. A policy loaded
    /// from `rules.path` goes through [`AppConfig::apply_overrides`].
    pub fn scoring_policy(&self) -> ScoringPolicy {
        self.apply_overrides(self.rules.policy.clone())
    }

    pub fn apply_overrides(&self, mut policy: ScoringPolicy) -> ScoringPolicy {
        policy.fraud_threshold = self.fraud.threshold;
        policy
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            backoff: Duration::from_millis(self.retry.backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            store_timeout: Duration::from_millis(self.store.timeout_ms),
            publish_max_attempts: self.publish.max_attempts,
            retry: self.retry_policy(),
        }
    }

    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            partitions: self.channel.partitions,
            capacity: self.channel.capacity,
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = env::var("FRAUDLINE_PIPELINE_MODE") {
            match value.parse() {
                Ok(mode) => self.pipeline.mode = mode,
                Err(err) => warn!("ignoring FRAUDLINE_PIPELINE_MODE: {}", err),
            }
        }
        if let Ok(value) = env::var("FRAUDLINE_FRAUD_THRESHOLD") {
            self.fraud.threshold = value.parse().unwrap_or(self.fraud.threshold);
        }
        if let Ok(value) = env::var("FRAUDLINE_RULES_PATH") {
            self.rules.path = Some(value);
        }
        if let Ok(value) = env::var("FRAUDLINE_RULES_TEMPORAL_BASIS") {
            match value.trim() {
                "processing_time" => self.rules.policy.temporal_basis = TemporalBasis::ProcessingTime,
                "transaction_time" => self.rules.policy.temporal_basis = TemporalBasis::TransactionTime,
                other => warn!("ignoring FRAUDLINE_RULES_TEMPORAL_BASIS={}", other),
            }
        }
        if let Ok(value) = env::var("FRAUDLINE_CHANNEL_PARTITIONS") {
            self.channel.partitions = value.parse().unwrap_or(self.channel.partitions);
        }
        if let Ok(value) = env::var("FRAUDLINE_CHANNEL_CAPACITY") {
            self.channel.capacity = value.parse().unwrap_or(self.channel.capacity);
        }
        if let Ok(value) = env::var("FRAUDLINE_WORKER_CONCURRENCY") {
            self.worker.concurrency = value.parse().unwrap_or(self.worker.concurrency);
        }
        if let Ok(value) = env::var("FRAUDLINE_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = value.parse().unwrap_or(self.retry.max_attempts);
        }
        if let Ok(value) = env::var("FRAUDLINE_RETRY_BACKOFF_MS") {
            self.retry.backoff_ms = value.parse().unwrap_or(self.retry.backoff_ms);
        }
        if let Ok(value) = env::var("FRAUDLINE_RETRY_MAX_BACKOFF_MS") {
            self.retry.max_backoff_ms = value.parse().unwrap_or(self.retry.max_backoff_ms);
        }
        if let Ok(value) = env::var("FRAUDLINE_STORE_TIMEOUT_MS") {
            self.store.timeout_ms = value.parse().unwrap_or(self.store.timeout_ms);
        }
        if let Ok(value) = env::var("FRAUDLINE_PUBLISH_MAX_ATTEMPTS") {
            self.publish.max_attempts = value.parse().unwrap_or(self.publish.max_attempts);
        }
        if let Ok(value) = env::var("FRAUDLINE_ALERT_WEBHOOK_URL") {
            self.alert.webhook_url = Some(value);
        }
        if let Ok(value) = env::var("FRAUDLINE_ALERT_WEBHOOK_TEMPLATE") {
            self.alert.webhook_template = Some(value);
        }
        if let Ok(value) = env::var("FRAUDLINE_ALERT_WEBHOOK_TOKEN") {
            self.alert.webhook_token = Some(value);
        }
        if let Ok(value) = env::var("FRAUDLINE_LOG_LEVEL") {
            self.log.level = value;
        }
        if let Ok(value) = env::var("FRAUDLINE_LOG_JSON") {
            self.log.json = value.parse().unwrap_or(self.log.json);
        }
        if let Ok(value) = env::var("FRAUDLINE_LOG_DIRECTORY") {
            self.log.directory = Some(value);
        }
    }
}

fn resolve_path(base: &Path, value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return trimmed.to_string();
    }
    let path = Path::new(trimmed);
    if path.is_absolute() {
        trimmed.to_string()
    } else {
        base.join(path).to_string_lossy().to_string()
    }
}
