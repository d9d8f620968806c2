use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use fraudline_domain::ports::AlertSink;
use fraudline_domain::{AlertDeliveryRecord, FraudAlertEvent, Severity};

use crate::config::AppConfig;

const WEBHOOK_ATTEMPTS: u8 = 3;
const DEFAULT_TEMPLATE: &str = r#"{"text":"Fraud alert [{severity}] transaction {transaction_id} user {username} amount {amount} score {score}: {reason}"}"#;

#[derive(Debug, Clone)]
pub struct AlertSinkSettings {
    pub webhook_url: Option<String>,
    pub webhook_template: Option<String>,
    pub webhook_token: Option<String>,
    pub request_timeout: Duration,
    pub delivery_log_size: usize,
}

impl AlertSinkSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            webhook_url: config.alert.webhook_url.clone(),
            webhook_template: config.alert.webhook_template.clone(),
            webhook_token: config.alert.webhook_token.clone(),
            request_timeout: Duration::from_secs(config.alert.request_timeout_seconds.max(1)),
            delivery_log_size: config.alert.delivery_log_size.max(1),
        }
    }
}

impl Default for AlertSinkSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Logs every alert and, when a webhook is configured, posts it there.
pub struct DefaultAlertSink {
    settings: AlertSinkSettings,
    client: Client,
    deliveries: Mutex<VecDeque<AlertDeliveryRecord>>,
}

impl DefaultAlertSink {
    pub fn new(settings: AlertSinkSettings) -> Result<Self> {
        let client = Client::builder().timeout(settings.request_timeout).build()?;
        Ok(Self {
            settings,
            client,
            deliveries: Mutex::new(VecDeque::new()),
        })
    }

    pub fn webhook_enabled(&self) -> bool {
        self.settings.webhook_url.is_some()
    }

    pub async fn check_target(&self) -> Result<()> {
        let Some(url) = &self.settings.webhook_url else {
            anyhow::bail!("alert webhook url not configured");
        };
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("alert webhook responded {}", response.status());
        }
        Ok(())
    }

    async fn post(&self, url: &str, payload: &str) -> Result<()> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(payload.to_string());
        if let Some(token) = &self.settings.webhook_token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }

    async fn record(&self, record: AlertDeliveryRecord) {
        let mut deliveries = self.deliveries.lock().await;
        deliveries.push_back(record);
        while deliveries.len() > self.settings.delivery_log_size {
            deliveries.pop_front();
        }
    }
}

#[async_trait]
impl AlertSink for DefaultAlertSink {
    async fn deliver(&self, alert: &FraudAlertEvent) -> Result<()> {
        log_alert(alert);

        let Some(url) = self.settings.webhook_url.as_deref() else {
            self.record(delivery_record(alert, "logged", "log", 1, None)).await;
            return Ok(());
        };

        let template = self.settings.webhook_template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
        let payload = build_payload(alert, template);
        let mut last_error = None;
        for attempt in 1..=WEBHOOK_ATTEMPTS {
            match self.post(url, &payload).await {
                Ok(()) => {
                    self.record(delivery_record(alert, "sent", "webhook", attempt, None)).await;
                    return Ok(());
                }
                Err(err) => {
                    warn!(alert_id = %alert.alert_id, attempt, error = %err, "alert webhook failed");
                    last_error = Some(err);
                    if attempt < WEBHOOK_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                    }
                }
            }
        }
        let err = last_error.unwrap_or_else(|| anyhow::anyhow!("alert webhook failed"));
        self.record(delivery_record(
            alert,
            "failed",
            "webhook",
            WEBHOOK_ATTEMPTS,
            Some(err.to_string()),
        ))
        .await;
        Err(err)
    }

    async fn recent_deliveries(&self, limit: usize) -> Vec<AlertDeliveryRecord> {
        let deliveries = self.deliveries.lock().await;
        deliveries.iter().rev().take(limit).cloned().collect()
    }
}

fn log_alert(alert: &FraudAlertEvent) {
    match alert.severity {
        Severity::High => error!(
            alert_id = %alert.alert_id,
            transaction_id = %alert.transaction_id,
            user = %alert.username,
            amount = %alert.amount,
            score = alert.fraud_score,
            reason = %alert.reason,
            "FRAUD ALERT [HIGH]"
        ),
        Severity::Medium => warn!(
            alert_id = %alert.alert_id,
            transaction_id = %alert.transaction_id,
            user = %alert.username,
            amount = %alert.amount,
            score = alert.fraud_score,
            reason = %alert.reason,
            "FRAUD ALERT [MEDIUM]"
        ),
        Severity::Low => info!(
            alert_id = %alert.alert_id,
            transaction_id = %alert.transaction_id,
            user = %alert.username,
            score = alert.fraud_score,
            "fraud alert [LOW]"
        ),
    }
}

fn delivery_record(
    alert: &FraudAlertEvent,
    status: &str,
    mode: &str,
    attempts: u8,
    error: Option<String>,
) -> AlertDeliveryRecord {
    AlertDeliveryRecord {
        timestamp: Utc::now(),
        alert_id: alert.alert_id.clone(),
        source_event_id: alert.source_event_id.clone(),
        severity: alert.severity,
        status: status.to_string(),
        mode: mode.to_string(),
        attempts,
        error,
    }
}

/// Fills the template placeholders with JSON-escaped values.
fn build_payload(alert: &FraudAlertEvent, template: &str) -> String {
    template
        .replace("{alert_id}", &escape(&alert.alert_id))
        .replace("{severity}", alert.severity.as_str())
        .replace("{transaction_id}", &alert.transaction_id.to_string())
        .replace("{user_id}", &alert.user_id.to_string())
        .replace("{username}", &escape(&alert.username))
        .replace("{amount}", &alert.amount.to_string())
        .replace("{score}", &alert.fraud_score.to_string())
        .replace("{reason}", &escape(&alert.reason))
}

fn escape(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fraudline_domain::{EventId, TransactionId, UserId};
    use rust_decimal_macros::dec;

    fn alert(id: &str, severity: Severity) -> FraudAlertEvent {
        FraudAlertEvent {
            alert_id: id.to_string(),
            source_event_id: EventId::from(format!("src-{}", id).as_str()),
            transaction_id: TransactionId(17),
            user_id: UserId(3),
            username: "o\"neil".to_string(),
            amount: dec!(10000.00),
            fraud_score: 75,
            reason: "High transaction amount ($10000.00); High-risk merchant category".to_string(),
            severity,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn payload_is_valid_json_with_escaped_fields() {
        let payload = build_payload(&alert("a1", Severity::Medium), DEFAULT_TEMPLATE);
        let value: serde_json::Value = serde_json::from_str(&payload).expect("json");
        let text = value["text"].as_str().expect("text");
        assert!(text.starts_with("Fraud alert [MEDIUM] transaction 17 user o\"neil"));
        assert!(text.ends_with("High-risk merchant category"));
    }

    #[tokio::test]
    async fn log_only_delivery_is_recorded() {
        let sink = DefaultAlertSink::new(AlertSinkSettings::default()).expect("sink");
        assert!(!sink.webhook_enabled());
        sink.deliver(&alert("a1", Severity::High)).await.expect("deliver");
        let deliveries = sink.recent_deliveries(10).await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].status, "logged");
        assert_eq!(deliveries[0].mode, "log");
        assert!(sink.check_target().await.is_err());
    }

    #[tokio::test]
    async fn delivery_log_is_bounded_and_newest_first() {
        let settings = AlertSinkSettings {
            delivery_log_size: 2,
            ..AlertSinkSettings::default()
        };
        let sink = DefaultAlertSink::new(settings).expect("sink");
        for id in ["a1", "a2", "a3"] {
            sink.deliver(&alert(id, Severity::Low)).await.expect("deliver");
        }
        let ids: Vec<String> = sink
            .recent_deliveries(10)
            .await
            .into_iter()
            .map(|record| record.alert_id)
            .collect();
        assert_eq!(ids, vec!["a3", "a2"]);
    }
}
