//! # Notification Dispatch
//!
//! Delivers triggered alerts to their configured channels. The dispatcher is
//! injected into the alert engine behind [`NotificationSink`] so tests can
//! substitute a recording fake.
//!
//! Channel strings come from the alert rule's `channels` array:
//! `"dashboard"`, `"webhook:<https-url>"`, and `"email"` or
//! `"email:<address>"`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use metrics::counter;
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::AlertConfig;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted webhook URL length
const MAX_WEBHOOK_URL_LEN: usize = 2048;

/// Delivery attempts per webhook notification
const WEBHOOK_MAX_RETRIES: u32 = 3;

/// One triggered alert ready for delivery
#[derive(Debug, Clone, Serialize)]
pub struct AlertNotification {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub entity_scope: String,
    pub metric: String,
    pub current_value: f64,
    pub threshold: f64,
    pub message: String,
    pub recovery_suggestion: String,
    pub triggered_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid webhook URL: must be HTTPS and <= {MAX_WEBHOOK_URL_LEN} characters")]
    InvalidWebhookUrl,
    #[error("webhook delivery failed after {attempts} attempts: {reason}")]
    WebhookFailed { attempts: u32, reason: String },
    #[error("unknown notification channel '{0}'")]
    UnknownChannel(String),
    #[error("mail delivery failed: {0}")]
    Mail(String),
}

/// Outbound mail port; the default implementation only logs
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: Option<&str>, subject: &str, body: &str)
    -> Result<(), NotifyError>;
}

/// Default mailer, writes the message to the structured log
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        recipient: Option<&str>,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        info!(
            recipient = recipient.unwrap_or("operations"),
            subject, body, "alert email"
        );
        Ok(())
    }
}

/// Seam the alert engine dispatches through
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn dispatch(
        &self,
        channel: &str,
        notification: &AlertNotification,
    ) -> Result<(), NotifyError>;
}

/// Production dispatcher covering dashboard, webhook, and email channels
pub struct Dispatcher {
    http: Client,
    webhook_secret: Option<String>,
    mailer: Arc<dyn Mailer>,
}

impl Dispatcher {
    pub fn new(config: &AlertConfig, mailer: Arc<dyn Mailer>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.webhook_timeout_seconds))
            .build()
            .unwrap_or_default();

        Self {
            http,
            webhook_secret: config.webhook_secret.clone(),
            mailer,
        }
    }

    /// Must be HTTPS and of reasonable length
    fn validate_webhook_url(url: &str) -> bool {
        if url.len() > MAX_WEBHOOK_URL_LEN {
            warn!(
                target_len = url.len(),
                "webhook URL exceeds maximum length"
            );
            return false;
        }
        if !url.to_lowercase().starts_with("https://") {
            warn!(target = redacted_target(url), "rejected non-HTTPS webhook URL");
            return false;
        }
        true
    }

    fn sign_payload(&self, payload: &[u8]) -> Option<String> {
        let secret = self.webhook_secret.as_ref()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(payload);
        Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }

    async fn send_webhook(
        &self,
        url: &str,
        notification: &AlertNotification,
    ) -> Result<(), NotifyError> {
        if !Self::validate_webhook_url(url) {
            return Err(NotifyError::InvalidWebhookUrl);
        }

        let payload = serde_json::to_vec(notification)
            .map_err(|e| NotifyError::WebhookFailed {
                attempts: 0,
                reason: format!("payload serialization failed: {e}"),
            })?;
        let signature = self.sign_payload(&payload);

        let mut delay = Duration::from_secs(1);
        let mut last_reason = String::new();

        for attempt in 1..=WEBHOOK_MAX_RETRIES {
            let mut request = self
                .http
                .post(url)
                .header("content-type", "application/json")
                .body(payload.clone());
            if let Some(sig) = &signature {
                request = request.header("x-beachsync-signature", sig);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!(
                        rule = %notification.rule_name,
                        target = redacted_target(url),
                        attempt,
                        "alert webhook delivered"
                    );
                    counter!("alert_webhooks_delivered_total").increment(1);
                    return Ok(());
                }
                Ok(response) => {
                    last_reason = format!("status {}", response.status());
                    warn!(
                        rule = %notification.rule_name,
                        target = redacted_target(url),
                        attempt,
                        status = %response.status(),
                        "alert webhook rejected"
                    );
                }
                Err(e) => {
                    last_reason = e.to_string();
                    warn!(
                        rule = %notification.rule_name,
                        target = redacted_target(url),
                        attempt,
                        error = %e,
                        "alert webhook send failed"
                    );
                }
            }

            if attempt < WEBHOOK_MAX_RETRIES {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        counter!("alert_webhooks_failed_total").increment(1);
        Err(NotifyError::WebhookFailed {
            attempts: WEBHOOK_MAX_RETRIES,
            reason: last_reason,
        })
    }

    fn deliver_dashboard(&self, notification: &AlertNotification) {
        info!(
            rule = %notification.rule_name,
            metric = %notification.metric,
            entity_scope = %notification.entity_scope,
            current_value = notification.current_value,
            threshold = notification.threshold,
            message = %notification.message,
            recovery = %notification.recovery_suggestion,
            "ALERT"
        );
        counter!("alert_dashboard_writes_total").increment(1);
    }

    async fn send_email(
        &self,
        recipient: Option<&str>,
        notification: &AlertNotification,
    ) -> Result<(), NotifyError> {
        let subject = format!(
            "[beachsync] {} alert: {}",
            notification.metric, notification.rule_name
        );
        let body = format!(
            "{}\n\nMetric: {} ({})\nCurrent value: {:.2}\nThreshold: {:.2}\nTriggered at: {}\n\nSuggested recovery: {}",
            notification.message,
            notification.metric,
            notification.entity_scope,
            notification.current_value,
            notification.threshold,
            notification.triggered_at.to_rfc3339(),
            notification.recovery_suggestion,
        );
        self.mailer.send(recipient, &subject, &body).await
    }
}

#[async_trait]
impl NotificationSink for Dispatcher {
    async fn dispatch(
        &self,
        channel: &str,
        notification: &AlertNotification,
    ) -> Result<(), NotifyError> {
        if channel == "dashboard" {
            self.deliver_dashboard(notification);
            return Ok(());
        }
        if let Some(url) = channel.strip_prefix("webhook:") {
            return self.send_webhook(url, notification).await;
        }
        if channel == "email" {
            return self.send_email(None, notification).await;
        }
        if let Some(recipient) = channel.strip_prefix("email:") {
            return self.send_email(Some(recipient), notification).await;
        }
        Err(NotifyError::UnknownChannel(channel.to_string()))
    }
}

fn redacted_target(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|parsed| {
            format!(
                "{}://{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or("unknown")
            )
        })
        .unwrap_or_else(|| "[invalid-url]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> AlertNotification {
        AlertNotification {
            rule_id: Uuid::new_v4(),
            rule_name: "tournament health".to_string(),
            entity_scope: "tournaments".to_string(),
            metric: "success_rate".to_string(),
            current_value: 0.4,
            threshold: 0.8,
            message: "success rate 40.0% is below the 80.0% threshold".to_string(),
            recovery_suggestion: "check the error log".to_string(),
            triggered_at: Utc::now(),
        }
    }

    fn dispatcher(secret: Option<&str>) -> Dispatcher {
        Dispatcher::new(
            &AlertConfig {
                enabled: true,
                webhook_secret: secret.map(str::to_string),
                webhook_timeout_seconds: 1,
            },
            Arc::new(LogMailer),
        )
    }

    #[test]
    fn non_https_and_oversized_urls_are_rejected() {
        assert!(!Dispatcher::validate_webhook_url("http://example.com/hook"));
        let oversized = format!("https://example.com/{}", "a".repeat(MAX_WEBHOOK_URL_LEN));
        assert!(!Dispatcher::validate_webhook_url(&oversized));
        assert!(Dispatcher::validate_webhook_url("https://example.com/hook"));
    }

    #[test]
    fn signature_is_stable_for_same_payload_and_secret() {
        let d = dispatcher(Some("topsecret"));
        let a = d.sign_payload(b"{\"x\":1}").unwrap();
        let b = d.sign_payload(b"{\"x\":1}").unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("sha256="));

        let other = dispatcher(Some("different"));
        assert_ne!(other.sign_payload(b"{\"x\":1}").unwrap(), a);
    }

    #[test]
    fn missing_secret_means_unsigned_delivery() {
        let d = dispatcher(None);
        assert!(d.sign_payload(b"{}").is_none());
    }

    #[tokio::test]
    async fn unknown_channel_is_an_error() {
        let d = dispatcher(None);
        let err = d.dispatch("pager", &notification()).await.unwrap_err();
        assert!(matches!(err, NotifyError::UnknownChannel(_)));
    }

    #[tokio::test]
    async fn dashboard_and_email_channels_always_succeed() {
        let d = dispatcher(None);
        d.dispatch("dashboard", &notification()).await.unwrap();
        d.dispatch("email", &notification()).await.unwrap();
        d.dispatch("email:ops@example.com", &notification())
            .await
            .unwrap();
    }
}
