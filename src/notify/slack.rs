//! Slack webhook notifications.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error};

use super::metrics::Metrics;
use super::payload::{Attachment, CapturedError, ErrorContext, NotificationPayload};
use super::ErrorNotifier;
use crate::config::NotificationConfig;
use crate::error::NotificationError;

/// Delivers a payload to a webhook URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        payload: &NotificationPayload,
    ) -> Result<(), NotificationError>;
}

/// Posts payloads with a shared `reqwest` client using its default timeouts.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        payload: &NotificationPayload,
    ) -> Result<(), NotificationError> {
        let response = self.client.post(url).json(payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(NotificationError::WebhookFailed(format!(
                "HTTP {}: {}",
                status, text
            )));
        }

        Ok(())
    }
}

/// Sends messages and error reports to a Slack incoming webhook.
///
/// Every send is a single best-effort POST: failures are logged and reported
/// as `false`, never returned as errors and never retried.
#[derive(Clone)]
pub struct SlackNotifier {
    config: Arc<NotificationConfig>,
    transport: Arc<dyn WebhookTransport>,
    metrics: Option<Arc<Metrics>>,
}

impl SlackNotifier {
    /// Creates a notifier that posts over HTTP.
    pub fn new(config: Arc<NotificationConfig>) -> Self {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()))
    }

    /// Creates a notifier over a custom transport.
    pub fn with_transport(
        config: Arc<NotificationConfig>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Self {
        Self {
            config,
            transport,
            metrics: None,
        }
    }

    /// Records delivery outcomes into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Sends a plain message with optional attachments.
    pub async fn send_message(&self, text: &str, attachments: Vec<Attachment>) -> bool {
        let payload = NotificationPayload::new(&self.config, text, attachments);
        self.deliver(&payload).await
    }

    /// Formats an error report and sends it.
    pub async fn send_error_notification(
        &self,
        error: &CapturedError,
        context: Option<&ErrorContext>,
    ) -> bool {
        let payload = NotificationPayload::for_error(&self.config, error, context, Utc::now());
        self.deliver(&payload).await
    }

    async fn deliver(&self, payload: &NotificationPayload) -> bool {
        let result = self
            .transport
            .post_json(&self.config.webhook_url, payload)
            .await;

        if let Some(metrics) = &self.metrics {
            metrics.record_delivery(result.is_ok());
        }

        match result {
            Ok(()) => {
                debug!("Slack notification sent");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to send Slack notification");
                false
            }
        }
    }
}

#[async_trait]
impl ErrorNotifier for SlackNotifier {
    async fn send_error_notification(
        &self,
        error: &CapturedError,
        context: Option<&ErrorContext>,
    ) -> bool {
        SlackNotifier::send_error_notification(self, error, context).await
    }
}
