//! Entry point that wires the notifier, request interceptor and job wrapper.

use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::config::{NotificationConfig, OptionsSource};
use crate::error::{ConfigError, SchedulerError};
use crate::intercept::ErrorInterceptor;
use crate::notify::{ErrorNotifier, Metrics, ReqwestTransport, SlackNotifier, WebhookTransport};
use crate::schedule::{JobErrorHandler, JobRegistry, MemoryJobRegistry};

/// Slack error reporting for one application.
///
/// Construct it once at startup with [`ErrorAlerts::for_root`] or
/// [`ErrorAlerts::for_root_async`]; construction fails if the settings are
/// unusable. The settings are immutable afterwards.
#[derive(Clone)]
pub struct ErrorAlerts {
    config: Arc<NotificationConfig>,
    slack: Arc<SlackNotifier>,
    metrics: Option<Arc<Metrics>>,
}

impl ErrorAlerts {
    /// Initializes from settings supplied directly.
    pub async fn for_root(config: NotificationConfig) -> Result<Self, ConfigError> {
        Self::for_root_async(OptionsSource::Value(config)).await
    }

    /// Initializes from any [`OptionsSource`], posting over HTTP.
    pub async fn for_root_async(source: OptionsSource) -> Result<Self, ConfigError> {
        Self::for_root_with_transport(source, Arc::new(ReqwestTransport::new())).await
    }

    /// Initializes with a custom webhook transport.
    pub async fn for_root_with_transport(
        source: OptionsSource,
        transport: Arc<dyn WebhookTransport>,
    ) -> Result<Self, ConfigError> {
        let config = Arc::new(source.resolve().await?);
        let slack = Arc::new(SlackNotifier::with_transport(Arc::clone(&config), transport));

        info!(
            channel = ?config.channel(),
            service = ?config.service_name(),
            "Slack error notifications enabled"
        );

        Ok(Self {
            config,
            slack,
            metrics: None,
        })
    }

    /// Records captures and delivery outcomes into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.slack = Arc::new((*self.slack).clone().with_metrics(Arc::clone(&metrics)));
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// The Slack sender, for application code that posts its own messages.
    pub fn slack(&self) -> Arc<SlackNotifier> {
        Arc::clone(&self.slack)
    }

    pub fn notifier(&self) -> Arc<dyn ErrorNotifier> {
        self.slack.clone()
    }

    /// Catch-all handler for request failures.
    pub fn interceptor(&self) -> ErrorInterceptor {
        let interceptor = ErrorInterceptor::new(self.notifier());
        match &self.metrics {
            Some(metrics) => interceptor.with_metrics(Arc::clone(metrics)),
            None => interceptor,
        }
    }

    /// Wrapper that reports scheduled job failures.
    pub fn job_error_handler(&self) -> JobErrorHandler {
        let handler = JobErrorHandler::new(Some(self.notifier()));
        match &self.metrics {
            Some(metrics) => handler.with_metrics(Arc::clone(metrics)),
            None => handler,
        }
    }

    /// Wraps every job currently in `registry`.
    ///
    /// Call this once all jobs are registered. Jobs added later need another
    /// call or [`ErrorAlerts::register_job`].
    pub fn install_job_handlers(&self, registry: &dyn JobRegistry) -> usize {
        self.job_error_handler().install(registry)
    }

    /// Registers a job with failure reporting already applied.
    pub fn register_job<F, Fut>(
        &self,
        registry: &MemoryJobRegistry,
        name: &str,
        expression: &str,
        job: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.job_error_handler()
            .register(registry, name, expression, job)
    }
}
