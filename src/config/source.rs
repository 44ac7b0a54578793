//! Ways of supplying the notification settings at startup.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{error, warn};

use super::model::NotificationConfig;
use super::validation::{format_report, validate};
use crate::error::ConfigError;

/// Produces notification settings, possibly asynchronously.
#[async_trait]
pub trait OptionsFactory: Send + Sync {
    async fn create_options(&self) -> anyhow::Result<NotificationConfig>;
}

type FactoryFn =
    Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<NotificationConfig>> + Send>;

/// Where the settings come from.
pub enum OptionsSource {
    /// Settings supplied directly.
    Value(NotificationConfig),
    /// An async factory function.
    Factory(FactoryFn),
    /// A factory object owned by the module.
    Class(Box<dyn OptionsFactory>),
    /// A factory object shared with the rest of the application.
    Existing(Arc<dyn OptionsFactory>),
}

impl OptionsSource {
    /// Wraps an async closure as a factory source.
    pub fn factory<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<NotificationConfig>> + Send + 'static,
    {
        Self::Factory(Box::new(move || -> BoxFuture<'static, anyhow::Result<NotificationConfig>> {
            Box::pin(f())
        }))
    }

    /// Resolves the source to validated settings.
    ///
    /// Any provider failure or validation error is a hard failure.
    pub async fn resolve(self) -> Result<NotificationConfig, ConfigError> {
        let config = match self {
            Self::Value(config) => config,
            Self::Factory(f) => f().await.map_err(provider_failed)?,
            Self::Class(factory) => factory.create_options().await.map_err(provider_failed)?,
            Self::Existing(factory) => factory.create_options().await.map_err(provider_failed)?,
        };

        let result = validate(&config, "");
        for issue in result.warnings() {
            warn!(path = %issue.path, message = %issue.message, "Slack options warning");
        }
        if !result.is_valid() {
            error!("{}", format_report(&result));
            return Err(ConfigError::ValidationFailed {
                error_count: result.error_count(),
            });
        }

        Ok(config)
    }
}

impl fmt::Debug for OptionsSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(config) => f.debug_tuple("Value").field(config).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
            Self::Class(_) => f.write_str("Class(..)"),
            Self::Existing(_) => f.write_str("Existing(..)"),
        }
    }
}

impl From<NotificationConfig> for OptionsSource {
    fn from(config: NotificationConfig) -> Self {
        Self::Value(config)
    }
}

fn provider_failed(e: anyhow::Error) -> ConfigError {
    ConfigError::ProviderFailed(format!("{:#}", e))
}
