//! Slack Error Notifier - forwards uncaught request and scheduled-job failures
//! to a Slack incoming webhook.
//!
//! [`ErrorAlerts`] is the entry point: build it once from a
//! [`NotificationConfig`], then route request handlers through
//! [`ErrorAlerts::interceptor`] and call [`ErrorAlerts::install_job_handlers`]
//! once every scheduled job is registered. Delivery is best effort: a
//! notification that cannot be sent is logged and never changes what the
//! HTTP caller or the job runner sees.

pub mod alerts;
pub mod cli;
pub mod config;
pub mod error;
pub mod intercept;
pub mod notify;
pub mod schedule;

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::{Cli, Commands, MessageArgs};
use crate::notify::CapturedError;

pub use alerts::ErrorAlerts;
pub use config::{NotificationConfig, OptionsFactory, OptionsSource};
pub use error::{HttpException, RequestError};
pub use intercept::ErrorInterceptor;
pub use notify::{ErrorNotifier, SlackNotifier};
pub use schedule::{install_job_error_handlers, register_notified_job, MemoryJobRegistry};

/// Runs the CLI with the provided arguments.
pub async fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.log_level())?;

    match cli.command {
        Commands::ConfigValidate => validate_config(&cli.config),
        Commands::ConfigShow => show_config(&cli.config),
        Commands::SendTest(args) => send_test(&cli.config, args).await,
        Commands::SendTestError(args) => send_test_error(&cli.config, args).await,
    }
}

/// Initializes the tracing subscriber for structured logging.
fn setup_logging(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Validates the configuration file and reports any issues.
fn validate_config(config_path: &Path) -> Result<()> {
    let config = config::loader::load_and_validate(config_path)?;

    println!("Configuration is valid.");
    println!("  webhook: {}", mask_webhook(&config.webhook_url));
    println!("  channel: {}", config.channel().unwrap_or("(webhook default)"));
    println!("  service: {}", config.service_name().unwrap_or("(none)"));

    Ok(())
}

/// Displays the parsed configuration.
fn show_config(config_path: &Path) -> Result<()> {
    let mut config = config::loader::load_and_validate(config_path)?;
    config.webhook_url = mask_webhook(&config.webhook_url);

    let yaml = serde_yaml::to_string(&config::model::FileConfig { slack: config })?;
    println!("{}", yaml);
    Ok(())
}

/// Sends a plain test message.
async fn send_test(config_path: &Path, args: MessageArgs) -> Result<()> {
    let alerts = load_alerts(config_path).await?;

    if !alerts.slack().send_message(&args.message, Vec::new()).await {
        anyhow::bail!("Slack rejected or did not receive the test message");
    }
    println!("Test message sent.");
    Ok(())
}

/// Sends a sample error report without request context.
async fn send_test_error(config_path: &Path, args: MessageArgs) -> Result<()> {
    let alerts = load_alerts(config_path).await?;
    let error = CapturedError::new("TestError", args.message)
        .with_stack("TestError: raised by slack-notify send-test-error");

    if !alerts.slack().send_error_notification(&error, None).await {
        anyhow::bail!("Slack rejected or did not receive the test error report");
    }
    println!("Test error report sent.");
    Ok(())
}

async fn load_alerts(config_path: &Path) -> Result<ErrorAlerts> {
    let config = config::loader::load_and_validate(config_path)?;
    ErrorAlerts::for_root(config)
        .await
        .context("Failed to initialize Slack notifications")
}

/// Keeps scheme, host and the first path segment; hides the rest.
fn mask_webhook(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => {
            let first = parsed
                .path_segments()
                .and_then(|mut segments| segments.next())
                .unwrap_or("");
            format!(
                "{}://{}/{}/***",
                parsed.scheme(),
                parsed.host_str().unwrap_or(""),
                first
            )
        }
        Err(_) => "***".to_string(),
    }
}
