//! Command-line interface definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Checks Slack error-notification settings and sends test messages.
#[derive(Parser, Debug)]
#[command(name = "slack-notify", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "slack.yaml", env = "SLACK_NOTIFY_CONFIG", global = true)]
    pub config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Returns the log level based on verbosity flags.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration file.
    #[command(name = "config-validate")]
    ConfigValidate,

    /// Display the parsed configuration with the webhook secret masked.
    #[command(name = "config-show")]
    ConfigShow,

    /// Post a plain test message to the webhook.
    #[command(name = "send-test")]
    SendTest(MessageArgs),

    /// Post a sample error report to the webhook.
    #[command(name = "send-test-error")]
    SendTestError(MessageArgs),
}

/// Arguments for the test-message subcommands.
#[derive(Args, Debug)]
pub struct MessageArgs {
    /// Text of the message (or error message for error reports).
    #[arg(short, long, default_value = "Test notification from slack-notify")]
    pub message: String,
}
