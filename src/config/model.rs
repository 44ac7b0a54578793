//! Configuration data structures.

use serde::{Deserialize, Serialize};

/// Root structure of the YAML configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    /// Slack webhook settings.
    pub slack: NotificationConfig,
}

/// Slack webhook settings shared by every sender.
///
/// Built once at startup and never mutated afterwards. Only `webhook_url` is
/// required; blank optional fields are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Incoming webhook URL.
    #[serde(alias = "webhookUrl")]
    pub webhook_url: String,

    /// Channel override (e.g. "#alerts").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Display username override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Icon override (e.g. ":rotating_light:").
    #[serde(default, alias = "iconEmoji", skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,

    /// Service tag prefixed to message titles.
    #[serde(default, alias = "serviceName", skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

/// Keys accepted under `slack:` in the configuration file.
pub const KNOWN_KEYS: &[&str] = &[
    "webhook_url",
    "webhookUrl",
    "channel",
    "username",
    "icon_emoji",
    "iconEmoji",
    "service_name",
    "serviceName",
];

impl NotificationConfig {
    /// Creates a config with only the webhook URL set.
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            channel: None,
            username: None,
            icon_emoji: None,
            service_name: None,
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_icon_emoji(mut self, icon_emoji: impl Into<String>) -> Self {
        self.icon_emoji = Some(icon_emoji.into());
        self
    }

    pub fn with_service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Channel override, if set and non-blank.
    pub fn channel(&self) -> Option<&str> {
        non_blank(&self.channel)
    }

    /// Username override, if set and non-blank.
    pub fn username(&self) -> Option<&str> {
        non_blank(&self.username)
    }

    /// Icon override, if set and non-blank.
    pub fn icon_emoji(&self) -> Option<&str> {
        non_blank(&self.icon_emoji)
    }

    /// Service tag, if set and non-blank.
    pub fn service_name(&self) -> Option<&str> {
        non_blank(&self.service_name)
    }

    /// Returns `"[service] "` when a service tag is configured, otherwise an empty string.
    pub fn title_prefix(&self) -> String {
        self.service_name()
            .map(|name| format!("[{}] ", name))
            .unwrap_or_default()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
