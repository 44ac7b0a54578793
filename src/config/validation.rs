//! Validation of Slack notification settings.

use std::fmt;

use regex::Regex;
use reqwest::Url;

use super::model::NotificationConfig;

const EMOJI_PATTERN: &str = r"^:[a-z0-9_+\-']+:$";

/// How much a finding matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Startup is refused.
    Error,
    /// Logged; startup continues.
    Warning,
}

impl ValidationSeverity {
    fn label(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
        }
    }
}

/// A problem with one settings field, e.g. `slack.webhook_url`.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub path: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    fn new(severity: ValidationSeverity, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Error, path, message)
    }

    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Warning, path, message)
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity.label(), self.path, self.message)?;
        match &self.suggestion {
            Some(suggestion) => write!(f, " ({})", suggestion),
            None => Ok(()),
        }
    }
}

/// Findings collected from the settings checks.
#[derive(Debug, Default)]
pub struct ValidationResult {
    issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, other: ValidationResult) {
        self.issues.extend(other.issues);
    }

    /// True when nothing blocks startup.
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.of(ValidationSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.of(ValidationSeverity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    fn of(&self, severity: ValidationSeverity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }
}

/// Checks a notification config. `prefix` is prepended to issue paths.
pub fn validate(config: &NotificationConfig, prefix: &str) -> ValidationResult {
    let mut result = ValidationResult::default();
    let field = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", prefix, name)
        }
    };

    let webhook = config.webhook_url.trim();
    if webhook.is_empty() {
        result.add(
            ValidationIssue::error(field("webhook_url"), "Webhook URL is required")
                .with_suggestion("Set it to the incoming webhook URL from your Slack app"),
        );
    } else {
        match Url::parse(webhook) {
            Ok(url) => match url.scheme() {
                "https" => {}
                "http" => result.add(ValidationIssue::warning(
                    field("webhook_url"),
                    "Webhook URL uses plain http; messages will be sent unencrypted",
                )),
                other => result.add(ValidationIssue::error(
                    field("webhook_url"),
                    format!("Unsupported URL scheme '{}'", other),
                )),
            },
            Err(e) => result.add(ValidationIssue::error(
                field("webhook_url"),
                format!("Webhook URL is not a valid URL: {}", e),
            )),
        }
    }

    if let Some(icon) = config.icon_emoji() {
        let well_formed = Regex::new(EMOJI_PATTERN)
            .map(|re| re.is_match(icon))
            .unwrap_or(true);
        if !well_formed {
            result.add(
                ValidationIssue::warning(
                    field("icon_emoji"),
                    format!("'{}' does not look like a Slack emoji code", icon),
                )
                .with_suggestion(format!(
                    "Did you mean ':{}:'?",
                    icon.trim_matches(':').to_lowercase()
                )),
            );
        }
    }

    for (name, value) in [
        ("channel", &config.channel),
        ("username", &config.username),
        ("icon_emoji", &config.icon_emoji),
        ("service_name", &config.service_name),
    ] {
        if matches!(value, Some(v) if v.trim().is_empty()) {
            result.add(ValidationIssue::warning(
                field(name),
                "Value is blank and will be ignored",
            ));
        }
    }

    result
}

/// One line per finding, errors first, then a count line.
pub fn format_report(result: &ValidationResult) -> String {
    let mut lines: Vec<String> = result
        .errors()
        .chain(result.warnings())
        .map(ToString::to_string)
        .collect();
    if lines.is_empty() {
        return "Slack settings are valid.".to_string();
    }

    lines.push(format!(
        "{} error(s), {} warning(s)",
        result.error_count(),
        result.warnings().count()
    ));
    lines.join("\n")
}
