//! Slack message payloads built from captured errors.

use std::any::Any;
use std::backtrace::BacktraceStatus;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::config::NotificationConfig;

/// Longest stack text sent in a single attachment.
const MAX_STACK_CHARS: usize = 3000;

const NO_STACK: &str = "No stack trace available";
const NOT_AVAILABLE: &str = "N/A";

/// Where an error was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    ScheduledJob,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::ScheduledJob => write!(f, "scheduled_job"),
        }
    }
}

/// Describes the origin of a single error occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub kind: TransportKind,
    /// HTTP method, or `CRON` for scheduled jobs.
    pub method: Option<String>,
    /// Request URL, or `cron-job:<name>` for scheduled jobs.
    pub source: Option<String>,
    /// Caller address, or `server` for scheduled jobs.
    pub caller: Option<String>,
}

impl ErrorContext {
    /// Context for a failed inbound request.
    pub fn http(
        method: impl Into<String>,
        url: impl Into<String>,
        caller: Option<String>,
    ) -> Self {
        Self {
            kind: TransportKind::Http,
            method: Some(method.into()),
            source: Some(url.into()),
            caller,
        }
    }

    /// Context for a failed scheduled job.
    pub fn scheduled_job(job_name: &str) -> Self {
        Self {
            kind: TransportKind::ScheduledJob,
            method: Some("CRON".to_string()),
            source: Some(format!("cron-job:{}", job_name)),
            caller: Some("server".to_string()),
        }
    }
}

/// An error reduced to the parts that get reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedError {
    /// Kind of error (e.g. "Error", "HttpException", "Panic").
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl CapturedError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Captures a typed error, naming it after its type.
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        let mut captured = Self::new(short_type_name::<E>(), error.to_string());
        let causes: Vec<String> = chain_after(error.source());
        if !causes.is_empty() {
            captured.stack = Some(format_stack(&captured.name, &captured.message, &causes, None));
        }
        captured
    }

    /// Captures an `anyhow::Error` with its cause chain and backtrace, if one was recorded.
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        let mut captured = Self::new("Error", error.to_string());
        let causes: Vec<String> = error.chain().skip(1).map(|c| c.to_string()).collect();
        let backtrace = error.backtrace();
        let backtrace = (backtrace.status() == BacktraceStatus::Captured)
            .then(|| backtrace.to_string());

        if !causes.is_empty() || backtrace.is_some() {
            captured.stack = Some(format_stack(
                &captured.name,
                &captured.message,
                &causes,
                backtrace.as_deref(),
            ));
        }
        captured
    }

    /// Captures a panic payload. String payloads become the message.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with a non-string payload".to_string()
        };
        Self::new("Panic", message)
    }

    /// Message text, substituting a placeholder for an empty one.
    pub fn display_message(&self) -> &str {
        if self.message.trim().is_empty() {
            "Unknown error"
        } else {
            &self.message
        }
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.display_message())
    }
}

/// Wire-level Slack webhook message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub text: String,
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
}

impl NotificationPayload {
    /// Builds a payload, copying only the non-blank overrides from `config`.
    pub fn new(config: &NotificationConfig, text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            text: text.into(),
            attachments,
            channel: config.channel().map(str::to_string),
            username: config.username().map(str::to_string),
            icon_emoji: config.icon_emoji().map(str::to_string),
        }
    }

    /// Builds the error report for `error`, with a request block when `context` is given.
    pub fn for_error(
        config: &NotificationConfig,
        error: &CapturedError,
        context: Option<&ErrorContext>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let prefix = config.title_prefix();

        let mut attachments = vec![Attachment {
            color: Some("danger".to_string()),
            title: Some(format!("{}Error {}", prefix, error.display_message())),
            fields: vec![
                AttachmentField::short("Timestamp", timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
                AttachmentField::short("Error Type", error.name.clone()),
            ],
            text: Some(format!(
                "```{}```",
                truncate(error.stack.as_deref().unwrap_or(NO_STACK), MAX_STACK_CHARS)
            )),
        }];

        if let Some(context) = context {
            attachments.push(Attachment {
                color: None,
                title: Some("Request Info".to_string()),
                fields: vec![
                    AttachmentField::short("Method", or_not_available(&context.method)),
                    AttachmentField::short("URL", or_not_available(&context.source)),
                    AttachmentField::short("IP", or_not_available(&context.caller)),
                ],
                text: None,
            });
        }

        Self::new(
            config,
            format!("{}Application Error Occurred", prefix),
            attachments,
        )
    }
}

/// A block of a Slack message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attachment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<AttachmentField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Attachment {
    /// Looks up a field value by title.
    pub fn field(&self, title: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.title == title)
            .map(|f| f.value.as_str())
    }
}

/// A title/value pair inside an attachment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentField {
    pub title: String,
    pub value: String,
    pub short: bool,
}

impl AttachmentField {
    pub fn short(title: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            value: value.into(),
            short: true,
        }
    }
}

fn or_not_available(value: &Option<String>) -> String {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(NOT_AVAILABLE)
        .to_string()
}

fn chain_after(mut source: Option<&(dyn std::error::Error + 'static)>) -> Vec<String> {
    let mut causes = Vec::new();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    causes
}

fn format_stack(name: &str, message: &str, causes: &[String], backtrace: Option<&str>) -> String {
    let mut stack = format!("{}: {}", name, message);
    if !causes.is_empty() {
        stack.push_str("\n\nCaused by:");
        for (i, cause) in causes.iter().enumerate() {
            stack.push_str(&format!("\n    {}: {}", i, cause));
        }
    }
    if let Some(backtrace) = backtrace {
        stack.push_str("\n\nStack backtrace:\n");
        stack.push_str(backtrace);
    }
    stack
}

/// Last path segment of a type name, without generic arguments.
fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

/// Truncates a string to at most `max_chars` characters.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const WEBHOOK: &str = "https://hooks.example/T/B/C";

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
    }

    #[test]
    fn error_with_request_context() {
        let config = NotificationConfig::new(WEBHOOK);
        let error = CapturedError::from_anyhow(&anyhow::anyhow!("boom"));
        let context = ErrorContext::http("GET", "/orders/42", Some("10.0.0.5".to_string()));

        let payload = NotificationPayload::for_error(&config, &error, Some(&context), fixed_time());

        assert_eq!(payload.text, "Application Error Occurred");
        assert_eq!(payload.attachments.len(), 2);

        let summary = &payload.attachments[0];
        assert_eq!(summary.color.as_deref(), Some("danger"));
        assert!(summary.title.as_deref().unwrap().contains("boom"));
        assert_eq!(summary.field("Timestamp"), Some("2026-10-18T09:30:00.000Z"));
        assert_eq!(summary.field("Error Type"), Some("Error"));
        assert!(summary.text.as_deref().unwrap().starts_with("```"));

        let request = &payload.attachments[1];
        assert_eq!(request.title.as_deref(), Some("Request Info"));
        assert_eq!(request.field("Method"), Some("GET"));
        assert_eq!(request.field("URL"), Some("/orders/42"));
        assert_eq!(request.field("IP"), Some("10.0.0.5"));
    }

    #[test]
    fn no_context_means_no_request_block() {
        let config = NotificationConfig::new(WEBHOOK);
        let error = CapturedError::new("Error", "db down");

        let payload = NotificationPayload::for_error(&config, &error, None, fixed_time());

        assert_eq!(payload.attachments.len(), 1);
        assert_eq!(
            payload.attachments[0].text.as_deref(),
            Some("```No stack trace available```")
        );
    }

    #[test]
    fn service_name_prefixes_titles() {
        let config = NotificationConfig::new(WEBHOOK).with_service_name("billing");
        let error = CapturedError::new("Error", "boom");

        let payload = NotificationPayload::for_error(&config, &error, None, fixed_time());

        assert_eq!(payload.text, "[billing] Application Error Occurred");
        assert_eq!(payload.attachments[0].title.as_deref(), Some("[billing] Error boom"));
    }

    #[test]
    fn missing_context_fields_fall_back() {
        let config = NotificationConfig::new(WEBHOOK);
        let error = CapturedError::new("Error", "");
        let context = ErrorContext::http("POST", "/upload", None);

        let payload = NotificationPayload::for_error(&config, &error, Some(&context), fixed_time());

        assert_eq!(payload.attachments[0].title.as_deref(), Some("Error Unknown error"));
        assert_eq!(payload.attachments[1].field("IP"), Some("N/A"));
    }

    #[test]
    fn only_configured_overrides_are_serialized() {
        let config = NotificationConfig::new(WEBHOOK)
            .with_channel("#alerts")
            .with_username(" ");
        let payload = NotificationPayload::new(&config, "hello", Vec::new());

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["channel"], "#alerts");
        assert!(json.get("username").is_none());
        assert!(json.get("icon_emoji").is_none());
        assert_eq!(json["attachments"], serde_json::json!([]));
    }

    #[test]
    fn cause_chain_becomes_the_stack() {
        let error = anyhow::anyhow!("connection refused").context("failed to load orders");
        let captured = CapturedError::from_anyhow(&error);

        assert_eq!(captured.message, "failed to load orders");
        let stack = captured.stack.unwrap();
        assert!(stack.contains("Caused by:"));
        assert!(stack.contains("0: connection refused"));
    }

    #[test]
    fn typed_errors_are_named_after_their_type() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let captured = CapturedError::from_error(&io);
        assert_eq!(captured.name, "Error");
        assert_eq!(captured.message, "disk full");

        let parse = "x".parse::<u32>().unwrap_err();
        assert_eq!(CapturedError::from_error(&parse).name, "ParseIntError");
    }

    #[test]
    fn string_panics_keep_their_text() {
        let captured = CapturedError::from_panic(Box::new("queue exploded"));
        assert_eq!(captured.name, "Panic");
        assert_eq!(captured.message, "queue exploded");

        let captured = CapturedError::from_panic(Box::new(String::from("owned text")));
        assert_eq!(captured.message, "owned text");
    }

    #[test]
    fn long_stacks_are_truncated_on_char_boundaries() {
        let stack = "é".repeat(MAX_STACK_CHARS + 10);
        let truncated = truncate(&stack, MAX_STACK_CHARS);
        assert_eq!(truncated.chars().count(), MAX_STACK_CHARS);
        assert!(truncated.ends_with("..."));
    }
}
