//! Error types for the Slack error notifier.

use std::path::PathBuf;

use hyper::StatusCode;
use thiserror::Error;

/// Configuration loading and resolution errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {message}")]
    ParseFailed { path: PathBuf, message: String },

    #[error("Config validation failed with {error_count} error(s)")]
    ValidationFailed { error_count: usize },

    #[error("Options provider failed: {0}")]
    ProviderFailed(String),
}

/// Notification sending errors.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Slack webhook failed: {0}")]
    WebhookFailed(String),

    #[error("Prometheus metrics export failed: {0}")]
    PrometheusFailed(String),

    #[error("HTTP request failed: {0}")]
    HttpFailed(#[from] reqwest::Error),
}

/// Scheduled job registry and runner errors.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid schedule '{expression}': {message}")]
    InvalidSchedule { expression: String, message: String },

    #[error("A job named '{name}' is already registered")]
    DuplicateJob { name: String },

    #[error("No job named '{name}' is registered")]
    JobNotFound { name: String },

    #[error("Job registry unavailable: {0}")]
    RegistryUnavailable(String),
}

/// An error with an explicit HTTP status, raised by request handlers.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct HttpException {
    status: StatusCode,
    message: String,
}

impl HttpException {
    /// Creates an exception with the given status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Returns the status carried by this exception.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors escaping a request handler.
#[derive(Error, Debug)]
pub enum RequestError {
    /// A failure with an explicit status.
    #[error(transparent)]
    Http(#[from] HttpException),

    /// Anything else; always treated as a server fault.
    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl RequestError {
    /// Returns the status to reply with: the explicit one if present, 500 otherwise.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Http(e) => e.status(),
            Self::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
