//! Error capture payloads and Slack webhook delivery.

pub mod metrics;
pub mod payload;
pub mod slack;

use async_trait::async_trait;

pub use metrics::Metrics;
pub use payload::{CapturedError, ErrorContext, NotificationPayload, TransportKind};
pub use slack::{ReqwestTransport, SlackNotifier, WebhookTransport};

/// Something that can report a captured error.
///
/// Implementations never fail: delivery problems are logged and reported as `false`.
#[async_trait]
pub trait ErrorNotifier: Send + Sync {
    async fn send_error_notification(
        &self,
        error: &CapturedError,
        context: Option<&ErrorContext>,
    ) -> bool;
}
