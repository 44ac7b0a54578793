//! Catch-all error handling for inbound requests.
//!
//! Every failure escaping a handler is turned into a uniform JSON reply. Server
//! faults (status >= 500, unclassified errors, panics) are reported to Slack
//! before replying; client errors are answered without a notification.

pub mod server;

use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use futures::FutureExt;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::RequestError;
use crate::notify::{CapturedError, ErrorContext, ErrorNotifier, Metrics, TransportKind};

pub use server::{serve, serve_metrics};

/// Response type produced by intercepted handlers.
pub type HandlerResponse = Response<Full<Bytes>>;

/// Peer address of the connection a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub SocketAddr);

/// The parts of a request that go into an error report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub method: String,
    /// Path and query as received.
    pub path: String,
    pub caller: Option<String>,
}

impl RequestInfo {
    /// Extracts method, URL and caller address from a request.
    ///
    /// The caller is the connection's peer address when known, otherwise the
    /// first `X-Forwarded-For` entry.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());

        let caller = request
            .extensions()
            .get::<ClientAddr>()
            .map(|addr| addr.0.ip().to_string())
            .or_else(|| {
                request
                    .headers()
                    .get("x-forwarded-for")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.split(',').next())
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            });

        Self {
            method: request.method().to_string(),
            path,
            caller,
        }
    }

    fn to_context(&self) -> ErrorContext {
        ErrorContext::http(self.method.clone(), self.path.clone(), self.caller.clone())
    }
}

/// JSON body returned for every intercepted failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponseBody {
    pub status_code: u16,
    /// ISO-8601 time the error was caught.
    pub timestamp: String,
    pub path: String,
}

impl ErrorResponseBody {
    fn new(status: StatusCode, path: &str) -> Self {
        Self {
            status_code: status.as_u16(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            path: path.to_string(),
        }
    }

    /// Renders the body as a JSON response carrying the same status.
    pub fn into_response(self) -> HandlerResponse {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let json = serde_json::to_vec(&self).unwrap_or_default();

        let mut response = Response::new(Full::new(Bytes::from(json)));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

/// Applies the severity policy to handler failures and builds the reply.
#[derive(Clone)]
pub struct ErrorInterceptor {
    notifier: Arc<dyn ErrorNotifier>,
    metrics: Option<Arc<Metrics>>,
}

impl ErrorInterceptor {
    pub fn new(notifier: Arc<dyn ErrorNotifier>) -> Self {
        Self {
            notifier,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs `handler`, converting any error or panic into an error reply.
    pub async fn handle<B, F, Fut>(&self, request: Request<B>, handler: F) -> HandlerResponse
    where
        F: FnOnce(Request<B>) -> Fut,
        Fut: Future<Output = Result<HandlerResponse, RequestError>>,
    {
        let info = RequestInfo::from_request(&request);

        match AssertUnwindSafe(handler(request)).catch_unwind().await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => self.catch(&e, &info).await.into_response(),
            Err(panic) => self
                .catch_panic(CapturedError::from_panic(panic), &info)
                .await
                .into_response(),
        }
    }

    /// Builds the reply body for `error`, notifying first when it is a server fault.
    ///
    /// The reply never depends on whether the notification was delivered.
    pub async fn catch(&self, error: &RequestError, request: &RequestInfo) -> ErrorResponseBody {
        let status = error.status();
        let body = ErrorResponseBody::new(status, &request.path);

        if status.as_u16() < 500 {
            if let Some(metrics) = &self.metrics {
                metrics.record_suppressed();
            }
            return body;
        }

        let captured = match error {
            RequestError::Http(e) => CapturedError::from_error(e),
            RequestError::Unknown(e) => CapturedError::from_anyhow(e),
        };
        error!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            error = %captured,
            "Request failed"
        );
        self.report(&captured, request).await;

        body
    }

    /// Builds the reply for a handler panic. Panics are always reported.
    pub async fn catch_panic(
        &self,
        captured: CapturedError,
        request: &RequestInfo,
    ) -> ErrorResponseBody {
        let body = ErrorResponseBody::new(StatusCode::INTERNAL_SERVER_ERROR, &request.path);
        error!(
            method = %request.method,
            path = %request.path,
            error = %captured,
            "Request handler panicked"
        );
        self.report(&captured, request).await;
        body
    }

    async fn report(&self, captured: &CapturedError, request: &RequestInfo) {
        if let Some(metrics) = &self.metrics {
            metrics.record_captured(TransportKind::Http);
        }

        let context = request.to_context();
        let delivered = AssertUnwindSafe(
            self.notifier
                .send_error_notification(captured, Some(&context)),
        )
        .catch_unwind()
        .await
        .unwrap_or(false);

        if !delivered {
            warn!(path = %request.path, "Slack notification for request failure was not delivered");
        }
    }
}
