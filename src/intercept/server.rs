//! HTTP/1 server loop that routes every request through an [`ErrorInterceptor`].

use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use super::{ClientAddr, ErrorInterceptor, HandlerResponse};
use crate::error::RequestError;
use crate::notify::Metrics;

/// Accepts connections on `listener` forever, serving each request with `handler`.
///
/// Handler errors and panics are answered by `interceptor`; the peer address is
/// attached to each request as a [`ClientAddr`] extension.
pub async fn serve<H, Fut>(
    listener: TcpListener,
    interceptor: Arc<ErrorInterceptor>,
    handler: H,
) -> std::io::Result<()>
where
    H: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerResponse, RequestError>> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "Serving HTTP with Slack error interception");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let interceptor = Arc::clone(&interceptor);
        let handler = handler.clone();

        tokio::spawn(async move {
            let service = service_fn(move |mut req: Request<Incoming>| {
                let interceptor = Arc::clone(&interceptor);
                let handler = handler.clone();
                req.extensions_mut().insert(ClientAddr(peer));
                async move { Ok::<_, Infallible>(interceptor.handle(req, handler).await) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(error = %e, "Error serving connection");
            }
        });
    }
}

/// Serves the notifier's counters in Prometheus text format at `/metrics`.
pub async fn serve_metrics(listener: TcpListener, metrics: Arc<Metrics>) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Serving Prometheus metrics");

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Failed to accept metrics connection");
                continue;
            }
        };

        let io = TokioIo::new(stream);
        let metrics = Arc::clone(&metrics);

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let response = metrics_response(&metrics, req.uri().path());
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(error = %e, "Error serving metrics connection");
            }
        });
    }
}

fn metrics_response(metrics: &Metrics, path: &str) -> HandlerResponse {
    let (status, body) = match path {
        "/metrics" => match metrics.gather() {
            Ok(text) => (StatusCode::OK, text),
            Err(e) => {
                error!(error = %e, "Failed to render metrics");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        },
        _ => (StatusCode::NOT_FOUND, "Not Found".to_string()),
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::TransportKind;

    #[tokio::test]
    async fn metrics_are_served_over_http() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.record_captured(TransportKind::Http);
        metrics.record_delivery(false);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve_metrics(listener, Arc::clone(&metrics)));

        let client = reqwest::Client::new();
        let text = client
            .get(format!("http://{}/metrics", addr))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(text.contains("slack_errors_captured_total{source=\"http\"} 1"));
        assert!(text.contains("slack_notifications_total{outcome=\"failed\"} 1"));

        let missing = client
            .get(format!("http://{}/", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
