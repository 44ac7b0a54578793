//! End-to-end: real HTTP server, real webhook POSTs to a local fake Slack.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use tokio::net::TcpListener;

use slack_error_notifier::intercept::{serve, ErrorResponseBody, HandlerResponse};
use slack_error_notifier::{ErrorAlerts, HttpException, NotificationConfig, RequestError};

type Received = Arc<Mutex<Vec<Value>>>;

/// Starts a webhook receiver that records JSON bodies. `/hook` answers 200, anything else 500.
async fn fake_slack() -> (SocketAddr, Received) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received: Received = Arc::default();
    let sink = Arc::clone(&received);

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let sink = Arc::clone(&sink);
                    async move {
                        let ok = req.uri().path() == "/hook";
                        let bytes = req.into_body().collect().await.unwrap().to_bytes();
                        sink.lock().unwrap().push(serde_json::from_slice(&bytes).unwrap());
                        let status = if ok { StatusCode::OK } else { StatusCode::INTERNAL_SERVER_ERROR };
                        let mut response = Response::new(Full::new(Bytes::from_static(b"ok")));
                        *response.status_mut() = status;
                        Ok::<_, Infallible>(response)
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (addr, received)
}

async fn route(req: Request<Incoming>) -> Result<HandlerResponse, RequestError> {
    match req.uri().path() {
        "/ok" => Ok(Response::new(Full::new(Bytes::from_static(b"fine")))),
        "/missing" => Err(HttpException::not_found("no such order").into()),
        "/boom" => Err(anyhow::anyhow!("boom").into()),
        _ => Err(HttpException::bad_request("unknown route").into()),
    }
}

async fn start_app(webhook: String) -> SocketAddr {
    let alerts = ErrorAlerts::for_root(NotificationConfig::new(webhook).with_channel("#alerts"))
        .await
        .unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, Arc::new(alerts.interceptor()), route));
    addr
}

#[tokio::test]
async fn server_errors_are_posted_and_client_errors_are_not() {
    let (slack, received) = fake_slack().await;
    let app = start_app(format!("http://{}/hook", slack)).await;
    let client = reqwest::Client::new();

    let ok = client.get(format!("http://{}/ok", app)).send().await.unwrap();
    assert_eq!(ok.status().as_u16(), 200);

    let missing = client.get(format!("http://{}/missing", app)).send().await.unwrap();
    assert_eq!(missing.status().as_u16(), 404);
    let body: ErrorResponseBody = missing.json().await.unwrap();
    assert_eq!(body.status_code, 404);
    assert_eq!(body.path, "/missing");
    assert!(received.lock().unwrap().is_empty());

    let boom = client.get(format!("http://{}/boom?id=42", app)).send().await.unwrap();
    assert_eq!(boom.status().as_u16(), 500);
    let body: ErrorResponseBody = boom.json().await.unwrap();
    assert_eq!(body.status_code, 500);
    assert_eq!(body.path, "/boom?id=42");

    let posts = received.lock().unwrap();
    assert_eq!(posts.len(), 1);
    let post = &posts[0];
    assert_eq!(post["text"], "Application Error Occurred");
    assert_eq!(post["channel"], "#alerts");
    assert!(post.get("username").is_none());
    assert_eq!(post["attachments"][0]["title"], "Error boom");
    assert_eq!(post["attachments"][1]["fields"][0]["value"], "GET");
    assert_eq!(post["attachments"][1]["fields"][1]["value"], "/boom?id=42");
    assert_eq!(post["attachments"][1]["fields"][2]["value"], "127.0.0.1");
}

#[tokio::test]
async fn rejected_webhook_does_not_change_the_reply() {
    let (slack, received) = fake_slack().await;
    let app = start_app(format!("http://{}/broken", slack)).await;

    let response = reqwest::get(format!("http://{}/boom", app)).await.unwrap();

    assert_eq!(response.status().as_u16(), 500);
    let body: ErrorResponseBody = response.json().await.unwrap();
    assert_eq!(body.status_code, 500);
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn send_message_reports_delivery() {
    let (slack, _) = fake_slack().await;

    let good = ErrorAlerts::for_root(NotificationConfig::new(format!("http://{}/hook", slack)))
        .await
        .unwrap();
    assert!(good.slack().send_message("hello", Vec::new()).await);

    let bad = ErrorAlerts::for_root(NotificationConfig::new(format!("http://{}/nope", slack)))
        .await
        .unwrap();
    assert!(!bad.slack().send_message("hello", Vec::new()).await);
}
