//! Dispatcher round-trips against an ephemeral local endpoint.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;

use ledgerd_infra::webhook::config::WebhookConfig;
use ledgerd_infra::webhook::dispatcher::{Dispatcher, WebhookPayload};
use ledgerd_infra::webhook::signature;

#[derive(Clone)]
struct Capture {
    requests: Arc<Mutex<Vec<(HeaderMap, Bytes)>>>,
    status: StatusCode,
}

async fn hook(State(capture): State<Capture>, headers: HeaderMap, body: Bytes) -> (StatusCode, &'static str) {
    capture.requests.lock().unwrap().push((headers, body));
    (capture.status, "ack")
}

/// Bind an ephemeral endpoint that records every request and answers with
/// a fixed status.
async fn spawn_endpoint(status: StatusCode) -> (String, Capture) {
    let capture = Capture {
        requests: Arc::new(Mutex::new(Vec::new())),
        status,
    };
    let app = Router::new()
        .route("/hook", post(hook))
        .with_state(capture.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/hook"), capture)
}

fn config(url: &str) -> WebhookConfig {
    WebhookConfig {
        url: url.to_string(),
        secret: "0123456789abcdef0123456789abcdef".to_string(),
        events: vec!["transaction.posted".to_string()],
        enabled: true,
    }
}

fn payload() -> WebhookPayload {
    WebhookPayload {
        id: "evt_01".to_string(),
        event_type: "transaction.posted".to_string(),
        created: 1_700_000_000,
        data: serde_json::json!({"transaction_id": "txn_01", "total_amount": "1000"}),
        tenant_id: "ten_01".to_string(),
        livemode: true,
    }
}

#[tokio::test]
async fn successful_dispatch_carries_signed_headers() {
    let (url, capture) = spawn_endpoint(StatusCode::OK).await;
    let dispatcher = Dispatcher::new(Duration::from_secs(5)).unwrap();
    let config = config(&url);

    let outcome = dispatcher.dispatch(&config, &payload()).await;

    assert!(outcome.success);
    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.response_body, "ack");

    let requests = capture.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let (headers, body) = &requests[0];

    assert_eq!(headers["content-type"], "application/json");
    assert_eq!(headers["user-agent"], "LedgerService-Webhooks/1.0");
    assert_eq!(headers["x-ledger-event-id"], "evt_01");
    assert_eq!(headers["x-ledger-timestamp"], "1700000000");

    // The signature verifies against the exact bytes that arrived.
    let expected = signature::header_value(&config.secret, body);
    assert_eq!(headers["x-ledger-signature"].to_str().unwrap(), expected);

    let wire: serde_json::Value = serde_json::from_slice(body).unwrap();
    assert_eq!(wire["type"], "transaction.posted");
    assert_eq!(wire["livemode"], serde_json::json!(true));
}

#[tokio::test]
async fn non_2xx_is_a_failure_outcome() {
    let (url, _capture) = spawn_endpoint(StatusCode::INTERNAL_SERVER_ERROR).await;
    let dispatcher = Dispatcher::new(Duration::from_secs(5)).unwrap();

    let outcome = dispatcher.dispatch(&config(&url), &payload()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.status_code, 500);
}

#[tokio::test]
async fn transport_failure_reports_status_zero() {
    // Bind and immediately drop a listener so the port refuses connections.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let dispatcher = Dispatcher::new(Duration::from_secs(2)).unwrap();
    let outcome = dispatcher
        .dispatch(&config(&format!("http://{addr}/hook")), &payload())
        .await;

    assert!(!outcome.success);
    assert_eq!(outcome.status_code, 0);
    assert!(!outcome.response_body.is_empty());
}

#[tokio::test]
async fn identical_payloads_sign_identically_across_attempts() {
    let (url, capture) = spawn_endpoint(StatusCode::INTERNAL_SERVER_ERROR).await;
    let dispatcher = Dispatcher::new(Duration::from_secs(5)).unwrap();
    let config = config(&url);
    let payload = payload();

    for _ in 0..3 {
        let outcome = dispatcher.dispatch(&config, &payload).await;
        assert!(!outcome.success);
    }

    let requests = capture.requests.lock().unwrap();
    assert_eq!(requests.len(), 3);

    let signatures: Vec<_> = requests
        .iter()
        .map(|(headers, _)| headers["x-ledger-signature"].clone())
        .collect();
    assert_eq!(signatures[0], signatures[1]);
    assert_eq!(signatures[1], signatures[2]);

    let bodies: Vec<_> = requests.iter().map(|(_, body)| body.clone()).collect();
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[1], bodies[2]);
}
