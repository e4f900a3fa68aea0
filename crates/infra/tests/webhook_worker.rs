//! Worker retry schedule against a live Postgres and a local failing
//! endpoint. Skipped unless TEST_DATABASE_URL is set.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use ledgerd_accounting::{AccountType, Side};
use ledgerd_infra::chart::{ChartService, CreateAccountRequest};
use ledgerd_infra::posting::{PostSimpleRequest, PostingEngine};
use ledgerd_infra::store::tenants::NewTenant;
use ledgerd_infra::store::{DeliveryStore, Tenant, TenantCatalog};
use ledgerd_infra::webhook::dispatcher::Dispatcher;
use ledgerd_infra::webhook::worker::DeliveryWorker;

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .ok()?;
    ledgerd_infra::db::ensure_schema(&pool).await.ok()?;
    Some(pool)
}

#[derive(Clone)]
struct Capture {
    signatures: Arc<Mutex<Vec<String>>>,
}

async fn failing_hook(
    State(capture): State<Capture>,
    headers: HeaderMap,
    _body: Bytes,
) -> (StatusCode, &'static str) {
    let signature = headers["x-ledger-signature"].to_str().unwrap().to_string();
    capture.signatures.lock().unwrap().push(signature);
    (StatusCode::INTERNAL_SERVER_ERROR, "nope")
}

async fn spawn_failing_endpoint() -> (String, Capture) {
    let capture = Capture {
        signatures: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/hook", post(failing_hook))
        .with_state(capture.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/hook"), capture)
}

async fn seed_subscribed_tenant(pool: &PgPool, url: &str) -> Tenant {
    let mut conn = pool.acquire().await.unwrap();
    TenantCatalog
        .create(
            &mut conn,
            NewTenant {
                slug: format!("t-{}", uuid::Uuid::new_v4().simple()),
                name: "Webhook Tenant".to_string(),
                base_currency: "NGN".to_string(),
                metadata: serde_json::json!({
                    "webhook_url": url,
                    "webhook_secret": "0123456789abcdef0123456789abcdef",
                    "webhook_events": ["transaction.posted"],
                    "webhook_enabled": true,
                }),
            },
        )
        .await
        .unwrap()
}

/// Force a non-terminal delivery due so the next pass picks it up
/// without waiting out the backoff.
async fn make_due(pool: &PgPool, tenant: &Tenant) {
    sqlx::query(
        "UPDATE webhook_deliveries SET next_retry_at = now() \
         WHERE tenant_id = $1 AND failed_at IS NULL AND delivered_at IS NULL",
    )
    .bind(tenant.id.as_uuid())
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn failing_endpoint_walks_the_backoff_schedule() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };

    let (url, capture) = spawn_failing_endpoint().await;
    let tenant = seed_subscribed_tenant(&pool, &url).await;
    let chart = ChartService::new(pool.clone(), 3);
    let engine = PostingEngine::new(pool.clone(), 3);

    chart
        .create_account(
            &tenant,
            CreateAccountRequest {
                code: "1000".to_string(),
                name: "Cash".to_string(),
                account_type: AccountType::Asset,
                parent_code: None,
                currency: None,
                metadata: None,
            },
        )
        .await
        .unwrap();

    engine
        .post_simple(
            &tenant,
            PostSimpleRequest {
                idempotency_key: "hook-1".to_string(),
                description: "seed".to_string(),
                reference: None,
                account_code: "1000".to_string(),
                amount: dec!(1000),
                side: Side::Debit,
                currency: "NGN".to_string(),
                metadata: None,
            },
        )
        .await
        .unwrap();

    let worker = DeliveryWorker::new(
        pool.clone(),
        Dispatcher::new(Duration::from_secs(5)).unwrap(),
        10,
        Duration::from_secs(10),
    );

    // Attempt 1: failure schedules the next retry ~2 minutes out.
    assert_eq!(worker.run_once(None).await, 1);
    let delivery = latest_delivery(&pool, &tenant).await;
    assert_eq!(delivery.attempts, 1);
    assert_eq!(delivery.http_status_code, Some(500));
    let delay = (delivery.next_retry_at.unwrap() - Utc::now()).num_seconds();
    assert!((100..=130).contains(&delay), "unexpected backoff {delay}s");

    // Attempt 2: ~4 minutes.
    make_due(&pool, &tenant).await;
    assert_eq!(worker.run_once(None).await, 1);
    let delivery = latest_delivery(&pool, &tenant).await;
    assert_eq!(delivery.attempts, 2);
    let delay = (delivery.next_retry_at.unwrap() - Utc::now()).num_seconds();
    assert!((220..=250).contains(&delay), "unexpected backoff {delay}s");

    // Attempt 3: terminal.
    make_due(&pool, &tenant).await;
    assert_eq!(worker.run_once(None).await, 1);
    let delivery = latest_delivery(&pool, &tenant).await;
    assert_eq!(delivery.attempts, 3);
    assert!(delivery.failed_at.is_some());
    assert!(delivery.next_retry_at.is_none());

    // Exhausted rows are no longer picked up.
    make_due(&pool, &tenant).await;
    assert_eq!(worker.run_once(None).await, 0);

    // Identical payload bytes sign identically on every attempt.
    let signatures = capture.signatures.lock().unwrap();
    assert_eq!(signatures.len(), 3);
    assert!(signatures.iter().all(|s| s == &signatures[0]));
}

async fn latest_delivery(
    pool: &PgPool,
    tenant: &Tenant,
) -> ledgerd_infra::store::WebhookDelivery {
    let mut conn = pool.acquire().await.unwrap();
    DeliveryStore::new(tenant.id)
        .list(&mut conn, 10)
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap()
}
