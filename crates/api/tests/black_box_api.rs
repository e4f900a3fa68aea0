//! Black-box tests over the HTTP surface.
//!
//! Skipped unless TEST_DATABASE_URL points at a usable Postgres.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use ledgerd_api::app;
use ledgerd_api::context::AppServices;
use ledgerd_infra::Config;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Build the prod router against the test database, bound to an
    /// ephemeral port. Returns None when no test database is configured.
    async fn spawn() -> Option<Self> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;

        let mut cfg = Config::from_env().ok()?;
        cfg.database_url = url;

        let pool = ledgerd_infra::db::connect(&cfg).await.ok()?;
        ledgerd_infra::db::ensure_schema(&pool).await.ok()?;

        let services = Arc::new(AppServices::build(pool, &cfg).ok()?);
        let app = app::build_app(services);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Some(Self { base_url, handle })
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn unique_slug() -> String {
    format!("acme-{}", uuid::Uuid::new_v4().simple())
}

async fn create_tenant(client: &reqwest::Client, base_url: &str, slug: &str) {
    let res = client
        .post(format!("{base_url}/v1/tenants"))
        .json(&json!({ "slug": slug, "name": "Acme", "base_currency": "NGN" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

async fn create_account(
    client: &reqwest::Client,
    base_url: &str,
    slug: &str,
    code: &str,
    name: &str,
    account_type: &str,
) -> serde_json::Value {
    let res = client
        .post(format!("{base_url}/v1/tenants/{slug}/accounts"))
        .json(&json!({ "code": code, "name": name, "account_type": account_type }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

#[tokio::test]
async fn posting_flow_over_http() {
    let Some(server) = TestServer::spawn().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let client = reqwest::Client::new();
    let slug = unique_slug();
    let base = &server.base_url;

    create_tenant(&client, base, &slug).await;
    let cash = create_account(&client, base, &slug, "1000", "Cash", "asset").await;
    create_account(&client, base, &slug, "4000", "Sales", "revenue").await;

    // Simple debit posts and returns the transaction record.
    let res = client
        .post(format!("{base}/v1/tenants/{slug}/transactions/simple"))
        .json(&json!({
            "idempotency_key": "k1",
            "description": "seed",
            "account_code": "1000",
            "amount": "1000",
            "side": "debit",
            "currency": "NGN",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let posted: serde_json::Value = res.json().await.unwrap();
    assert_eq!(posted["status"], json!("posted"));
    let transaction_id = posted["id"].as_str().unwrap().to_string();

    // Idempotent replay returns the same transaction.
    let res = client
        .post(format!("{base}/v1/tenants/{slug}/transactions/simple"))
        .json(&json!({
            "idempotency_key": "k1",
            "description": "seed",
            "account_code": "1000",
            "amount": "1000",
            "side": "debit",
            "currency": "NGN",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let replayed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(replayed["id"], posted["id"]);

    // Balance reflects exactly one posting.
    let account_id = cash["id"].as_str().unwrap();
    let res = client
        .get(format!(
            "{base}/v1/tenants/{slug}/accounts/{account_id}/balance"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let balance: serde_json::Value = res.json().await.unwrap();
    assert_eq!(balance["balance"], json!("1000"));
    assert_eq!(balance["version"], json!(1));

    // Lines round-trip with account info.
    let res = client
        .get(format!(
            "{base}/v1/tenants/{slug}/transactions/{transaction_id}/lines"
        ))
        .send()
        .await
        .unwrap();
    let lines: serde_json::Value = res.json().await.unwrap();
    assert_eq!(lines["lines"].as_array().unwrap().len(), 1);
    assert_eq!(lines["lines"][0]["account_code"], json!("1000"));

    // Unbalanced double-entry is rejected with no side effects.
    let res = client
        .post(format!(
            "{base}/v1/tenants/{slug}/transactions/double-entry"
        ))
        .json(&json!({
            "idempotency_key": "bad",
            "description": "unbalanced",
            "entries": [
                { "account_code": "1000", "amount": "1000", "side": "debit", "currency": "NGN" },
                { "account_code": "4000", "amount": "900", "side": "credit", "currency": "NGN" },
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], json!("unbalanced_transaction"));

    // Events are visible by type, newest first.
    let res = client
        .get(format!(
            "{base}/v1/tenants/{slug}/events?type=transaction.posted"
        ))
        .send()
        .await
        .unwrap();
    let events: serde_json::Value = res.json().await.unwrap();
    let events = events["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0]["event_data"]["transaction_id"],
        json!(transaction_id)
    );
}

#[tokio::test]
async fn unknown_tenant_is_a_404() {
    let Some(server) = TestServer::spawn().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/v1/tenants/no-such-tenant", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_config_round_trip() {
    let Some(server) = TestServer::spawn().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let client = reqwest::Client::new();
    let slug = unique_slug();
    let base = &server.base_url;

    create_tenant(&client, base, &slug).await;

    let res = client
        .put(format!("{base}/v1/tenants/{slug}/webhooks/config"))
        .json(&json!({
            "url": "https://example.com/hook",
            "secret": "0123456789abcdef0123456789abcdef",
            "events": ["transaction.posted"],
            "enabled": true,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let config: serde_json::Value = res.json().await.unwrap();
    assert_eq!(config["url"], json!("https://example.com/hook"));
    assert_eq!(config["events"], json!(["transaction.posted"]));
    assert!(config.get("secret").is_none());

    // An empty secret is rejected: it would silently drop the subscription.
    let res = client
        .put(format!("{base}/v1/tenants/{slug}/webhooks/config"))
        .json(&json!({
            "url": "https://example.com/hook",
            "secret": "",
            "events": ["transaction.posted"],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
