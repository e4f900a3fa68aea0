//! End-to-end posting scenarios against a live Postgres.
//!
//! These tests are skipped unless TEST_DATABASE_URL points at a database
//! the suite may create tables in.

use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use ledgerd_accounting::{AccountType, LineEntry, Side, TransactionStatus};
use ledgerd_core::LedgerError;
use ledgerd_events::EventType;
use ledgerd_infra::chart::{ChartService, CreateAccountRequest};
use ledgerd_infra::posting::{PostDoubleEntryRequest, PostSimpleRequest, PostingEngine};
use ledgerd_infra::store::tenants::NewTenant;
use ledgerd_infra::store::{EventLog, Tenant, TenantCatalog, TransactionStore};

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .ok()?;
    ledgerd_infra::db::ensure_schema(&pool).await.ok()?;
    Some(pool)
}

async fn seed_tenant(pool: &PgPool) -> Tenant {
    let mut conn = pool.acquire().await.unwrap();
    TenantCatalog
        .create(
            &mut conn,
            NewTenant {
                slug: format!("t-{}", uuid::Uuid::new_v4().simple()),
                name: "Test Tenant".to_string(),
                base_currency: "NGN".to_string(),
                metadata: serde_json::json!({}),
            },
        )
        .await
        .unwrap()
}

async fn seed_account(
    chart: &ChartService,
    tenant: &Tenant,
    code: &str,
    name: &str,
    account_type: AccountType,
) {
    chart
        .create_account(
            tenant,
            CreateAccountRequest {
                code: code.to_string(),
                name: name.to_string(),
                account_type,
                parent_code: None,
                currency: None,
                metadata: None,
            },
        )
        .await
        .unwrap();
}

fn simple_debit(key: &str, code: &str, amount: rust_decimal::Decimal) -> PostSimpleRequest {
    PostSimpleRequest {
        idempotency_key: key.to_string(),
        description: "seed".to_string(),
        reference: None,
        account_code: code.to_string(),
        amount,
        side: Side::Debit,
        currency: "NGN".to_string(),
        metadata: None,
    }
}

#[tokio::test]
async fn simple_debit_on_new_asset_account() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let tenant = seed_tenant(&pool).await;
    let chart = ChartService::new(pool.clone(), 3);
    let engine = PostingEngine::new(pool.clone(), 3);

    seed_account(&chart, &tenant, "1000", "Cash", AccountType::Asset).await;

    let record = engine
        .post_simple(&tenant, simple_debit("k1", "1000", dec!(1000)))
        .await
        .unwrap();

    assert_eq!(record.status, TransactionStatus::Posted);
    assert!(record.posted_at.is_some());

    let account = chart.get_account_by_code(&tenant, "1000").await.unwrap();
    let balance = chart
        .account_balance(&tenant, account.id, "NGN")
        .await
        .unwrap();
    assert_eq!(balance.balance, dec!(1000));
    assert_eq!(balance.version, 1);

    let mut conn = pool.acquire().await.unwrap();
    let log = EventLog::new(tenant.id);

    let txn_events = log
        .by_aggregate(&mut conn, *record.id.as_uuid())
        .await
        .unwrap();
    assert_eq!(txn_events.len(), 1);
    assert_eq!(txn_events[0].event_type, EventType::TransactionPosted);
    assert_eq!(
        txn_events[0].event_data["total_amount"],
        serde_json::json!("1000")
    );

    let account_events = log
        .by_aggregate(&mut conn, *account.id.as_uuid())
        .await
        .unwrap();
    let balance_events: Vec<_> = account_events
        .iter()
        .filter(|e| e.event_type == EventType::BalanceUpdated)
        .collect();
    assert_eq!(balance_events.len(), 1);
    assert_eq!(
        balance_events[0].event_data["previous_balance"],
        serde_json::json!("0")
    );
    assert_eq!(
        balance_events[0].event_data["new_balance"],
        serde_json::json!("1000")
    );
    assert_eq!(
        balance_events[0].event_data["balance_change"],
        serde_json::json!("1000")
    );
}

#[tokio::test]
async fn balanced_double_entry_purchase() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let tenant = seed_tenant(&pool).await;
    let chart = ChartService::new(pool.clone(), 3);
    let engine = PostingEngine::new(pool.clone(), 3);

    seed_account(&chart, &tenant, "1200", "Inventory", AccountType::Asset).await;
    seed_account(&chart, &tenant, "2000", "Accounts Payable", AccountType::Liability).await;
    seed_account(&chart, &tenant, "1000", "Cash", AccountType::Asset).await;

    let entry = |code: &str, amount, side| LineEntry {
        account_code: code.to_string(),
        amount,
        side,
        currency: "NGN".to_string(),
        metadata: None,
    };

    let record = engine
        .post_double_entry(
            &tenant,
            PostDoubleEntryRequest {
                idempotency_key: "purchase-1".to_string(),
                description: "inventory purchase".to_string(),
                reference: Some("PO-42".to_string()),
                entries: vec![
                    entry("1200", dec!(5000), Side::Debit),
                    entry("2000", dec!(4500), Side::Credit),
                    entry("1000", dec!(500), Side::Credit),
                ],
                metadata: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(record.status, TransactionStatus::Posted);

    let expect = [
        ("1200", dec!(5000)),
        ("2000", dec!(4500)),
        ("1000", dec!(-500)),
    ];
    for (code, expected) in expect {
        let account = chart.get_account_by_code(&tenant, code).await.unwrap();
        let balance = chart
            .account_balance(&tenant, account.id, "NGN")
            .await
            .unwrap();
        assert_eq!(balance.balance, expected, "balance of {code}");
        assert_eq!(balance.version, 1);
    }

    // One transaction.posted plus one balance.updated per account.
    let mut conn = pool.acquire().await.unwrap();
    let events = EventLog::new(tenant.id)
        .by_type(&mut conn, EventType::BalanceUpdated, 50, 0)
        .await
        .unwrap();
    assert_eq!(events.len(), 3);
}

#[tokio::test]
async fn unbalanced_posting_leaves_no_state() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let tenant = seed_tenant(&pool).await;
    let chart = ChartService::new(pool.clone(), 3);
    let engine = PostingEngine::new(pool.clone(), 3);

    seed_account(&chart, &tenant, "1000", "Cash", AccountType::Asset).await;
    seed_account(&chart, &tenant, "4000", "Revenue", AccountType::Revenue).await;

    let entry = |code: &str, amount, side| LineEntry {
        account_code: code.to_string(),
        amount,
        side,
        currency: "NGN".to_string(),
        metadata: None,
    };

    let err = engine
        .post_double_entry(
            &tenant,
            PostDoubleEntryRequest {
                idempotency_key: "bad-1".to_string(),
                description: "unbalanced".to_string(),
                reference: None,
                entries: vec![
                    entry("1000", dec!(1000), Side::Debit),
                    entry("4000", dec!(900), Side::Credit),
                ],
                metadata: None,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::UnbalancedTransaction);

    let mut conn = pool.acquire().await.unwrap();
    let store = TransactionStore::new(tenant.id);
    assert!(store
        .get_by_idempotency_key(&mut conn, "bad-1")
        .await
        .unwrap()
        .is_none());

    let events = EventLog::new(tenant.id)
        .by_type(&mut conn, EventType::TransactionPosted, 10, 0)
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn idempotent_replay_returns_the_same_transaction() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let tenant = seed_tenant(&pool).await;
    let chart = ChartService::new(pool.clone(), 3);
    let engine = PostingEngine::new(pool.clone(), 3);

    seed_account(&chart, &tenant, "1000", "Cash", AccountType::Asset).await;

    let first = engine
        .post_simple(&tenant, simple_debit("k1", "1000", dec!(1000)))
        .await
        .unwrap();
    let second = engine
        .post_simple(&tenant, simple_debit("k1", "1000", dec!(1000)))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);

    let lines = engine.get_transaction_lines(&tenant, first.id).await.unwrap();
    assert_eq!(lines.len(), 1);

    let account = chart.get_account_by_code(&tenant, "1000").await.unwrap();
    let balance = chart
        .account_balance(&tenant, account.id, "NGN")
        .await
        .unwrap();
    assert_eq!(balance.balance, dec!(1000));
    assert_eq!(balance.version, 1);

    let mut conn = pool.acquire().await.unwrap();
    let balance_events = EventLog::new(tenant.id)
        .by_type(&mut conn, EventType::BalanceUpdated, 10, 0)
        .await
        .unwrap();
    assert_eq!(balance_events.len(), 1);
}

#[tokio::test]
async fn contending_postings_serialize_on_the_balance_row() {
    let Some(pool) = test_pool().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let tenant = seed_tenant(&pool).await;
    let chart = ChartService::new(pool.clone(), 3);
    let engine = PostingEngine::new(pool.clone(), 3);

    seed_account(&chart, &tenant, "1000", "Cash", AccountType::Asset).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let engine = engine.clone();
        let tenant = tenant.clone();
        handles.push(tokio::spawn(async move {
            // Retry on version conflict; the engine surfaces it untouched.
            for _ in 0..20 {
                match engine
                    .post_simple(
                        &tenant,
                        simple_debit(&format!("contend-{i}"), "1000", dec!(100)),
                    )
                    .await
                {
                    Ok(record) => return record,
                    Err(LedgerError::VersionConflict) => continue,
                    Err(other) => panic!("unexpected error: {other}"),
                }
            }
            panic!("posting did not converge");
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().id);
    }
    ids.sort_by_key(|id| id.to_string());
    ids.dedup();
    assert_eq!(ids.len(), 10);

    let account = chart.get_account_by_code(&tenant, "1000").await.unwrap();
    let balance = chart
        .account_balance(&tenant, account.id, "NGN")
        .await
        .unwrap();
    assert_eq!(balance.balance, dec!(1000));
    assert_eq!(balance.version, 10);

    let mut conn = pool.acquire().await.unwrap();
    let balance_events = EventLog::new(tenant.id)
        .by_type(&mut conn, EventType::BalanceUpdated, 50, 0)
        .await
        .unwrap();
    assert_eq!(balance_events.len(), 10);

    let mut versions: Vec<i64> = balance_events
        .iter()
        .map(|e| e.event_data["version"].as_i64().unwrap())
        .collect();
    versions.sort_unstable();
    assert_eq!(versions, (1..=10).collect::<Vec<i64>>());
}
