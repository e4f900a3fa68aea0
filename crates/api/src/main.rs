use std::sync::Arc;

use ledgerd_api::app;
use ledgerd_api::context::AppServices;
use ledgerd_infra::{Config, DeliveryWorker, Dispatcher};

#[tokio::main]
async fn main() {
    ledgerd_observability::init();

    let cfg = Config::from_env().expect("invalid configuration");

    let pool = ledgerd_infra::db::connect(&cfg)
        .await
        .expect("failed to connect to database");
    ledgerd_infra::db::ensure_schema(&pool)
        .await
        .expect("failed to bootstrap schema");

    let services = Arc::new(AppServices::build(pool.clone(), &cfg).expect("failed to wire services"));

    let dispatcher = Dispatcher::new(cfg.webhook_timeout).expect("failed to build dispatcher");
    let worker = DeliveryWorker::new(
        pool,
        dispatcher,
        cfg.webhook_batch_size,
        cfg.webhook_poll_interval,
    )
    .spawn();

    let app = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr())
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", cfg.bind_addr()));

    tracing::info!(env = %cfg.env, "listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    // Let the in-flight delivery attempt finish before exiting.
    worker.shutdown().await;
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install ctrl-c handler");
    tracing::info!("shutdown signal received");
}
