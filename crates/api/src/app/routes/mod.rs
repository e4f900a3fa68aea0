//! HTTP routes, one file per resource.

pub mod accounts;
pub mod events;
pub mod tenants;
pub mod transactions;
pub mod webhooks;

use axum::Router;

/// Routes scoped to one tenant, mounted under `/v1/tenants/:slug`.
pub fn tenant_router() -> Router {
    Router::new()
        .merge(transactions::router())
        .merge(accounts::router())
        .merge(events::router())
        .merge(webhooks::router())
}
