//! HTTP surface for the ledger service.

pub mod app;
pub mod context;

pub use context::AppServices;
