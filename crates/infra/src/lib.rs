//! Infrastructure: Postgres persistence, the posting engine, and the
//! webhook delivery pipeline.

pub mod chart;
pub mod config;
pub mod db;
pub mod posting;
pub mod store;
pub mod webhook;

pub use chart::{ChartService, CreateAccountRequest, UpdateAccountRequest};
pub use config::Config;
pub use posting::{PostDoubleEntryRequest, PostSimpleRequest, PostingEngine};
pub use webhook::{DeliveryWorker, Dispatcher, WebhookService, WorkerHandle};
