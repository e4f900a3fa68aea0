//! The delivery worker: a single long-lived poll-and-dispatch loop.
//!
//! Each pass fetches due delivery rows and processes them sequentially.
//! Per-row failures are recorded on the row and logged, never surfaced;
//! database outages skip the pass and the next tick retries.

use std::time::Duration;

use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use ledgerd_core::{LedgerError, LedgerResult};

use crate::store::{DeliveryStore, EventLog, TenantCatalog, WebhookDelivery};

use super::config::WebhookConfig;
use super::dispatcher::{backoff_delay, Dispatcher, WebhookPayload};

pub struct DeliveryWorker {
    pool: PgPool,
    dispatcher: Dispatcher,
    batch_size: i64,
    poll_interval: Duration,
}

/// Handle to request a graceful stop. The in-flight delivery attempt
/// finishes; no new attempts start.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    join: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.join.await;
    }
}

impl DeliveryWorker {
    pub fn new(
        pool: PgPool,
        dispatcher: Dispatcher,
        batch_size: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            batch_size,
            poll_interval,
        }
    }

    /// Start the background loop. The first tick fires immediately, which
    /// doubles as the eager startup pass.
    pub fn spawn(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let pass_rx = shutdown_rx.clone();

        let join = tokio::spawn(async move {
            info!(
                batch_size = self.batch_size,
                poll_interval_secs = self.poll_interval.as_secs(),
                "webhook delivery worker started"
            );

            let mut tick = tokio::time::interval(self.poll_interval);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tick.tick() => {
                        self.run_once(Some(&pass_rx)).await;
                    }
                }
            }

            info!("webhook delivery worker stopped");
        });

        WorkerHandle {
            shutdown: shutdown_tx,
            join,
        }
    }

    /// One poll-and-dispatch pass; returns the number of rows processed.
    /// Public so tests and maintenance paths can drive the worker without
    /// the timer.
    pub async fn run_once(&self, shutdown: Option<&watch::Receiver<bool>>) -> usize {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "database unavailable; skipping delivery pass");
                return 0;
            }
        };

        let due = match DeliveryStore::due(&mut conn, self.batch_size).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "failed to fetch due deliveries; skipping pass");
                return 0;
            }
        };

        if due.is_empty() {
            return 0;
        }
        debug!(count = due.len(), "processing due webhook deliveries");

        let mut processed = 0;
        for delivery in due {
            // Exit cleanly between rows on shutdown.
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                break;
            }
            if let Err(e) = self.process(&mut conn, &delivery).await {
                warn!(delivery_id = %delivery.id, error = %e, "failed to process delivery");
            }
            processed += 1;
        }
        processed
    }

    /// Dispatch one delivery row and record the outcome.
    ///
    /// If the tenant's configuration no longer matches the row (disabled,
    /// different URL, event type dropped), the row is left untouched.
    async fn process(
        &self,
        conn: &mut PgConnection,
        delivery: &WebhookDelivery,
    ) -> LedgerResult<()> {
        let tenant = TenantCatalog
            .get_by_id(conn, delivery.tenant_id)
            .await?
            .ok_or(LedgerError::TenantNotFound)?;

        let Some(config) = WebhookConfig::from_metadata(&tenant.metadata) else {
            debug!(delivery_id = %delivery.id, "tenant no longer subscribed; leaving row");
            return Ok(());
        };

        let event = EventLog::new(tenant.id)
            .by_id(conn, delivery.event_id)
            .await?
            .ok_or_else(|| LedgerError::storage("delivery references missing event"))?;

        if !config.enabled
            || config.url != delivery.url
            || !config.subscribes_to(event.event_type.as_str())
        {
            debug!(delivery_id = %delivery.id, "configuration drifted; leaving row");
            return Ok(());
        }

        let payload = WebhookPayload {
            id: event.event_id.to_string(),
            event_type: event.event_type.as_str().to_string(),
            created: event.created_at.timestamp(),
            data: event.event_data.clone(),
            tenant_id: tenant.id.to_string(),
            livemode: true,
        };

        let outcome = self.dispatcher.dispatch(&config, &payload).await;

        if outcome.success {
            DeliveryStore::mark_success(
                conn,
                delivery.id,
                outcome.status_code,
                &outcome.response_body,
            )
            .await?;
            info!(
                delivery_id = %delivery.id,
                status = outcome.status_code,
                "webhook delivered"
            );
        } else {
            let attempts = delivery.attempts + 1;
            let next_retry_at = if attempts >= delivery.max_attempts {
                None
            } else {
                Some(Utc::now() + backoff_delay(attempts))
            };
            DeliveryStore::mark_failure(
                conn,
                delivery.id,
                outcome.status_code,
                &outcome.response_body,
                next_retry_at,
            )
            .await?;
            warn!(
                delivery_id = %delivery.id,
                status = outcome.status_code,
                attempts,
                terminal = next_retry_at.is_none(),
                "webhook delivery attempt failed"
            );
        }

        Ok(())
    }
}
