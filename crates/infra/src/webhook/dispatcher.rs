//! Outbound webhook dispatch.
//!
//! Builds the signed HTTP request for one event and classifies the
//! outcome. The dispatcher never fails the caller: transport errors come
//! back as an outcome with status 0 and the error text as the body.

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use ledgerd_core::{LedgerError, LedgerResult};

use super::config::WebhookConfig;
use super::signature;

pub const USER_AGENT: &str = "LedgerService-Webhooks/1.0";
/// Persisted response bodies are truncated to this many bytes.
pub const MAX_RESPONSE_BODY_BYTES: usize = 4096;
/// Event type used for synthetic configuration-check deliveries.
pub const TEST_EVENT_TYPE: &str = "webhook.test";

/// The JSON body POSTed to subscriber endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Unix seconds.
    pub created: i64,
    pub data: serde_json::Value,
    pub tenant_id: String,
    pub livemode: bool,
}

/// Classified result of one delivery attempt.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub success: bool,
    /// 0 when the request produced no HTTP response (transport failure).
    pub status_code: i32,
    pub response_body: String,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> LedgerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LedgerError::storage(format!("failed to build http client: {e}")))?;
        Ok(Self { client })
    }

    /// POST the signed payload. 2xx is success; anything else (including
    /// transport failure) is a failure outcome.
    pub async fn dispatch(
        &self,
        config: &WebhookConfig,
        payload: &WebhookPayload,
    ) -> DispatchOutcome {
        let body = match serde_json::to_vec(payload) {
            Ok(body) => body,
            Err(e) => {
                return DispatchOutcome {
                    success: false,
                    status_code: 0,
                    response_body: format!("failed to serialize payload: {e}"),
                }
            }
        };

        let result = self
            .client
            .post(&config.url)
            .header(CONTENT_TYPE, "application/json")
            .header("X-Ledger-Event-ID", &payload.id)
            .header("X-Ledger-Timestamp", payload.created.to_string())
            .header(
                "X-Ledger-Signature",
                signature::header_value(&config.secret, &body),
            )
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status_code = response.status().as_u16() as i32;
                let response_body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "failed to read response body".to_string());
                DispatchOutcome {
                    success: (200..300).contains(&status_code),
                    status_code,
                    response_body: truncate_body(response_body),
                }
            }
            Err(e) => DispatchOutcome {
                success: false,
                status_code: 0,
                response_body: truncate_body(format!("http request failed: {e}")),
            },
        }
    }
}

/// Cap a response body at [`MAX_RESPONSE_BODY_BYTES`], respecting char
/// boundaries.
pub fn truncate_body(body: String) -> String {
    if body.len() <= MAX_RESPONSE_BODY_BYTES {
        return body;
    }
    let mut end = MAX_RESPONSE_BODY_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

/// Backoff before the next attempt, given the attempt count after the
/// failure: 60s * 2^attempts (2 min, 4 min, 8 min, ...).
pub fn backoff_delay(attempts: i32) -> ChronoDuration {
    let exponent = attempts.clamp(1, 30) as u32;
    ChronoDuration::seconds(60 * (1i64 << exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_from_two_minutes() {
        assert_eq!(backoff_delay(1), ChronoDuration::minutes(2));
        assert_eq!(backoff_delay(2), ChronoDuration::minutes(4));
        assert_eq!(backoff_delay(3), ChronoDuration::minutes(8));
        assert_eq!(backoff_delay(4), ChronoDuration::minutes(16));
    }

    #[test]
    fn backoff_exponent_is_clamped() {
        assert_eq!(backoff_delay(0), ChronoDuration::minutes(2));
        assert_eq!(backoff_delay(64), ChronoDuration::seconds(60 * (1i64 << 30)));
    }

    #[test]
    fn bodies_are_truncated_at_the_cap() {
        let body = "x".repeat(MAX_RESPONSE_BODY_BYTES + 100);
        assert_eq!(truncate_body(body).len(), MAX_RESPONSE_BODY_BYTES);

        let short = "ok".to_string();
        assert_eq!(truncate_body(short), "ok");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let body = "é".repeat(MAX_RESPONSE_BODY_BYTES);
        let truncated = truncate_body(body);
        assert!(truncated.len() <= MAX_RESPONSE_BODY_BYTES);
        assert!(truncated.chars().all(|c| c == 'é'));
    }

    #[test]
    fn payload_serializes_with_wire_field_names() {
        let payload = WebhookPayload {
            id: "evt_1".into(),
            event_type: "transaction.posted".into(),
            created: 1_700_000_000,
            data: serde_json::json!({"total_amount": "1000"}),
            tenant_id: "ten_1".into(),
            livemode: true,
        };
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["type"], serde_json::json!("transaction.posted"));
        assert_eq!(value["created"], serde_json::json!(1_700_000_000));
        assert_eq!(value["livemode"], serde_json::json!(true));
        assert!(value.get("event_type").is_none());
    }
}
