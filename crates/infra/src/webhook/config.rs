//! Webhook subscription configuration, parsed from tenant metadata.
//!
//! A tenant subscribes by carrying `webhook_url` and `webhook_secret` in
//! its metadata; `webhook_events` and `webhook_enabled` are optional and
//! default to all supported types / enabled.

use serde::{Deserialize, Serialize};

use ledgerd_core::{LedgerError, LedgerResult};
use ledgerd_events::EventType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: String,
    pub events: Vec<String>,
    pub enabled: bool,
}

impl WebhookConfig {
    /// Parse the recognized option set out of tenant metadata. `None` when
    /// `webhook_url` or `webhook_secret` is absent or empty: the tenant has
    /// no subscription.
    pub fn from_metadata(metadata: &serde_json::Value) -> Option<Self> {
        let url = metadata.get("webhook_url")?.as_str()?;
        let secret = metadata.get("webhook_secret")?.as_str()?;
        if url.is_empty() || secret.is_empty() {
            return None;
        }

        let events = match metadata.get("webhook_events").and_then(|v| v.as_array()) {
            Some(list) => list
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            None => supported_event_types(),
        };

        let enabled = metadata
            .get("webhook_enabled")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        Some(Self {
            url: url.to_string(),
            secret: secret.to_string(),
            events,
            enabled,
        })
    }

    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.events.iter().any(|e| e == event_type)
    }
}

/// Every event type a tenant may subscribe to.
pub fn supported_event_types() -> Vec<String> {
    EventType::ALL.iter().map(|t| t.as_str().to_string()).collect()
}

/// A request to (re)configure a tenant's subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfigRequest {
    pub url: String,
    pub secret: String,
    pub events: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl WebhookConfigRequest {
    /// An empty url or secret would silently drop the subscription on the
    /// next `from_metadata` parse; everything else is stored as given.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.url.is_empty() {
            return Err(LedgerError::validation("webhook url is required"));
        }
        if self.secret.is_empty() {
            return Err(LedgerError::validation("webhook secret is required"));
        }
        Ok(())
    }

    /// Merge the four `webhook_*` keys into existing tenant metadata,
    /// preserving everything else.
    pub fn merge_into(&self, metadata: &serde_json::Value) -> serde_json::Value {
        let mut map = match metadata {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        map.insert("webhook_url".into(), self.url.clone().into());
        map.insert("webhook_secret".into(), self.secret.clone().into());
        map.insert(
            "webhook_events".into(),
            serde_json::Value::Array(self.events.iter().cloned().map(Into::into).collect()),
        );
        map.insert("webhook_enabled".into(), self.enabled.into());
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_url_or_secret_means_no_subscription() {
        assert!(WebhookConfig::from_metadata(&json!({})).is_none());
        assert!(WebhookConfig::from_metadata(&json!({"webhook_url": "https://x"})).is_none());
        assert!(
            WebhookConfig::from_metadata(&json!({"webhook_url": "", "webhook_secret": "s"}))
                .is_none()
        );
        assert!(
            WebhookConfig::from_metadata(&json!({"webhook_url": "https://x", "webhook_secret": ""}))
                .is_none()
        );
    }

    #[test]
    fn defaults_are_all_events_and_enabled() {
        let config = WebhookConfig::from_metadata(&json!({
            "webhook_url": "https://example.com/hook",
            "webhook_secret": "shhh",
        }))
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.events, supported_event_types());
        assert!(config.subscribes_to("transaction.posted"));
        assert!(config.subscribes_to("balance.updated"));
        assert!(!config.subscribes_to("webhook.test"));
    }

    #[test]
    fn explicit_event_list_filters() {
        let config = WebhookConfig::from_metadata(&json!({
            "webhook_url": "https://example.com/hook",
            "webhook_secret": "shhh",
            "webhook_events": ["transaction.posted"],
            "webhook_enabled": false,
        }))
        .unwrap();

        assert!(!config.enabled);
        assert!(config.subscribes_to("transaction.posted"));
        assert!(!config.subscribes_to("balance.updated"));
    }

    #[test]
    fn configure_request_requires_url_and_secret() {
        let ok = WebhookConfigRequest {
            url: "https://example.com/hook".into(),
            secret: "shhh".into(),
            events: vec!["transaction.posted".into()],
            enabled: true,
        };
        assert!(ok.validate().is_ok());

        let mut bad = ok.clone();
        bad.url = String::new();
        assert!(bad.validate().is_err());

        let mut bad = ok.clone();
        bad.secret = String::new();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn merge_preserves_unrelated_metadata() {
        let req = WebhookConfigRequest {
            url: "https://example.com/hook".into(),
            secret: "0123456789abcdef0123456789abcdef".into(),
            events: vec!["balance.updated".into()],
            enabled: true,
        };
        let merged = req.merge_into(&json!({"plan": "starter"}));

        assert_eq!(merged["plan"], json!("starter"));
        assert_eq!(merged["webhook_url"], json!("https://example.com/hook"));
        assert_eq!(merged["webhook_events"], json!(["balance.updated"]));
        assert_eq!(merged["webhook_enabled"], json!(true));
    }
}
