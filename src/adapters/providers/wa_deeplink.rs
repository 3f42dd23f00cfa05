//! Deep-link WhatsApp lookup through logged-in account sessions.
//!
//! Talks to the session broker (the service fronting the per-account browser
//! sessions) with a claimed account's token. Can surface profile metadata
//! the anonymous heuristic cannot: profile picture, last-seen, business
//! flag. With no available account the call falls back to the free
//! heuristic instead of failing.

use crate::adapters::providers::account_pool::AccountPool;
use crate::domain::{Platform, ValidationResult, ValidationStatus};
use crate::ports::{CapabilityMode, WhatsAppProvider};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(20);

/// How long an account sits out after the broker reports it rate-limited.
const RATE_LIMIT_COOLDOWN_MINUTES: i64 = 15;

pub struct DeeplinkWhatsApp {
    client: reqwest::Client,
    broker_url: String,
    pool: Arc<AccountPool>,
    fallback: Arc<dyn WhatsAppProvider>,
}

impl DeeplinkWhatsApp {
    pub fn new(
        broker_url: String,
        pool: Arc<AccountPool>,
        fallback: Arc<dyn WhatsAppProvider>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            broker_url,
            pool,
            fallback,
        }
    }

    fn map_lookup_response(body: &Value, account_label: &str) -> ValidationResult {
        let exists = body.get("exists").and_then(Value::as_bool);
        let status = match exists {
            Some(true) => ValidationStatus::Active,
            Some(false) => ValidationStatus::Inactive,
            None => ValidationStatus::Invalid,
        };

        let mut details = serde_json::Map::new();
        details.insert("method".to_string(), "deeplink_profile".into());
        details.insert("account".to_string(), account_label.into());
        for key in ["is_business", "profile_picture_url", "last_seen", "about"] {
            if let Some(value) = body.get(key) {
                if !value.is_null() {
                    details.insert(key.to_string(), value.clone());
                }
            }
        }

        ValidationResult::new(Platform::WhatsApp, status).with_details(details)
    }
}

#[async_trait::async_trait]
impl WhatsAppProvider for DeeplinkWhatsApp {
    async fn validate(&self, phone: &str, identifier: Option<&str>) -> ValidationResult {
        let Some(account) = self.pool.claim(Utc::now()).await else {
            info!(phone, "no deep-link account available, falling back to web heuristic");
            return self.fallback.validate(phone, identifier).await;
        };

        let payload = serde_json::json!({
            "phone": phone,
            "include_profile": true,
            "identifier_hint": identifier,
        });

        let response = match self
            .client
            .post(format!("{}/lookup", self.broker_url))
            .bearer_auth(&account.session_token)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ValidationResult::error(Platform::WhatsApp, e.to_string()),
        };

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let until = Utc::now() + Duration::minutes(RATE_LIMIT_COOLDOWN_MINUTES);
            warn!(phone, account = %account.id, "broker rate-limited account");
            self.pool.mark_rate_limited(&account.id, until).await;
            return self.fallback.validate(phone, identifier).await;
        }

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_else(|_| "unknown".to_string());
            return ValidationResult::error(
                Platform::WhatsApp,
                format!(
                    "broker error {}: {}",
                    status,
                    text.chars().take(200).collect::<String>()
                ),
            );
        }

        match response.json::<Value>().await {
            Ok(body) => Self::map_lookup_response(&body, &account.label),
            Err(e) => ValidationResult::error(Platform::WhatsApp, e.to_string()),
        }
    }

    fn mode(&self) -> CapabilityMode {
        CapabilityMode::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn existing_number_maps_to_active_with_profile() {
        let body = json!({
            "exists": true,
            "is_business": true,
            "profile_picture_url": "https://pps.whatsapp.net/x.jpg",
            "last_seen": "recently",
        });
        let result = DeeplinkWhatsApp::map_lookup_response(&body, "acct-1");
        assert_eq!(result.status, ValidationStatus::Active);
        assert_eq!(result.details["is_business"], true);
        assert_eq!(result.details["account"], "acct-1");
    }

    #[test]
    fn missing_number_maps_to_inactive() {
        let body = json!({"exists": false});
        let result = DeeplinkWhatsApp::map_lookup_response(&body, "acct-1");
        assert_eq!(result.status, ValidationStatus::Inactive);
        assert!(!result.details.contains_key("profile_picture_url"));
    }

    #[test]
    fn malformed_body_maps_to_invalid() {
        let body = json!({"unexpected": "shape"});
        let result = DeeplinkWhatsApp::map_lookup_response(&body, "acct-1");
        assert_eq!(result.status, ValidationStatus::Invalid);
    }
}
