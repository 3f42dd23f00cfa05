//! Paid carrier-lookup WhatsApp providers.
//!
//! Three backends implement the same mapping contract independently:
//! HTTP 200 -> Active/Inactive from the provider's mobile/carrier flags,
//! non-200 -> Invalid, transport error -> Error. Which backend (if any) is
//! used is decided once at startup; unset config falls back to the free
//! web heuristic in the wiring.

use crate::domain::{Platform, ValidationResult, ValidationStatus};
use crate::ports::{CapabilityMode, WhatsAppProvider};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

fn lookup_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

fn detail(method: &str, carrier: Option<&str>, line_type: Option<&str>) -> serde_json::Map<String, Value> {
    let mut details = serde_json::Map::new();
    details.insert("method".to_string(), method.into());
    if let Some(carrier) = carrier {
        details.insert("carrier".to_string(), carrier.into());
    }
    if let Some(line_type) = line_type {
        details.insert("line_type".to_string(), line_type.into());
    }
    details
}

// ── Twilio-style ────────────────────────────────────────────────────────

/// Twilio Lookup style backend: GET /v1/PhoneNumbers/{number}?Type=carrier
/// with basic auth; `carrier.type == "mobile"` means the line can hold a
/// WhatsApp registration.
pub struct TwilioLookup {
    client: reqwest::Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
}

impl TwilioLookup {
    pub fn new(base_url: String, account_sid: String, auth_token: String) -> Self {
        Self {
            client: lookup_client(),
            base_url,
            account_sid,
            auth_token,
        }
    }
}

pub(crate) fn map_twilio_response(body: &Value) -> (ValidationStatus, serde_json::Map<String, Value>) {
    let carrier = body.get("carrier");
    let line_type = carrier
        .and_then(|c| c.get("type"))
        .and_then(Value::as_str);
    let carrier_name = carrier
        .and_then(|c| c.get("name"))
        .and_then(Value::as_str);
    let status = if line_type == Some("mobile") {
        ValidationStatus::Active
    } else {
        ValidationStatus::Inactive
    };
    (status, detail("twilio_lookup", carrier_name, line_type))
}

#[async_trait::async_trait]
impl WhatsAppProvider for TwilioLookup {
    async fn validate(&self, phone: &str, _identifier: Option<&str>) -> ValidationResult {
        let url = format!("{}/v1/PhoneNumbers/{}?Type=carrier", self.base_url, phone);
        let response = match self
            .client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ValidationResult::error(Platform::WhatsApp, e.to_string()),
        };

        if !response.status().is_success() {
            warn!(phone, status = %response.status(), "twilio lookup rejected number");
            return ValidationResult::new(Platform::WhatsApp, ValidationStatus::Invalid);
        }

        match response.json::<Value>().await {
            Ok(body) => {
                let (status, details) = map_twilio_response(&body);
                ValidationResult::new(Platform::WhatsApp, status).with_details(details)
            }
            Err(e) => ValidationResult::error(Platform::WhatsApp, e.to_string()),
        }
    }

    fn mode(&self) -> CapabilityMode {
        CapabilityMode::Live
    }
}

// ── Vonage-style ────────────────────────────────────────────────────────

/// Vonage Number Insight style backend: GET /ni/basic/json; `status == 0`
/// plus a mobile network type means a reachable mobile line.
pub struct VonageLookup {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl VonageLookup {
    pub fn new(base_url: String, api_key: String, api_secret: String) -> Self {
        Self {
            client: lookup_client(),
            base_url,
            api_key,
            api_secret,
        }
    }
}

pub(crate) fn map_vonage_response(body: &Value) -> (ValidationStatus, serde_json::Map<String, Value>) {
    let ok = body.get("status").and_then(Value::as_i64) == Some(0);
    let network_type = body
        .get("current_carrier")
        .and_then(|c| c.get("network_type"))
        .and_then(Value::as_str);
    let carrier_name = body
        .get("current_carrier")
        .and_then(|c| c.get("name"))
        .and_then(Value::as_str);
    let status = if ok && network_type == Some("mobile") {
        ValidationStatus::Active
    } else {
        ValidationStatus::Inactive
    };
    (status, detail("vonage_insight", carrier_name, network_type))
}

#[async_trait::async_trait]
impl WhatsAppProvider for VonageLookup {
    async fn validate(&self, phone: &str, _identifier: Option<&str>) -> ValidationResult {
        let url = format!(
            "{}/ni/basic/json?api_key={}&api_secret={}&number={}",
            self.base_url,
            self.api_key,
            self.api_secret,
            phone.trim_start_matches('+')
        );
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return ValidationResult::error(Platform::WhatsApp, e.to_string()),
        };

        if !response.status().is_success() {
            warn!(phone, status = %response.status(), "vonage lookup rejected number");
            return ValidationResult::new(Platform::WhatsApp, ValidationStatus::Invalid);
        }

        match response.json::<Value>().await {
            Ok(body) => {
                let (status, details) = map_vonage_response(&body);
                ValidationResult::new(Platform::WhatsApp, status).with_details(details)
            }
            Err(e) => ValidationResult::error(Platform::WhatsApp, e.to_string()),
        }
    }

    fn mode(&self) -> CapabilityMode {
        CapabilityMode::Live
    }
}

// ── 360dialog-style ─────────────────────────────────────────────────────

/// 360dialog contacts-check style backend: POST /v1/contacts with a blocking
/// wait; the per-contact `status` field is "valid" or "invalid".
pub struct Dialog360Lookup {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl Dialog360Lookup {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: lookup_client(),
            base_url,
            api_key,
        }
    }
}

pub(crate) fn map_dialog360_response(body: &Value) -> (ValidationStatus, serde_json::Map<String, Value>) {
    let contact_status = body
        .get("contacts")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("status"))
        .and_then(Value::as_str);
    let wa_id = body
        .get("contacts")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("wa_id"))
        .and_then(Value::as_str);

    let status = match contact_status {
        Some("valid") => ValidationStatus::Active,
        Some(_) => ValidationStatus::Inactive,
        None => ValidationStatus::Invalid,
    };

    let mut details = detail("360dialog_contacts", None, None);
    if let Some(wa_id) = wa_id {
        details.insert("wa_id".to_string(), wa_id.into());
    }
    (status, details)
}

#[async_trait::async_trait]
impl WhatsAppProvider for Dialog360Lookup {
    async fn validate(&self, phone: &str, _identifier: Option<&str>) -> ValidationResult {
        let url = format!("{}/v1/contacts", self.base_url);
        let payload = serde_json::json!({
            "blocking": "wait",
            "contacts": [phone],
            "force_check": false,
        });
        let response = match self
            .client
            .post(&url)
            .header("D360-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ValidationResult::error(Platform::WhatsApp, e.to_string()),
        };

        if !response.status().is_success() {
            warn!(phone, status = %response.status(), "360dialog lookup rejected number");
            return ValidationResult::new(Platform::WhatsApp, ValidationStatus::Invalid);
        }

        match response.json::<Value>().await {
            Ok(body) => {
                let (status, details) = map_dialog360_response(&body);
                ValidationResult::new(Platform::WhatsApp, status).with_details(details)
            }
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
    fn twilio_mobile_line_is_active() {
        let body = json!({"carrier": {"type": "mobile", "name": "Telkomsel"}});
        let (status, details) = map_twilio_response(&body);
        assert_eq!(status, ValidationStatus::Active);
        assert_eq!(details["carrier"], "Telkomsel");
    }

    #[test]
    fn twilio_landline_is_inactive() {
        let body = json!({"carrier": {"type": "landline", "name": "PT Telkom"}});
        let (status, _) = map_twilio_response(&body);
        assert_eq!(status, ValidationStatus::Inactive);
    }

    #[test]
    fn vonage_requires_ok_status_and_mobile() {
        let ok = json!({"status": 0, "current_carrier": {"network_type": "mobile", "name": "XL"}});
        assert_eq!(map_vonage_response(&ok).0, ValidationStatus::Active);

        let bad_status = json!({"status": 3, "current_carrier": {"network_type": "mobile"}});
        assert_eq!(map_vonage_response(&bad_status).0, ValidationStatus::Inactive);

        let landline = json!({"status": 0, "current_carrier": {"network_type": "landline"}});
        assert_eq!(map_vonage_response(&landline).0, ValidationStatus::Inactive);
    }

    #[test]
    fn dialog360_contact_statuses() {
        let valid = json!({"contacts": [{"status": "valid", "wa_id": "628123456789"}]});
        let (status, details) = map_dialog360_response(&valid);
        assert_eq!(status, ValidationStatus::Active);
        assert_eq!(details["wa_id"], "628123456789");

        let invalid = json!({"contacts": [{"status": "invalid"}]});
        assert_eq!(map_dialog360_response(&invalid).0, ValidationStatus::Inactive);

        let empty = json!({"contacts": []});
        assert_eq!(map_dialog360_response(&empty).0, ValidationStatus::Invalid);
    }
}
