//! Free WhatsApp check: scores indicator strings on the public wa.me send
//! page. No API contract exists for this, so the scoring is a heuristic over
//! markers that appear when a number is registered.
//!
//! Every failure (timeout, transport, non-UTF8 body) degrades to a
//! `status = Error` result; one bad number never raises.

use crate::domain::{Platform, ValidationResult, ValidationStatus};
use crate::ports::{CapabilityMode, WhatsAppProvider};
use std::time::Duration;
use tracing::debug;

const SEND_PAGE_URL: &str = "https://api.whatsapp.com/send/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
// The send page is rendered differently for plain curl-like agents.
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Marker shown when the number is not registered; checked before scoring.
const INVALID_MARKER: &str = "Phone number shared via url is invalid";

/// Weighted markers that show up on the chat page of a registered number.
const INDICATORS: &[(&str, u32)] = &[
    ("Continue to Chat", 2),
    ("use WhatsApp Web", 1),
    ("Don't have WhatsApp yet?", 1),
    ("action=\"send\"", 1),
    ("og:image", 1),
];

/// Score at or above which the number is considered Active with an account
/// type guess; the lower threshold yields Active with type unknown.
const SCORE_CONFIRMED: u32 = 4;
const SCORE_LIKELY: u32 = 2;

/// Sum the weights of the indicators present in the page body.
pub(crate) fn score_page(body: &str) -> u32 {
    INDICATORS
        .iter()
        .filter(|(marker, _)| body.contains(marker))
        .map(|(_, weight)| weight)
        .sum()
}

/// Guess the account type from keywords on a confirmed page.
pub(crate) fn account_type_hint(body: &str) -> &'static str {
    if body.contains("WhatsApp Business") {
        "business"
    } else if body.contains("Chat with") {
        "personal"
    } else {
        "unknown"
    }
}

/// Anonymous web-page heuristic provider (the "free" variant).
pub struct WebHeuristicWhatsApp {
    client: reqwest::Client,
    endpoint: String,
}

impl WebHeuristicWhatsApp {
    pub fn new() -> Self {
        Self::with_endpoint(SEND_PAGE_URL.to_string())
    }

    /// Endpoint override, used by tests and self-hosted mirrors.
    pub fn with_endpoint(endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client, endpoint }
    }

    fn classify(body: &str) -> (ValidationStatus, u32, &'static str) {
        if body.contains(INVALID_MARKER) {
            return (ValidationStatus::Inactive, 0, "unknown");
        }
        let score = score_page(body);
        if score >= SCORE_CONFIRMED {
            (ValidationStatus::Active, score, account_type_hint(body))
        } else if score >= SCORE_LIKELY {
            (ValidationStatus::Active, score, "unknown")
        } else {
            (ValidationStatus::Inactive, score, "unknown")
        }
    }
}

impl Default for WebHeuristicWhatsApp {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WhatsAppProvider for WebHeuristicWhatsApp {
    async fn validate(&self, phone: &str, _identifier: Option<&str>) -> ValidationResult {
        let digits = phone.trim_start_matches('+');
        let url = format!(
            "{}?phone={}&text&type=phone_number&app_absent=0",
            self.endpoint, digits
        );

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return ValidationResult::error(Platform::WhatsApp, e.to_string()),
        };

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return ValidationResult::error(Platform::WhatsApp, e.to_string()),
        };

        let (status, score, account_type) = Self::classify(&body);
        debug!(phone, score, status = status.as_str(), "web heuristic scored");

        let mut details = serde_json::Map::new();
        details.insert("method".to_string(), "web_heuristic".into());
        details.insert("score".to_string(), score.into());
        details.insert("account_type".to_string(), account_type.into());

        ValidationResult::new(Platform::WhatsApp, status).with_details(details)
    }

    fn mode(&self) -> CapabilityMode {
        CapabilityMode::Live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_page_scores_confirmed_with_type() {
        let body = "Continue to Chat ... use WhatsApp Web ... Don't have WhatsApp yet? \
                    <form action=\"send\"> <meta property=\"og:image\"> WhatsApp Business";
        assert!(score_page(body) >= SCORE_CONFIRMED);
        assert_eq!(account_type_hint(body), "business");

        let (status, _, account_type) = WebHeuristicWhatsApp::classify(body);
        assert_eq!(status, ValidationStatus::Active);
        assert_eq!(account_type, "business");
    }

    #[test]
    fn partial_page_is_active_with_unknown_type() {
        let body = "Continue to Chat and nothing else";
        let (status, score, account_type) = WebHeuristicWhatsApp::classify(body);
        assert_eq!(score, 2);
        assert_eq!(status, ValidationStatus::Active);
        assert_eq!(account_type, "unknown");
    }

    #[test]
    fn bare_page_is_inactive() {
        let (status, score, _) = WebHeuristicWhatsApp::classify("<html>nothing here</html>");
        assert_eq!(score, 0);
        assert_eq!(status, ValidationStatus::Inactive);
    }

    #[test]
    fn invalid_marker_short_circuits_to_inactive() {
        // the invalid page still contains generic chrome that would score
        let body = "Phone number shared via url is invalid. use WhatsApp Web og:image \
                    Continue to Chat";
        let (status, score, _) = WebHeuristicWhatsApp::classify(body);
        assert_eq!(status, ValidationStatus::Inactive);
        assert_eq!(score, 0);
    }

    #[test]
    fn personal_chat_page_hints_personal() {
        let body = "Continue to Chat use WhatsApp Web action=\"send\" Chat with Budi";
        let (status, _, account_type) = WebHeuristicWhatsApp::classify(body);
        assert_eq!(status, ValidationStatus::Active);
        assert_eq!(account_type, "personal");
    }
}
