//! Statistical Telegram heuristic: calling-code penetration table plus
//! jitter.
//!
//! This is explicitly NOT an existence check — Telegram exposes no anonymous
//! lookup. Results are probabilistic, marked `confidence: low`, and the
//! adapter reports itself as Simulated so callers can tell. Real answers
//! need the MTP-backed provider.

use crate::domain::{Platform, ValidationResult, ValidationStatus};
use crate::ports::{CapabilityMode, TelegramProvider};
use rand::Rng;

/// Rough share of mobile users with a Telegram account, by calling code.
/// Longest prefix wins; unlisted codes use the fallback rate.
const PENETRATION: &[(&str, f64)] = &[
    ("62", 0.63),  // Indonesia
    ("98", 0.79),  // Iran
    ("7", 0.71),   // Russia/Kazakhstan
    ("91", 0.32),  // India
    ("55", 0.45),  // Brazil
    ("234", 0.27), // Nigeria
    ("380", 0.68), // Ukraine
    ("1", 0.12),   // NANP
    ("44", 0.24),  // UK
    ("49", 0.21),  // Germany
];

const FALLBACK_RATE: f64 = 0.25;
const JITTER: f64 = 0.10;

/// Longest-prefix penetration rate for a digit string (no leading `+`).
pub(crate) fn penetration_for(digits: &str) -> f64 {
    PENETRATION
        .iter()
        .filter(|(prefix, _)| digits.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map_or(FALLBACK_RATE, |(_, rate)| *rate)
}

pub struct StatisticalTelegram;

impl StatisticalTelegram {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StatisticalTelegram {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TelegramProvider for StatisticalTelegram {
    async fn validate(&self, phone: &str) -> ValidationResult {
        let digits = phone.trim_start_matches('+');
        let base = penetration_for(digits);

        let (probability, active) = {
            let mut rng = rand::thread_rng();
            let probability = (base + rng.gen_range(-JITTER..JITTER)).clamp(0.02, 0.98);
            (probability, rng.gen_bool(probability))
        };

        let status = if active {
            ValidationStatus::Active
        } else {
            ValidationStatus::Inactive
        };

        let mut details = serde_json::Map::new();
        details.insert("method".to_string(), "statistical".into());
        details.insert("confidence".to_string(), "low".into());
        details.insert("penetration".to_string(), base.into());
        details.insert(
            "probability".to_string(),
            ((probability * 100.0).round() / 100.0).into(),
        );

        ValidationResult::new(Platform::Telegram, status).with_details(details)
    }

    fn mode(&self) -> CapabilityMode {
        CapabilityMode::Simulated
    }
}
