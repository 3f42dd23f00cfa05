//! Domain entities. Pure data structures for the core business.
//!
//! No HTTP/SQL/provider types here — these are mapped from adapters.

use crate::domain::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Cache entries older than this many whole days are served as misses.
pub const CACHE_TTL_DAYS: i64 = 7;

/// A single phone record parsed from client input. Immutable after parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneRecord {
    /// Optional free-form label from the input line, truncated to 12 chars.
    pub identifier: Option<String>,
    /// Normalized phone number (see `domain::phone`).
    pub phone_number: String,
    /// The raw line the record was parsed from.
    pub original_input: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    WhatsApp,
    Telegram,
}

/// Outcome of a single provider check for one platform.
///
/// `Unknown` exists for the MTP-backed Telegram provider: platform privacy
/// rules make "no account" and "account hidden from discovery"
/// indistinguishable, and that ambiguity is never coerced to a binary answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Active,
    Inactive,
    Invalid,
    Unknown,
    Error,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Invalid => "invalid",
            Self::Unknown => "unknown",
            Self::Error => "error",
        }
    }
}

/// Result of one provider call. `status = Error` implies `error` is set;
/// `status` is never absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub platform: Platform,
    pub status: ValidationStatus,
    pub validated_at: DateTime<Utc>,
    /// Provider-specific payload (scores, carrier info, profile metadata).
    #[serde(default)]
    pub details: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn new(platform: Platform, status: ValidationStatus) -> Self {
        Self {
            platform,
            status,
            validated_at: Utc::now(),
            details: serde_json::Map::new(),
            error: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Map<String, serde_json::Value>) -> Self {
        self.details = details;
        self
    }

    /// Degraded result for any provider failure (timeout, transport,
    /// malformed body). Details stay empty; the error string is preserved.
    pub fn error(platform: Platform, error: impl Into<String>) -> Self {
        Self {
            platform,
            status: ValidationStatus::Error,
            validated_at: Utc::now(),
            details: serde_json::Map::new(),
            error: Some(error.into()),
        }
    }
}

/// Cached validation results for one phone number, both platforms at once.
/// Partial entries are never written (see the cache port contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub phone_number: String,
    pub whatsapp: Option<ValidationResult>,
    pub telegram: Option<ValidationResult>,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Freshness uses whole-day precision: the hour/minute remainder is
    /// floored, so an entry is still fresh at 6d23h and stale at exactly 7d.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (now - self.cached_at).num_days() < CACHE_TTL_DAYS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(DomainError::Store(format!("unknown job status: {other}"))),
        }
    }
}

/// WhatsApp validation method selected by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhatsAppMethod {
    #[default]
    Standard,
    DeeplinkProfile,
}

impl WhatsAppMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::DeeplinkProfile => "deeplink_profile",
        }
    }
}

impl FromStr for WhatsAppMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "deeplink_profile" => Ok(Self::DeeplinkProfile),
            other => Err(DomainError::InvalidInput(format!(
                "unknown validation method: {other}"
            ))),
        }
    }
}

/// Telegram validation method selected by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelegramMethod {
    #[default]
    Standard,
    Mtp,
    MtpProfile,
}

impl TelegramMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Mtp => "mtp",
            Self::MtpProfile => "mtp_profile",
        }
    }
}

impl FromStr for TelegramMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "mtp" => Ok(Self::Mtp),
            "mtp_profile" => Ok(Self::MtpProfile),
            other => Err(DomainError::InvalidInput(format!(
                "unknown telegram validation method: {other}"
            ))),
        }
    }
}

/// Per-number outcome recorded in the job results. The identifier is the
/// request's own (cache entries never carry one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerNumberResult {
    pub identifier: Option<String>,
    pub phone_number: String,
    pub original_input: String,
    pub whatsapp: Option<ValidationResult>,
    pub telegram: Option<ValidationResult>,
    /// Record-level processing failure (distinct from a per-platform
    /// `status = Error`). Renders as ERROR,ERROR in the CSV export.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processed_at: DateTime<Utc>,
}

/// Aggregated job results. Counters are only ever mutated through `push`
/// so they stay equal to the corresponding sums over `details`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobResults {
    pub whatsapp_active: u32,
    pub telegram_active: u32,
    pub inactive: u32,
    pub errors: u32,
    pub details: Vec<PerNumberResult>,
}

impl JobResults {
    /// Classify one record and append it.
    ///
    /// A record counts as inactive only when every platform that was
    /// requested for this job reports Inactive; a record active on one of
    /// two requested platforms lands in no inactive bucket at all.
    pub fn push(&mut self, detail: PerNumberResult, want_whatsapp: bool, want_telegram: bool) {
        let wa_status = detail.whatsapp.as_ref().map(|r| r.status);
        let tg_status = detail.telegram.as_ref().map(|r| r.status);

        if wa_status == Some(ValidationStatus::Active) {
            self.whatsapp_active += 1;
        }
        if tg_status == Some(ValidationStatus::Active) {
            self.telegram_active += 1;
        }

        let wa_inactive = !want_whatsapp || wa_status == Some(ValidationStatus::Inactive);
        let tg_inactive = !want_telegram || tg_status == Some(ValidationStatus::Inactive);
        if (want_whatsapp || want_telegram) && wa_inactive && tg_inactive {
            self.inactive += 1;
        }

        let wa_error = want_whatsapp && wa_status == Some(ValidationStatus::Error);
        let tg_error = want_telegram && tg_status == Some(ValidationStatus::Error);
        if detail.error.is_some() || wa_error || tg_error {
            self.errors += 1;
        }

        self.details.push(detail);
    }
}

/// A bulk validation job. Mutated in place by the job processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub filename: String,
    pub status: JobStatus,
    pub total_numbers: u32,
    pub processed_numbers: u32,
    pub phone_data: Vec<PhoneRecord>,
    pub validate_whatsapp: bool,
    pub validate_telegram: bool,
    pub whatsapp_method: WhatsAppMethod,
    pub telegram_method: TelegramMethod,
    /// Nil until the job reaches Completed or Failed.
    pub results: Option<JobResults>,
    pub credits_used: i64,
    /// At-most-once settlement guard: flipped atomically with the balance
    /// decrement, never reset.
    pub credits_settled: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: &str,
        tenant_id: &str,
        filename: &str,
        phone_data: Vec<PhoneRecord>,
        validate_whatsapp: bool,
        validate_telegram: bool,
        whatsapp_method: WhatsAppMethod,
        telegram_method: TelegramMethod,
        credits_used: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            tenant_id: tenant_id.to_string(),
            filename: filename.to_string(),
            status: JobStatus::Pending,
            total_numbers: phone_data.len() as u32,
            processed_numbers: 0,
            phone_data,
            validate_whatsapp,
            validate_telegram,
            whatsapp_method,
            telegram_method,
            results: None,
            credits_used,
            credits_settled: false,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Percentage of processed records, rounded to two decimals.
pub fn progress_percentage(processed: u32, total: u32) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let pct = f64::from(processed) * 100.0 / f64::from(total);
    (pct * 100.0).round() / 100.0
}

/// Progress event pushed to subscribers of one job.
///
/// In-flight events carry the just-processed record; the terminal event
/// carries the full results payload (or the failure message).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub status: JobStatus,
    pub processed_numbers: u32,
    pub total_numbers: u32,
    pub progress_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<PerNumberResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<JobResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProgressEvent {
    pub fn processing(
        job_id: &str,
        processed: u32,
        total: u32,
        record: &PhoneRecord,
        last_result: &PerNumberResult,
        results: &JobResults,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Processing,
            processed_numbers: processed,
            total_numbers: total,
            progress_percentage: progress_percentage(processed, total),
            current_phone: Some(record.phone_number.clone()),
            current_identifier: record.identifier.clone(),
            last_result: Some(last_result.clone()),
            results: Some(JobResults {
                // running counters only; details ride on last_result
                details: Vec::new(),
                ..results.clone()
            }),
            error_message: None,
            completed_at: None,
        }
    }

    pub fn completed(
        job_id: &str,
        total: u32,
        results: &JobResults,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Completed,
            processed_numbers: total,
            total_numbers: total,
            progress_percentage: 100.0,
            current_phone: None,
            current_identifier: None,
            last_result: None,
            results: Some(results.clone()),
            error_message: None,
            completed_at: Some(completed_at),
        }
    }

    pub fn failed(job_id: &str, processed: u32, total: u32, error_message: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            status: JobStatus::Failed,
            processed_numbers: processed,
            total_numbers: total,
            progress_percentage: progress_percentage(processed, total),
            current_phone: None,
            current_identifier: None,
            last_result: None,
            results: None,
            error_message: Some(error_message.to_string()),
            completed_at: None,
        }
    }
}

/// Account holder with a credit balance. Balances only change through the
/// ledger port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub api_key: String,
    pub credits: i64,
    pub tenant_id: String,
}

/// Compact job summary handed to the mailer collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub filename: String,
    pub total_numbers: u32,
    pub whatsapp_active: u32,
    pub telegram_active: u32,
    pub inactive: u32,
    pub errors: u32,
    pub credits_used: i64,
}

impl JobSummary {
    pub fn from_job(job: &Job, results: &JobResults) -> Self {
        Self {
            job_id: job.id.clone(),
            filename: job.filename.clone(),
            total_numbers: job.total_numbers,
            whatsapp_active: results.whatsapp_active,
            telegram_active: results.telegram_active,
            inactive: results.inactive,
            errors: results.errors,
            credits_used: job.credits_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(phone: &str) -> PhoneRecord {
        PhoneRecord {
            identifier: None,
            phone_number: phone.to_string(),
            original_input: phone.to_string(),
        }
    }

    fn detail(
        phone: &str,
        wa: Option<ValidationStatus>,
        tg: Option<ValidationStatus>,
    ) -> PerNumberResult {
        PerNumberResult {
            identifier: None,
            phone_number: phone.to_string(),
            original_input: phone.to_string(),
            whatsapp: wa.map(|s| ValidationResult::new(Platform::WhatsApp, s)),
            telegram: tg.map(|s| ValidationResult::new(Platform::Telegram, s)),
            error: None,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn cache_entry_fresh_within_seven_days() {
        let cached_at = Utc::now();
        let entry = CacheEntry {
            phone_number: "+628123456789".to_string(),
            whatsapp: None,
            telegram: None,
            cached_at,
        };

        // 6d23h floors to 6 whole days: hit
        assert!(entry.is_fresh(cached_at + Duration::days(6) + Duration::hours(23)));
        // exactly 7d: miss
        assert!(!entry.is_fresh(cached_at + Duration::days(7)));
        assert!(!entry.is_fresh(cached_at + Duration::days(7) + Duration::seconds(1)));
    }

    #[test]
    fn counters_match_sums_over_details() {
        let mut results = JobResults::default();
        results.push(
            detail(
                "+62811",
                Some(ValidationStatus::Active),
                Some(ValidationStatus::Inactive),
            ),
            true,
            true,
        );
        results.push(
            detail(
                "+62812",
                Some(ValidationStatus::Inactive),
                Some(ValidationStatus::Inactive),
            ),
            true,
            true,
        );
        results.push(
            detail(
                "+62813",
                Some(ValidationStatus::Error),
                Some(ValidationStatus::Active),
            ),
            true,
            true,
        );

        let wa_active = results
            .details
            .iter()
            .filter(|d| d.whatsapp.as_ref().map(|r| r.status) == Some(ValidationStatus::Active))
            .count() as u32;
        let tg_active = results
            .details
            .iter()
            .filter(|d| d.telegram.as_ref().map(|r| r.status) == Some(ValidationStatus::Active))
            .count() as u32;

        assert_eq!(results.whatsapp_active, wa_active);
        assert_eq!(results.telegram_active, tg_active);
        assert_eq!(results.inactive, 1);
        assert_eq!(results.errors, 1);
    }

    #[test]
    fn active_on_one_platform_is_not_inactive() {
        // WhatsApp active + Telegram inactive, both requested: only
        // whatsapp_active increments.
        let mut results = JobResults::default();
        results.push(
            detail(
                "+628123456789",
                Some(ValidationStatus::Active),
                Some(ValidationStatus::Inactive),
            ),
            true,
            true,
        );

        assert_eq!(results.whatsapp_active, 1);
        assert_eq!(results.telegram_active, 0);
        assert_eq!(results.inactive, 0);
        assert_eq!(results.errors, 0);
    }

    #[test]
    fn single_platform_inactive_counts() {
        let mut results = JobResults::default();
        results.push(detail("+62811", Some(ValidationStatus::Inactive), None), true, false);
        assert_eq!(results.inactive, 1);
    }

    #[test]
    fn unknown_status_is_neither_active_nor_inactive() {
        let mut results = JobResults::default();
        results.push(
            detail("+62811", None, Some(ValidationStatus::Unknown)),
            false,
            true,
        );
        assert_eq!(results.telegram_active, 0);
        assert_eq!(results.inactive, 0);
        assert_eq!(results.errors, 0);
    }

    #[test]
    fn progress_percentage_rounds_to_two_decimals() {
        assert_eq!(progress_percentage(1, 3), 33.33);
        assert_eq!(progress_percentage(2, 3), 66.67);
        assert_eq!(progress_percentage(3, 3), 100.0);
        assert_eq!(progress_percentage(0, 0), 100.0);
    }

    #[test]
    fn method_parsing_rejects_unknown_values() {
        assert_eq!(
            "standard".parse::<WhatsAppMethod>().unwrap(),
            WhatsAppMethod::Standard
        );
        assert_eq!(
            "deeplink_profile".parse::<WhatsAppMethod>().unwrap(),
            WhatsAppMethod::DeeplinkProfile
        );
        assert!("premium".parse::<WhatsAppMethod>().is_err());

        assert_eq!(
            "mtp_profile".parse::<TelegramMethod>().unwrap(),
            TelegramMethod::MtpProfile
        );
        assert!("deep".parse::<TelegramMethod>().is_err());
    }

    #[test]
    fn new_job_starts_pending_and_unsettled() {
        let job = Job::new(
            "u1",
            "t1",
            "numbers.csv",
            vec![record("+628123456789")],
            true,
            false,
            WhatsAppMethod::Standard,
            TelegramMethod::Standard,
            1,
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_numbers, 1);
        assert_eq!(job.processed_numbers, 0);
        assert!(!job.credits_settled);
        assert!(job.results.is_none());
    }
}
