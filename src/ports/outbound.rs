//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{
    CacheEntry, DomainError, Job, JobResults, JobSummary, User, ValidationResult,
};
use chrono::{DateTime, Utc};

/// Whether a capability adapter talks to a real backend or simulates one.
///
/// Unconfigured capabilities are still constructed (as their simulated
/// variant) so callers can always ask which one they got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityMode {
    Live,
    Simulated,
}

/// WhatsApp presence check for one number.
///
/// Infallible by contract: any failure (timeout, transport error, malformed
/// body) degrades to a `status = Error` result with the cause attached, so
/// one bad number can never sink a batch.
#[async_trait::async_trait]
pub trait WhatsAppProvider: Send + Sync {
    /// Check one normalized phone number. `identifier` is a request-scoped
    /// hint some session-backed lookups can use; most variants ignore it.
    async fn validate(&self, phone: &str, identifier: Option<&str>) -> ValidationResult;

    fn mode(&self) -> CapabilityMode;
}

/// Telegram presence check for one number. Same degrade-to-Error contract
/// as [`WhatsAppProvider`].
#[async_trait::async_trait]
pub trait TelegramProvider: Send + Sync {
    async fn validate(&self, phone: &str) -> ValidationResult;

    fn mode(&self) -> CapabilityMode;
}

/// Job persistence port.
#[async_trait::async_trait]
pub trait JobStorePort: Send + Sync {
    async fn create_job(&self, job: &Job) -> Result<(), DomainError>;

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, DomainError>;

    /// Claim a job for processing: set status to Processing, stamp
    /// updated_at, and return the fresh record. Errors if the job is gone
    /// (the job-fatal path).
    async fn claim_job(&self, job_id: &str) -> Result<Job, DomainError>;

    /// Persist incremental progress. `processed` is monotonically
    /// non-decreasing per job.
    async fn update_progress(&self, job_id: &str, processed: u32) -> Result<(), DomainError>;

    async fn complete_job(
        &self,
        job_id: &str,
        results: &JobResults,
        completed_at: DateTime<Utc>,
    ) -> Result<(), DomainError>;

    async fn fail_job(&self, job_id: &str, error_message: &str) -> Result<(), DomainError>;

    /// Explicit user deletion. Returns false when no job matched.
    async fn delete_job(&self, job_id: &str, user_id: &str) -> Result<bool, DomainError>;

    /// Fold a quick-check outcome into the user's daily rollup row.
    async fn append_quick_check_rollup(
        &self,
        user_id: &str,
        day: &str,
        results: &JobResults,
    ) -> Result<(), DomainError>;
}

/// Validation cache port. Best-effort by contract: callers treat any error
/// as a miss and never fail a validation request over it.
#[async_trait::async_trait]
pub trait CacheStorePort: Send + Sync {
    async fn get(&self, phone: &str) -> Result<Option<CacheEntry>, DomainError>;

    /// Overwrite the entry for `phone`. Only called when both platforms were
    /// validated in the same pass; partial entries are never written.
    async fn put(
        &self,
        phone: &str,
        whatsapp: &ValidationResult,
        telegram: &ValidationResult,
    ) -> Result<(), DomainError>;
}

/// Credit balance mutations. The only path that ever decrements a balance.
#[async_trait::async_trait]
pub trait CreditLedgerPort: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, DomainError>;

    async fn get_user_by_api_key(&self, api_key: &str) -> Result<Option<User>, DomainError>;

    /// Sufficiency pre-check before a job is created. Errors with
    /// `InsufficientCredits { required, available }` when the balance is
    /// short; does not hold anything.
    async fn reserve(&self, user_id: &str, amount: i64) -> Result<(), DomainError>;

    /// Settle a completed job's credits at most once. Flips the job's
    /// settled flag and decrements the balance in one transaction; returns
    /// whether this call performed the settlement (false = already settled,
    /// nothing decremented).
    async fn settle(&self, job_id: &str, user_id: &str, amount: i64) -> Result<bool, DomainError>;

    /// Immediate charge for a synchronous check, keyed by a per-request
    /// reference. Returns the remaining balance.
    async fn debit(&self, reference: &str, user_id: &str, amount: i64)
        -> Result<i64, DomainError>;

    /// Top-up path: only ever adds. Must not race `settle`.
    async fn credit_back(&self, user_id: &str, amount: i64) -> Result<(), DomainError>;

    /// Create or update a user row (admin/provisioning surface).
    async fn upsert_user(&self, user: &User) -> Result<(), DomainError>;
}

/// Usage/audit trail. Best-effort: write failures are logged by callers,
/// never propagated.
#[async_trait::async_trait]
pub trait UsageLogPort: Send + Sync {
    async fn record(
        &self,
        user_id: &str,
        reference: &str,
        action: &str,
        credits: i64,
        detail: &str,
    ) -> Result<(), DomainError>;
}

/// Outbound mail collaborator. Fire-and-forget from the pipeline's point of
/// view; body construction lives entirely behind this port.
#[async_trait::async_trait]
pub trait MailerPort: Send + Sync {
    async fn send_job_completion(
        &self,
        address: &str,
        username: &str,
        summary: &JobSummary,
    ) -> Result<(), DomainError>;

    async fn send_low_credit_alert(
        &self,
        address: &str,
        username: &str,
        remaining_credits: i64,
    ) -> Result<(), DomainError>;

    fn mode(&self) -> CapabilityMode;
}
