//! Domain errors. Used by ports and use cases.
//!
//! Adapters map infrastructure errors into these.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Mailer error: {0}")]
    Mailer(String),

    /// Client input rejected before a job is created (bad file, unknown
    /// method string, empty input, over-limit batch).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Pre-flight credit check failed. Carries both sides so the client can
    /// see exactly how much is missing.
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// An in-flight job was cancelled via its cancellation token.
    #[error("job cancelled")]
    Cancelled,
}
