//! Core domain layer. No external I/O dependencies.
//!
//! Entities and business rules live here. Dependencies flow inward.

pub mod entities;
pub mod errors;
pub mod phone;

pub use entities::{
    progress_percentage, CacheEntry, Job, JobResults, JobStatus, JobSummary, PerNumberResult,
    PhoneRecord, Platform, ProgressEvent, TelegramMethod, User, ValidationResult,
    ValidationStatus, WhatsAppMethod, CACHE_TTL_DAYS,
};
pub use errors::DomainError;
