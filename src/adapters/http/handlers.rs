//! HTTP request handlers for the validation REST API.
//!
//! Client input errors surface as 4xx before any job is created; job
//! failures after scheduling are only visible via the status endpoints and
//! the progress stream.

use crate::adapters::http::csv_io;
use crate::domain::{
    phone::parse_phone_batch, progress_percentage, DomainError, Job, JobStatus, TelegramMethod,
    User, WhatsAppMethod,
};
use crate::ports::{CreditLedgerPort, JobStorePort};
use crate::usecases::{JobQueue, ProgressHub, QuickCheckInput, QuickCheckService};
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStorePort>,
    pub ledger: Arc<dyn CreditLedgerPort>,
    pub quick_check: Arc<QuickCheckService>,
    pub queue: JobQueue,
    pub progress: Arc<ProgressHub>,
    pub limits: Limits,
}

/// Request limits, from configuration.
#[derive(Clone, Copy)]
pub struct Limits {
    pub max_upload_bytes: usize,
    pub bulk_max_numbers: usize,
    pub credits_per_platform: i64,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_credits: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_credits: Option<i64>,
}

/// DomainError -> HTTP response mapping.
pub struct ApiError(DomainError);

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, required, available) = match &self.0 {
            DomainError::InvalidInput(_) => (StatusCode::BAD_REQUEST, None, None),
            DomainError::InsufficientCredits {
                required,
                available,
            } => (StatusCode::PAYMENT_REQUIRED, Some(*required), Some(*available)),
            DomainError::JobNotFound(_) => (StatusCode::NOT_FOUND, None, None),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, None, None),
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %self.0, "request failed");
        }
        let body = ErrorResponse {
            error: self.0.to_string(),
            required_credits: required,
            available_credits: available,
        };
        (status, Json(body)).into_response()
    }
}

// ── quick check ─────────────────────────────────────────────────────────

/// Request body for POST /api/validation/quick-check.
#[derive(Debug, Deserialize)]
pub struct QuickCheckRequest {
    pub phone_inputs: Vec<String>,
    #[serde(default)]
    pub validate_whatsapp: bool,
    #[serde(default)]
    pub validate_telegram: bool,
    #[serde(default)]
    pub validation_method: Option<String>,
    #[serde(default)]
    pub telegram_validation_method: Option<String>,
}

fn parse_methods(
    whatsapp: Option<&str>,
    telegram: Option<&str>,
) -> Result<(WhatsAppMethod, TelegramMethod), DomainError> {
    let whatsapp_method = match whatsapp {
        Some(s) => s.parse()?,
        None => WhatsAppMethod::default(),
    };
    let telegram_method = match telegram {
        Some(s) => s.parse()?,
        None => TelegramMethod::default(),
    };
    Ok((whatsapp_method, telegram_method))
}

/// POST /api/validation/quick-check
pub async fn post_quick_check(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(body): Json<QuickCheckRequest>,
) -> Result<Response, ApiError> {
    let (whatsapp_method, telegram_method) = parse_methods(
        body.validation_method.as_deref(),
        body.telegram_validation_method.as_deref(),
    )?;

    let outcome = state
        .quick_check
        .run(
            &user,
            QuickCheckInput {
                phone_inputs: body.phone_inputs,
                validate_whatsapp: body.validate_whatsapp,
                validate_telegram: body.validate_telegram,
                whatsapp_method,
                telegram_method,
            },
        )
        .await?;

    Ok(Json(outcome).into_response())
}

// ── bulk check ──────────────────────────────────────────────────────────

/// Response body for POST /api/validation/bulk-check.
#[derive(Debug, Serialize)]
pub struct BulkCheckResponse {
    pub job_id: String,
    pub total_numbers: u32,
    pub duplicates_removed: usize,
    pub estimated_credits: i64,
    pub status: &'static str,
}

#[derive(Default)]
struct BulkForm {
    filename: String,
    file_bytes: Vec<u8>,
    validate_whatsapp: bool,
    validate_telegram: bool,
    validation_method: Option<String>,
    telegram_validation_method: Option<String>,
}

fn form_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes"
    )
}

async fn read_bulk_form(
    mut multipart: Multipart,
    max_upload_bytes: usize,
) -> Result<BulkForm, DomainError> {
    let mut form = BulkForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DomainError::InvalidInput(format!("unreadable multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                form.filename = field.file_name().unwrap_or("upload.csv").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| DomainError::InvalidInput(format!("unreadable file: {e}")))?;
                if bytes.len() > max_upload_bytes {
                    return Err(DomainError::InvalidInput(format!(
                        "file exceeds {max_upload_bytes} byte limit"
                    )));
                }
                form.file_bytes = bytes.to_vec();
            }
            "validate_whatsapp" => {
                form.validate_whatsapp = form_bool(&field.text().await.unwrap_or_default());
            }
            "validate_telegram" => {
                form.validate_telegram = form_bool(&field.text().await.unwrap_or_default());
            }
            "validation_method" => {
                let text = field.text().await.unwrap_or_default();
                if !text.trim().is_empty() {
                    form.validation_method = Some(text.trim().to_string());
                }
            }
            "telegram_validation_method" => {
                let text = field.text().await.unwrap_or_default();
                if !text.trim().is_empty() {
                    form.telegram_validation_method = Some(text.trim().to_string());
                }
            }
            _ => {}
        }
    }

    if form.file_bytes.is_empty() {
        return Err(DomainError::InvalidInput(
            "missing or empty file field".to_string(),
        ));
    }
    Ok(form)
}

fn estimate_credits(
    record_count: usize,
    whatsapp: bool,
    telegram: bool,
    per_platform: i64,
) -> i64 {
    let platforms = i64::from(whatsapp) + i64::from(telegram);
    record_count as i64 * platforms * per_platform
}

fn check_extension(filename: &str) -> Result<(), DomainError> {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".csv") || lower.ends_with(".txt") {
        return Ok(());
    }
    if lower.ends_with(".xls") || lower.ends_with(".xlsx") {
        return Err(DomainError::InvalidInput(
            "spreadsheet uploads are not supported; export the sheet as CSV".to_string(),
        ));
    }
    Err(DomainError::InvalidInput(format!(
        "unsupported file type: {filename}"
    )))
}

/// POST /api/validation/bulk-check
///
/// Multipart upload; responds as soon as the job is persisted and queued.
pub async fn post_bulk_check(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = read_bulk_form(multipart, state.limits.max_upload_bytes).await?;
    check_extension(&form.filename)?;

    if !form.validate_whatsapp && !form.validate_telegram {
        return Err(DomainError::InvalidInput(
            "select at least one platform to validate".to_string(),
        )
        .into());
    }

    let (whatsapp_method, telegram_method) = parse_methods(
        form.validation_method.as_deref(),
        form.telegram_validation_method.as_deref(),
    )?;

    let inputs = csv_io::extract_phone_inputs(&form.file_bytes)?;
    let (records, duplicates_removed) = parse_phone_batch(&inputs);

    if records.is_empty() {
        return Err(
            DomainError::InvalidInput("no valid phone numbers in file".to_string()).into(),
        );
    }
    if records.len() > state.limits.bulk_max_numbers {
        return Err(DomainError::InvalidInput(format!(
            "bulk check accepts at most {} unique numbers, got {}",
            state.limits.bulk_max_numbers,
            records.len()
        ))
        .into());
    }

    let estimated_credits = estimate_credits(
        records.len(),
        form.validate_whatsapp,
        form.validate_telegram,
        state.limits.credits_per_platform,
    );
    state.ledger.reserve(&user.id, estimated_credits).await?;

    let job = Job::new(
        &user.id,
        &user.tenant_id,
        &form.filename,
        records,
        form.validate_whatsapp,
        form.validate_telegram,
        whatsapp_method,
        telegram_method,
        estimated_credits,
    );
    state.store.create_job(&job).await?;

    if let Err(e) = state.queue.enqueue(&job.id).await {
        // the job exists but will never run; record that
        let _ = state.store.fail_job(&job.id, &e.to_string()).await;
        return Err(e.into());
    }

    info!(
        job_id = %job.id,
        user_id = %user.id,
        total = job.total_numbers,
        duplicates_removed,
        credits = estimated_credits,
        "bulk job scheduled"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(BulkCheckResponse {
            job_id: job.id,
            total_numbers: job.total_numbers,
            duplicates_removed,
            estimated_credits,
            status: "processing_started",
        }),
    )
        .into_response())
}

// ── job retrieval ───────────────────────────────────────────────────────

async fn load_owned_job(state: &AppState, user: &User, job_id: &str) -> Result<Job, ApiError> {
    match state.store.get_job(job_id).await? {
        Some(job) if job.user_id == user.id => Ok(job),
        _ => Err(DomainError::JobNotFound(job_id.to_string()).into()),
    }
}

/// GET /api/jobs/{id} — the full job document, phone data included.
pub async fn get_job(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job = load_owned_job(&state, &user, &job_id).await?;
    Ok(Json(job).into_response())
}

/// Compact progress view for polling.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub processed_numbers: u32,
    pub total_numbers: u32,
    pub progress_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// GET /api/jobs/{id}/status
pub async fn get_job_status(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job = load_owned_job(&state, &user, &job_id).await?;
    Ok(Json(JobStatusResponse {
        progress_percentage: progress_percentage(job.processed_numbers, job.total_numbers),
        job_id: job.id,
        status: job.status,
        processed_numbers: job.processed_numbers,
        total_numbers: job.total_numbers,
        error_message: job.error_message,
        completed_at: job.completed_at,
    })
    .into_response())
}

/// GET /api/jobs/{id}/download — results as CSV.
pub async fn download_job(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job = load_owned_job(&state, &user, &job_id).await?;
    let Some(results) = &job.results else {
        return Err(DomainError::InvalidInput(format!(
            "job {} has no results yet (status: {})",
            job.id,
            job.status.as_str()
        ))
        .into());
    };

    let csv = csv_io::render_results_csv(&results.details)?;
    let disposition = format!("attachment; filename=\"{}-results.csv\"", job.id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

/// POST /api/jobs/{id}/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job = load_owned_job(&state, &user, &job_id).await?;
    if matches!(job.status, JobStatus::Completed | JobStatus::Failed) {
        return Err(DomainError::InvalidInput(format!(
            "job {} already finished ({})",
            job.id,
            job.status.as_str()
        ))
        .into());
    }

    let cancelled = state.queue.cancel(&job_id).await;
    if !cancelled {
        return Err(DomainError::JobNotFound(job_id).into());
    }
    info!(job_id, user_id = %user.id, "job cancellation requested");
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({"status": "cancelling"}))).into_response())
}

/// DELETE /api/jobs/{id}
pub async fn delete_job(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let deleted = state.store.delete_job(&job_id, &user.id).await?;
    if !deleted {
        return Err(DomainError::JobNotFound(job_id).into());
    }
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ── health ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health — unauthenticated liveness probe.
pub async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
