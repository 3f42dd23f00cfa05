//! Server-Sent Events bridge for job progress.
//!
//! GET /api/jobs/{id}/events first emits a snapshot of the job's current
//! state (so late subscribers of a finished job still get an answer), then
//! relays the progress hub's broadcast stream until the job's channel
//! closes.

use crate::adapters::http::handlers::{ApiError, AppState};
use crate::domain::{progress_percentage, DomainError, ProgressEvent, User};
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Extension,
};
use futures::stream::Stream;
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

fn snapshot_event(job: &crate::domain::Job) -> ProgressEvent {
    ProgressEvent {
        job_id: job.id.clone(),
        status: job.status,
        processed_numbers: job.processed_numbers,
        total_numbers: job.total_numbers,
        progress_percentage: progress_percentage(job.processed_numbers, job.total_numbers),
        current_phone: None,
        current_identifier: None,
        last_result: None,
        results: job.results.clone(),
        error_message: job.error_message.clone(),
        completed_at: job.completed_at,
    }
}

/// GET /api/jobs/{id}/events
pub async fn job_events(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let job = match state.store.get_job(&job_id).await? {
        Some(job) if job.user_id == user.id => job,
        _ => return Err(DomainError::JobNotFound(job_id).into()),
    };

    let receiver = state.progress.subscribe(&job.id).await;
    debug!(job_id = %job.id, "progress stream subscribed");

    let snapshot = futures::stream::once(async move {
        Event::default().event("snapshot").json_data(snapshot_event(&job))
    });

    let updates = BroadcastStream::new(receiver).filter_map(|item| async move {
        match item {
            Ok(event) => Some(Event::default().event("progress").json_data(event)),
            // lagged subscriber: skip the gap, keep streaming
            Err(_) => None,
        }
    });

    Ok(Sse::new(snapshot.chain(updates)).keep_alive(KeepAlive::default()))
}
