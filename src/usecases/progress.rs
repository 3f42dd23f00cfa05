//! Progress hub: per-job broadcast channels for real-time progress events.
//!
//! Delivery is at-most-once and best-effort; a publish with no subscribers
//! (or a lagging subscriber) never affects job processing. Successive
//! events for one job carry non-decreasing `processed_numbers`.

use crate::domain::ProgressEvent;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Buffered events per job channel. Slow subscribers past this lag lose the
/// oldest events (broadcast semantics), which is acceptable for progress.
const CHANNEL_CAPACITY: usize = 64;

/// In-process progress fan-out, shared across the job processor and the
/// streaming transport.
#[derive(Default)]
pub struct ProgressHub {
    channels: RwLock<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a job's progress stream, creating the channel if the job
    /// has not published yet.
    pub async fn subscribe(&self, job_id: &str) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(job_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event to a job's subscribers. No-op when nobody listens.
    pub async fn publish(&self, job_id: &str, event: ProgressEvent) {
        let channels = self.channels.read().await;
        if let Some(sender) = channels.get(job_id) {
            // send only fails with zero receivers; that's fine
            let _ = sender.send(event);
        }
    }

    /// Drop a finished job's channel. Existing receivers drain whatever was
    /// buffered, then see the stream end.
    pub async fn close(&self, job_id: &str) {
        let mut channels = self.channels.write().await;
        if channels.remove(job_id).is_some() {
            debug!(job_id, "progress channel closed");
        }
    }
}
