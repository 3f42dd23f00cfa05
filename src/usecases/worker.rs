//! Async job worker: reads job ids from an mpsc channel and runs the
//! processor with bounded concurrency.
//!
//! Each job gets a cancellation token, registered so the API can cancel an
//! in-flight job. Errors inside a spawned processor are logged, never
//! propagated (nothing awaits a scheduled job).

use crate::domain::DomainError;
use crate::usecases::job_processor::JobProcessor;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Buffered job ids between the upload handler and the worker. Bounded so a
/// burst of uploads applies backpressure instead of growing without limit.
pub const DEFAULT_QUEUE_SIZE: usize = 256;

type CancellationMap = Arc<Mutex<HashMap<String, CancellationToken>>>;

/// Handle used by the transport side: enqueue new jobs, cancel running ones.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<String>,
    cancellations: CancellationMap,
}

impl JobQueue {
    /// Schedule a job for background processing.
    pub async fn enqueue(&self, job_id: &str) -> Result<(), DomainError> {
        let token = CancellationToken::new();
        self.cancellations
            .lock()
            .await
            .insert(job_id.to_string(), token);
        self.tx
            .send(job_id.to_string())
            .await
            .map_err(|_| DomainError::Store("job queue closed".to_string()))
    }

    /// Cancel a queued or in-flight job. Returns false when the job is not
    /// tracked (already finished, or never scheduled here).
    pub async fn cancel(&self, job_id: &str) -> bool {
        let cancellations = self.cancellations.lock().await;
        match cancellations.get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Job worker. Consumes the queue and processes jobs via JobProcessor.
pub struct JobWorker {
    processor: Arc<JobProcessor>,
    rx: mpsc::Receiver<String>,
    cancellations: CancellationMap,
    max_concurrent: usize,
}

impl JobWorker {
    /// Build the worker plus its queue handle. `max_concurrent` caps how
    /// many jobs run at once (bounded pool; provider calls under load stay
    /// bounded too).
    pub fn new(processor: Arc<JobProcessor>, max_concurrent: usize) -> (Self, JobQueue) {
        let (tx, rx) = mpsc::channel(DEFAULT_QUEUE_SIZE);
        let cancellations: CancellationMap = Arc::new(Mutex::new(HashMap::new()));
        let queue = JobQueue {
            tx,
            cancellations: Arc::clone(&cancellations),
        };
        (
            Self {
                processor,
                rx,
                cancellations,
                max_concurrent,
            },
            queue,
        )
    }

    /// Run the worker. Processes until the queue handle is dropped.
    pub async fn run(mut self) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        while let Some(job_id) = self.rx.recv().await {
            let token = {
                let cancellations = self.cancellations.lock().await;
                cancellations
                    .get(&job_id)
                    .cloned()
                    .unwrap_or_default()
            };
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(job_id, "worker semaphore closed, dropping job");
                    continue;
                }
            };
            let processor = Arc::clone(&self.processor);
            let cancellations = Arc::clone(&self.cancellations);

            tokio::spawn(async move {
                let _permit = permit;
                info!(job_id = %job_id, "job picked up");
                let run = std::panic::AssertUnwindSafe(processor.process(&job_id, token));
                if let Err(panic) = run.catch_unwind().await {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(job_id = %job_id, panic = %message, "job processor panicked");
                }
                cancellations.lock().await.remove(&job_id);
            });
        }

        info!("job worker finished (queue closed)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_registers_cancellation_token() {
        let (tx, mut _rx) = mpsc::channel(4);
        let queue = JobQueue {
            tx,
            cancellations: Arc::new(Mutex::new(HashMap::new())),
        };

        queue.enqueue("job-1").await.unwrap();
        assert!(queue.cancel("job-1").await);
        assert!(!queue.cancel("job-2").await);
    }

    #[tokio::test]
    async fn enqueue_fails_when_worker_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let queue = JobQueue {
            tx,
            cancellations: Arc::new(Mutex::new(HashMap::new())),
        };

        let err = queue.enqueue("job-1").await.unwrap_err();
        assert!(matches!(err, DomainError::Store(_)));
    }
}
