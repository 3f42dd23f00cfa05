//! Application use cases. Orchestrate domain logic via ports.

pub mod job_processor;
pub mod pipeline;
pub mod progress;
pub mod quick_check;
pub mod worker;

pub use job_processor::JobProcessor;
pub use pipeline::{ProviderRegistry, ValidationPipeline, ValidationRequest};
pub use progress::ProgressHub;
pub use quick_check::{QuickCheckInput, QuickCheckOutcome, QuickCheckService};
pub use worker::{JobQueue, JobWorker};
