//! Bulk job state machine: Pending -> Processing -> {Completed | Failed}.
//!
//! - The unit of failure is the phone record, not the job: provider errors
//!   are classified into the results and the loop keeps going
//! - Job-fatal errors (claim/load failures, cancellation) mark the job
//!   Failed with the cause verbatim
//! - Credit settlement is at-most-once via the ledger's check-and-set
//! - Completion email, low-credit alert and the usage log entry are
//!   best-effort side effects: logged on failure, never propagated

use crate::domain::{
    DomainError, Job, JobResults, JobSummary, ProgressEvent,
};
use crate::ports::{CreditLedgerPort, JobStorePort, MailerPort, UsageLogPort};
use crate::usecases::pipeline::{ValidationPipeline, ValidationRequest};
use crate::usecases::progress::ProgressHub;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Job processor. One instance is shared by all worker tasks.
pub struct JobProcessor {
    store: Arc<dyn JobStorePort>,
    pipeline: Arc<ValidationPipeline>,
    ledger: Arc<dyn CreditLedgerPort>,
    usage: Arc<dyn UsageLogPort>,
    mailer: Arc<dyn MailerPort>,
    progress: Arc<ProgressHub>,
    /// Courtesy delay between records, politeness to upstream providers.
    record_delay: Duration,
    /// Balance at or below this triggers the low-credit alert.
    low_credit_threshold: i64,
}

impl JobProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStorePort>,
        pipeline: Arc<ValidationPipeline>,
        ledger: Arc<dyn CreditLedgerPort>,
        usage: Arc<dyn UsageLogPort>,
        mailer: Arc<dyn MailerPort>,
        progress: Arc<ProgressHub>,
        record_delay: Duration,
        low_credit_threshold: i64,
    ) -> Self {
        Self {
            store,
            pipeline,
            ledger,
            usage,
            mailer,
            progress,
            record_delay,
            low_credit_threshold,
        }
    }

    /// Process one job to a terminal state. Never returns an error: fatal
    /// failures are recorded on the job itself, since nothing awaits a
    /// scheduled job synchronously.
    pub async fn process(&self, job_id: &str, cancel: CancellationToken) {
        match self.run(job_id, &cancel).await {
            Ok(()) => {}
            Err(e) => {
                let message = e.to_string();
                warn!(job_id, error = %message, "job failed");
                if let Err(store_err) = self.store.fail_job(job_id, &message).await {
                    error!(job_id, error = %store_err, "could not persist job failure");
                }
                let (processed, total) = match self.store.get_job(job_id).await {
                    Ok(Some(job)) => (job.processed_numbers, job.total_numbers),
                    _ => (0, 0),
                };
                self.progress
                    .publish(job_id, ProgressEvent::failed(job_id, processed, total, &message))
                    .await;
                self.progress.close(job_id).await;
            }
        }
    }

    async fn run(&self, job_id: &str, cancel: &CancellationToken) -> Result<(), DomainError> {
        let job = self.store.claim_job(job_id).await?;
        info!(
            job_id,
            user_id = %job.user_id,
            total = job.total_numbers,
            whatsapp = job.validate_whatsapp,
            telegram = job.validate_telegram,
            "job claimed"
        );

        let request = ValidationRequest {
            whatsapp: job.validate_whatsapp,
            telegram: job.validate_telegram,
            whatsapp_method: job.whatsapp_method,
            telegram_method: job.telegram_method,
        };

        let total = job.phone_data.len() as u32;
        let mut results = JobResults::default();

        for (idx, record) in job.phone_data.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(DomainError::Cancelled);
            }

            let detail = self.pipeline.validate_number(record, &request).await;
            let processed = idx as u32 + 1;
            let last = detail.clone();
            results.push(detail, request.whatsapp, request.telegram);

            // Incremental progress is best-effort per record; the next write
            // catches up, and completion persists the authoritative state.
            if let Err(e) = self.store.update_progress(job_id, processed).await {
                warn!(job_id, processed, error = %e, "progress persist failed");
            }

            self.progress
                .publish(
                    job_id,
                    ProgressEvent::processing(job_id, processed, total, record, &last, &results),
                )
                .await;

            if processed < total {
                tokio::time::sleep(self.record_delay).await;
            }
        }

        let completed_at = chrono::Utc::now();
        self.store
            .complete_job(job_id, &results, completed_at)
            .await?;
        info!(
            job_id,
            whatsapp_active = results.whatsapp_active,
            telegram_active = results.telegram_active,
            inactive = results.inactive,
            errors = results.errors,
            "job completed"
        );

        self.progress
            .publish(
                job_id,
                ProgressEvent::completed(job_id, total, &results, completed_at),
            )
            .await;
        self.progress.close(job_id).await;

        self.finalize(&job, &results).await;
        Ok(())
    }

    /// Post-completion side effects. Everything here is best-effort except
    /// that settlement must not be retried once performed; the ledger's
    /// check-and-set enforces that even if this routine runs twice for the
    /// same job id.
    async fn finalize(&self, job: &Job, results: &JobResults) {
        let user = match self.ledger.get_user(&job.user_id).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                warn!(job_id = %job.id, user_id = %job.user_id, "job owner not found");
                None
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "owner lookup failed");
                None
            }
        };

        if let Some(user) = &user {
            if let Some(address) = &user.email {
                let summary = JobSummary::from_job(job, results);
                if let Err(e) = self
                    .mailer
                    .send_job_completion(address, &user.username, &summary)
                    .await
                {
                    warn!(job_id = %job.id, error = %e, "completion email failed");
                }
            }
        }

        match self
            .ledger
            .settle(&job.id, &job.user_id, job.credits_used)
            .await
        {
            Ok(true) => {
                info!(job_id = %job.id, credits = job.credits_used, "credits settled");
                self.maybe_send_low_credit_alert(job).await;
            }
            Ok(false) => {
                info!(job_id = %job.id, "credits already settled, skipping");
            }
            Err(e) => {
                error!(job_id = %job.id, error = %e, "credit settlement failed");
            }
        }

        if let Err(e) = self
            .usage
            .record(
                &job.user_id,
                &job.id,
                "bulk_validation",
                job.credits_used,
                &format!(
                    "file={} total={} errors={}",
                    job.filename, job.total_numbers, results.errors
                ),
            )
            .await
        {
            warn!(job_id = %job.id, error = %e, "usage log write failed");
        }
    }

    async fn maybe_send_low_credit_alert(&self, job: &Job) {
        // re-read so the alert reflects the post-settlement balance
        let user = match self.ledger.get_user(&job.user_id).await {
            Ok(Some(user)) => user,
            _ => return,
        };
        if user.credits > self.low_credit_threshold {
            return;
        }
        let Some(address) = &user.email else {
            return;
        };
        if let Err(e) = self
            .mailer
            .send_low_credit_alert(address, &user.username, user.credits)
            .await
        {
            warn!(job_id = %job.id, error = %e, "low-credit alert failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CacheEntry, JobStatus, PhoneRecord, Platform, TelegramMethod, User, ValidationResult,
        ValidationStatus, WhatsAppMethod,
    };
    use crate::ports::{
        CacheStorePort, CapabilityMode, TelegramProvider, WhatsAppProvider,
    };
    use crate::usecases::pipeline::ProviderRegistry;
    use chrono::{DateTime, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    // ── fakes ────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct FakeStore {
        jobs: Mutex<HashMap<String, Job>>,
    }

    impl FakeStore {
        async fn insert(&self, job: Job) {
            self.jobs.lock().await.insert(job.id.clone(), job);
        }

        async fn job(&self, id: &str) -> Job {
            self.jobs.lock().await.get(id).cloned().expect("job exists")
        }
    }

    #[async_trait::async_trait]
    impl JobStorePort for FakeStore {
        async fn create_job(&self, job: &Job) -> Result<(), DomainError> {
            self.insert(job.clone()).await;
            Ok(())
        }

        async fn get_job(&self, job_id: &str) -> Result<Option<Job>, DomainError> {
            Ok(self.jobs.lock().await.get(job_id).cloned())
        }

        async fn claim_job(&self, job_id: &str) -> Result<Job, DomainError> {
            let mut jobs = self.jobs.lock().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| DomainError::Store(format!("job {job_id} not found")))?;
            job.status = JobStatus::Processing;
            job.updated_at = Utc::now();
            Ok(job.clone())
        }

        async fn update_progress(&self, job_id: &str, processed: u32) -> Result<(), DomainError> {
            let mut jobs = self.jobs.lock().await;
            if let Some(job) = jobs.get_mut(job_id) {
                job.processed_numbers = processed;
            }
            Ok(())
        }

        async fn complete_job(
            &self,
            job_id: &str,
            results: &JobResults,
            completed_at: DateTime<Utc>,
        ) -> Result<(), DomainError> {
            let mut jobs = self.jobs.lock().await;
            if let Some(job) = jobs.get_mut(job_id) {
                job.status = JobStatus::Completed;
                job.results = Some(results.clone());
                job.processed_numbers = results.details.len() as u32;
                job.completed_at = Some(completed_at);
            }
            Ok(())
        }

        async fn fail_job(&self, job_id: &str, error_message: &str) -> Result<(), DomainError> {
            let mut jobs = self.jobs.lock().await;
            if let Some(job) = jobs.get_mut(job_id) {
                job.status = JobStatus::Failed;
                job.error_message = Some(error_message.to_string());
            }
            Ok(())
        }

        async fn delete_job(&self, job_id: &str, _user_id: &str) -> Result<bool, DomainError> {
            Ok(self.jobs.lock().await.remove(job_id).is_some())
        }

        async fn append_quick_check_rollup(
            &self,
            _user_id: &str,
            _day: &str,
            _results: &JobResults,
        ) -> Result<(), DomainError> {
            Ok(())
        }
    }

    /// Ledger with the same at-most-once guard the SQLite store uses.
    struct FakeLedger {
        user: Mutex<User>,
        settled_jobs: Mutex<std::collections::HashSet<String>>,
        decrements: AtomicU32,
    }

    impl FakeLedger {
        fn with_credits(credits: i64) -> Self {
            Self {
                user: Mutex::new(User {
                    id: "u1".to_string(),
                    username: "budi".to_string(),
                    email: Some("budi@example.com".to_string()),
                    api_key: "key".to_string(),
                    credits,
                    tenant_id: "t1".to_string(),
                }),
                settled_jobs: Mutex::new(std::collections::HashSet::new()),
                decrements: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl CreditLedgerPort for FakeLedger {
        async fn get_user(&self, _user_id: &str) -> Result<Option<User>, DomainError> {
            Ok(Some(self.user.lock().await.clone()))
        }

        async fn get_user_by_api_key(&self, _api_key: &str) -> Result<Option<User>, DomainError> {
            Ok(Some(self.user.lock().await.clone()))
        }

        async fn reserve(&self, _user_id: &str, amount: i64) -> Result<(), DomainError> {
            let available = self.user.lock().await.credits;
            if available < amount {
                return Err(DomainError::InsufficientCredits {
                    required: amount,
                    available,
                });
            }
            Ok(())
        }

        async fn settle(
            &self,
            job_id: &str,
            _user_id: &str,
            amount: i64,
        ) -> Result<bool, DomainError> {
            let mut settled = self.settled_jobs.lock().await;
            if !settled.insert(job_id.to_string()) {
                return Ok(false);
            }
            self.user.lock().await.credits -= amount;
            self.decrements.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        async fn debit(
            &self,
            _reference: &str,
            _user_id: &str,
            amount: i64,
        ) -> Result<i64, DomainError> {
            let mut user = self.user.lock().await;
            user.credits -= amount;
            Ok(user.credits)
        }

        async fn credit_back(&self, _user_id: &str, amount: i64) -> Result<(), DomainError> {
            self.user.lock().await.credits += amount;
            Ok(())
        }

        async fn upsert_user(&self, user: &User) -> Result<(), DomainError> {
            *self.user.lock().await = user.clone();
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeUsage {
        entries: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl UsageLogPort for FakeUsage {
        async fn record(
            &self,
            _user_id: &str,
            reference: &str,
            action: &str,
            _credits: i64,
            _detail: &str,
        ) -> Result<(), DomainError> {
            self.entries
                .lock()
                .await
                .push(format!("{action}:{reference}"));
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeMailer {
        completions: AtomicU32,
        low_credit_alerts: AtomicU32,
    }

    #[async_trait::async_trait]
    impl MailerPort for FakeMailer {
        async fn send_job_completion(
            &self,
            _address: &str,
            _username: &str,
            _summary: &JobSummary,
        ) -> Result<(), DomainError> {
            self.completions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn send_low_credit_alert(
            &self,
            _address: &str,
            _username: &str,
            _remaining_credits: i64,
        ) -> Result<(), DomainError> {
            self.low_credit_alerts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn mode(&self) -> CapabilityMode {
            CapabilityMode::Simulated
        }
    }

    struct NullCache;

    #[async_trait::async_trait]
    impl CacheStorePort for NullCache {
        async fn get(&self, _phone: &str) -> Result<Option<CacheEntry>, DomainError> {
            Ok(None)
        }

        async fn put(
            &self,
            _phone: &str,
            _whatsapp: &ValidationResult,
            _telegram: &ValidationResult,
        ) -> Result<(), DomainError> {
            Ok(())
        }
    }

    /// WhatsApp fake that fails (status = Error) for one configured number.
    struct ScriptedWhatsApp {
        error_phone: Option<String>,
    }

    #[async_trait::async_trait]
    impl WhatsAppProvider for ScriptedWhatsApp {
        async fn validate(&self, phone: &str, _identifier: Option<&str>) -> ValidationResult {
            if self.error_phone.as_deref() == Some(phone) {
                ValidationResult::error(Platform::WhatsApp, "connect timeout after 10s")
            } else {
                ValidationResult::new(Platform::WhatsApp, ValidationStatus::Active)
            }
        }

        fn mode(&self) -> CapabilityMode {
            CapabilityMode::Simulated
        }
    }

    struct InactiveTelegram;

    #[async_trait::async_trait]
    impl TelegramProvider for InactiveTelegram {
        async fn validate(&self, _phone: &str) -> ValidationResult {
            ValidationResult::new(Platform::Telegram, ValidationStatus::Inactive)
        }

        fn mode(&self) -> CapabilityMode {
            CapabilityMode::Simulated
        }
    }

    // ── helpers ──────────────────────────────────────────────────────────

    struct Harness {
        store: Arc<FakeStore>,
        ledger: Arc<FakeLedger>,
        usage: Arc<FakeUsage>,
        mailer: Arc<FakeMailer>,
        progress: Arc<ProgressHub>,
        processor: JobProcessor,
    }

    fn harness(error_phone: Option<&str>, credits: i64, threshold: i64) -> Harness {
        let store = Arc::new(FakeStore::default());
        let ledger = Arc::new(FakeLedger::with_credits(credits));
        let usage = Arc::new(FakeUsage::default());
        let mailer = Arc::new(FakeMailer::default());
        let progress = Arc::new(ProgressHub::new());
        let pipeline = Arc::new(ValidationPipeline::new(
            Arc::new(NullCache),
            ProviderRegistry {
                whatsapp_standard: Arc::new(ScriptedWhatsApp {
                    error_phone: error_phone.map(String::from),
                }),
                whatsapp_deeplink: None,
                telegram_standard: Arc::new(InactiveTelegram),
                telegram_mtp: None,
                telegram_mtp_profile: None,
            },
        ));
        let processor = JobProcessor::new(
            store.clone(),
            pipeline,
            ledger.clone(),
            usage.clone(),
            mailer.clone(),
            progress.clone(),
            Duration::from_millis(0),
            threshold,
        );
        Harness {
            store,
            ledger,
            usage,
            mailer,
            progress,
            processor,
        }
    }

    fn job_with_phones(phones: &[&str], whatsapp: bool, telegram: bool) -> Job {
        let records = phones
            .iter()
            .map(|p| PhoneRecord {
                identifier: None,
                phone_number: (*p).to_string(),
                original_input: (*p).to_string(),
            })
            .collect::<Vec<_>>();
        let credits = records.len() as i64 * (i64::from(whatsapp) + i64::from(telegram));
        Job::new(
            "u1",
            "t1",
            "upload.csv",
            records,
            whatsapp,
            telegram,
            WhatsAppMethod::Standard,
            TelegramMethod::Standard,
            credits,
        )
    }

    // ── tests ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn provider_error_does_not_fail_the_job() {
        // 5 records, one WhatsApp timeout: job completes, errors == 1
        let h = harness(Some("+62811"), 1000, 0);
        let job = job_with_phones(&["+62811", "+62812", "+62813", "+62814", "+62815"], true, false);
        let job_id = job.id.clone();
        h.store.insert(job).await;

        h.processor.process(&job_id, CancellationToken::new()).await;

        let stored = h.store.job(&job_id).await;
        assert_eq!(stored.status, JobStatus::Completed);
        let results = stored.results.expect("results set on completion");
        assert_eq!(results.errors, 1);
        assert_eq!(results.whatsapp_active, 4);
        assert_eq!(results.details.len(), 5);
        assert_eq!(stored.processed_numbers, 5);
    }

    #[tokio::test]
    async fn settlement_happens_exactly_once_across_reruns() {
        let h = harness(None, 1000, 0);
        let job = job_with_phones(&["+62811", "+62812"], true, false);
        let job_id = job.id.clone();
        h.store.insert(job).await;

        // run the completion routine twice for the same job id (crash-retry)
        h.processor.process(&job_id, CancellationToken::new()).await;
        h.processor.process(&job_id, CancellationToken::new()).await;

        assert_eq!(h.ledger.decrements.load(Ordering::SeqCst), 1);
        assert_eq!(h.ledger.user.lock().await.credits, 1000 - 2);
    }

    #[tokio::test]
    async fn progress_events_are_monotonic_and_terminal() {
        let h = harness(None, 1000, 0);
        let job = job_with_phones(&["+62811", "+62812", "+62813"], true, true);
        let job_id = job.id.clone();
        h.store.insert(job).await;

        let mut rx = h.progress.subscribe(&job_id).await;
        h.processor.process(&job_id, CancellationToken::new()).await;

        let mut last_processed = 0;
        let mut final_event = None;
        while let Ok(event) = rx.recv().await {
            assert!(event.processed_numbers >= last_processed);
            last_processed = event.processed_numbers;
            final_event = Some(event);
        }

        let final_event = final_event.expect("at least one event");
        assert_eq!(final_event.status, JobStatus::Completed);
        assert_eq!(final_event.processed_numbers, 3);
        assert_eq!(final_event.progress_percentage, 100.0);
        assert!(final_event.results.is_some());
        assert!(final_event.completed_at.is_some());
    }

    #[tokio::test]
    async fn completion_sends_email_and_logs_usage() {
        let h = harness(None, 1000, 0);
        let job = job_with_phones(&["+62811"], true, false);
        let job_id = job.id.clone();
        h.store.insert(job).await;

        h.processor.process(&job_id, CancellationToken::new()).await;

        assert_eq!(h.mailer.completions.load(Ordering::SeqCst), 1);
        assert_eq!(h.mailer.low_credit_alerts.load(Ordering::SeqCst), 0);
        let entries = h.usage.entries.lock().await;
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("bulk_validation:"));
    }

    #[tokio::test]
    async fn low_balance_triggers_alert_after_settlement() {
        // 101 credits, 2-credit job, threshold 100: post-settlement 99 <= 100
        let h = harness(None, 101, 100);
        let job = job_with_phones(&["+62811", "+62812"], true, false);
        let job_id = job.id.clone();
        h.store.insert(job).await;

        h.processor.process(&job_id, CancellationToken::new()).await;

        assert_eq!(h.mailer.low_credit_alerts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_job_is_marked_failed() {
        let h = harness(None, 1000, 0);
        let job = job_with_phones(&["+62811", "+62812"], true, false);
        let job_id = job.id.clone();
        h.store.insert(job).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        h.processor.process(&job_id, cancel).await;

        let stored = h.store.job(&job_id).await;
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("job cancelled"));
        assert_eq!(h.ledger.decrements.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_job_records_nothing() {
        let h = harness(None, 1000, 0);
        h.processor
            .process("no-such-job", CancellationToken::new())
            .await;
        assert_eq!(h.ledger.decrements.load(Ordering::SeqCst), 0);
    }
}
