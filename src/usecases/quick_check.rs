//! Quick check: synchronous small-batch validation (no background job).
//!
//! Shares the normalize -> cache -> provider -> classify pipeline with the
//! bulk path, charges credits immediately, and folds the outcome into the
//! user's daily rollup row.

use crate::domain::{
    phone::parse_phone_batch, DomainError, JobResults, TelegramMethod, User, WhatsAppMethod,
};
use crate::ports::{CreditLedgerPort, JobStorePort, UsageLogPort};
use crate::usecases::pipeline::{ValidationPipeline, ValidationRequest};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Parameters of one quick-check request, already method-parsed by the
/// transport layer.
#[derive(Debug, Clone)]
pub struct QuickCheckInput {
    pub phone_inputs: Vec<String>,
    pub validate_whatsapp: bool,
    pub validate_telegram: bool,
    pub whatsapp_method: WhatsAppMethod,
    pub telegram_method: TelegramMethod,
}

/// Outcome returned to the caller inline.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QuickCheckOutcome {
    pub results: JobResults,
    pub duplicates_removed: usize,
    pub credits_used: i64,
    pub remaining_credits: i64,
}

/// Quick check service.
pub struct QuickCheckService {
    pipeline: Arc<ValidationPipeline>,
    store: Arc<dyn JobStorePort>,
    ledger: Arc<dyn CreditLedgerPort>,
    usage: Arc<dyn UsageLogPort>,
    max_inputs: usize,
    credits_per_platform: i64,
}

impl QuickCheckService {
    pub fn new(
        pipeline: Arc<ValidationPipeline>,
        store: Arc<dyn JobStorePort>,
        ledger: Arc<dyn CreditLedgerPort>,
        usage: Arc<dyn UsageLogPort>,
        max_inputs: usize,
        credits_per_platform: i64,
    ) -> Self {
        Self {
            pipeline,
            store,
            ledger,
            usage,
            max_inputs,
            credits_per_platform,
        }
    }

    /// Validate up to `max_inputs` numbers inline.
    ///
    /// Client input errors (empty batch, over-limit, no platform selected,
    /// insufficient credits) surface before any provider call.
    pub async fn run(
        &self,
        user: &User,
        input: QuickCheckInput,
    ) -> Result<QuickCheckOutcome, DomainError> {
        if !input.validate_whatsapp && !input.validate_telegram {
            return Err(DomainError::InvalidInput(
                "select at least one platform to validate".to_string(),
            ));
        }
        if input.phone_inputs.len() > self.max_inputs {
            return Err(DomainError::InvalidInput(format!(
                "quick check accepts at most {} numbers, got {}",
                self.max_inputs,
                input.phone_inputs.len()
            )));
        }

        let (records, duplicates_removed) = parse_phone_batch(&input.phone_inputs);
        if records.is_empty() {
            return Err(DomainError::InvalidInput(
                "no valid phone numbers in input".to_string(),
            ));
        }

        let platforms =
            i64::from(input.validate_whatsapp) + i64::from(input.validate_telegram);
        let cost = records.len() as i64 * platforms * self.credits_per_platform;
        self.ledger.reserve(&user.id, cost).await?;

        let request = ValidationRequest {
            whatsapp: input.validate_whatsapp,
            telegram: input.validate_telegram,
            whatsapp_method: input.whatsapp_method,
            telegram_method: input.telegram_method,
        };

        let mut results = JobResults::default();
        for record in &records {
            let detail = self.pipeline.validate_number(record, &request).await;
            results.push(detail, request.whatsapp, request.telegram);
        }

        let reference = uuid::Uuid::new_v4().to_string();
        let remaining_credits = self.ledger.debit(&reference, &user.id, cost).await?;

        if let Err(e) = self
            .usage
            .record(
                &user.id,
                &reference,
                "quick_check",
                cost,
                &format!("numbers={} errors={}", records.len(), results.errors),
            )
            .await
        {
            warn!(user_id = %user.id, error = %e, "usage log write failed");
        }

        // daily rollup is reporting, not billing: best-effort
        let day = Utc::now().format("%Y-%m-%d").to_string();
        if let Err(e) = self
            .store
            .append_quick_check_rollup(&user.id, &day, &results)
            .await
        {
            warn!(user_id = %user.id, day, error = %e, "rollup append failed");
        }

        info!(
            user_id = %user.id,
            numbers = records.len(),
            duplicates_removed,
            credits = cost,
            "quick check complete"
        );

        Ok(QuickCheckOutcome {
            results,
            duplicates_removed,
            credits_used: cost,
            remaining_credits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        CacheEntry, Job, Platform, ValidationResult, ValidationStatus,
    };
    use crate::ports::{
        CacheStorePort, CapabilityMode, TelegramProvider, WhatsAppProvider,
    };
    use crate::usecases::pipeline::ProviderRegistry;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    struct ActiveWhatsApp;

    #[async_trait::async_trait]
    impl WhatsAppProvider for ActiveWhatsApp {
        async fn validate(&self, _phone: &str, _identifier: Option<&str>) -> ValidationResult {
            ValidationResult::new(Platform::WhatsApp, ValidationStatus::Active)
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

    #[derive(Default)]
    struct RollupStore {
        rollups: Mutex<Vec<(String, String, u32)>>,
    }

    #[async_trait::async_trait]
    impl JobStorePort for RollupStore {
        async fn create_job(&self, _job: &Job) -> Result<(), DomainError> {
            Ok(())
        }

        async fn get_job(&self, _job_id: &str) -> Result<Option<Job>, DomainError> {
            Ok(None)
        }

        async fn claim_job(&self, job_id: &str) -> Result<Job, DomainError> {
            Err(DomainError::Store(format!("job {job_id} not found")))
        }

        async fn update_progress(&self, _job_id: &str, _processed: u32) -> Result<(), DomainError> {
            Ok(())
        }

        async fn complete_job(
            &self,
            _job_id: &str,
            _results: &JobResults,
            _completed_at: DateTime<Utc>,
        ) -> Result<(), DomainError> {
            Ok(())
        }

        async fn fail_job(&self, _job_id: &str, _error_message: &str) -> Result<(), DomainError> {
            Ok(())
        }

        async fn delete_job(&self, _job_id: &str, _user_id: &str) -> Result<bool, DomainError> {
            Ok(false)
        }

        async fn append_quick_check_rollup(
            &self,
            user_id: &str,
            day: &str,
            results: &JobResults,
        ) -> Result<(), DomainError> {
            self.rollups.lock().await.push((
                user_id.to_string(),
                day.to_string(),
                results.details.len() as u32,
            ));
            Ok(())
        }
    }

    struct FixedLedger {
        credits: Mutex<i64>,
        debits: AtomicU32,
    }

    #[async_trait::async_trait]
    impl CreditLedgerPort for FixedLedger {
        async fn get_user(&self, _user_id: &str) -> Result<Option<User>, DomainError> {
            Ok(None)
        }

        async fn get_user_by_api_key(&self, _api_key: &str) -> Result<Option<User>, DomainError> {
            Ok(None)
        }

        async fn reserve(&self, _user_id: &str, amount: i64) -> Result<(), DomainError> {
            let available = *self.credits.lock().await;
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
            _job_id: &str,
            _user_id: &str,
            _amount: i64,
        ) -> Result<bool, DomainError> {
            Ok(false)
        }

        async fn debit(
            &self,
            _reference: &str,
            _user_id: &str,
            amount: i64,
        ) -> Result<i64, DomainError> {
            self.debits.fetch_add(1, Ordering::SeqCst);
            let mut credits = self.credits.lock().await;
            *credits -= amount;
            Ok(*credits)
        }

        async fn credit_back(&self, _user_id: &str, _amount: i64) -> Result<(), DomainError> {
            Ok(())
        }

        async fn upsert_user(&self, _user: &User) -> Result<(), DomainError> {
            Ok(())
        }
    }

    struct NullUsage;

    #[async_trait::async_trait]
    impl UsageLogPort for NullUsage {
        async fn record(
            &self,
            _user_id: &str,
            _reference: &str,
            _action: &str,
            _credits: i64,
            _detail: &str,
        ) -> Result<(), DomainError> {
            Ok(())
        }
    }

    fn service(credits: i64) -> (QuickCheckService, Arc<RollupStore>, Arc<FixedLedger>) {
        let store = Arc::new(RollupStore::default());
        let ledger = Arc::new(FixedLedger {
            credits: Mutex::new(credits),
            debits: AtomicU32::new(0),
        });
        let pipeline = Arc::new(ValidationPipeline::new(
            Arc::new(NullCache),
            ProviderRegistry {
                whatsapp_standard: Arc::new(ActiveWhatsApp),
                whatsapp_deeplink: None,
                telegram_standard: Arc::new(InactiveTelegram),
                telegram_mtp: None,
                telegram_mtp_profile: None,
            },
        ));
        let svc = QuickCheckService::new(
            pipeline,
            store.clone(),
            ledger.clone(),
            Arc::new(NullUsage),
            20,
            1,
        );
        (svc, store, ledger)
    }

    fn user() -> User {
        User {
            id: "u1".to_string(),
            username: "budi".to_string(),
            email: None,
            api_key: "key".to_string(),
            credits: 50,
            tenant_id: "t1".to_string(),
        }
    }

    fn input(phones: &[&str], whatsapp: bool, telegram: bool) -> QuickCheckInput {
        QuickCheckInput {
            phone_inputs: phones.iter().map(|p| (*p).to_string()).collect(),
            validate_whatsapp: whatsapp,
            validate_telegram: telegram,
            whatsapp_method: WhatsAppMethod::Standard,
            telegram_method: TelegramMethod::Standard,
        }
    }

    #[tokio::test]
    async fn happy_path_charges_and_rolls_up() {
        let (svc, store, ledger) = service(50);

        let outcome = svc
            .run(&user(), input(&["Budi 08123456789", "08987654321"], true, true))
            .await
            .unwrap();

        assert_eq!(outcome.results.details.len(), 2);
        assert_eq!(outcome.credits_used, 4); // 2 numbers x 2 platforms
        assert_eq!(outcome.remaining_credits, 46);
        assert_eq!(ledger.debits.load(Ordering::SeqCst), 1);
        assert_eq!(store.rollups.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn over_limit_batch_is_rejected() {
        let (svc, _, ledger) = service(1000);
        let phones: Vec<String> = (0..21).map(|i| format!("0812345678{i:02}")).collect();
        let input = QuickCheckInput {
            phone_inputs: phones,
            validate_whatsapp: true,
            validate_telegram: false,
            whatsapp_method: WhatsAppMethod::Standard,
            telegram_method: TelegramMethod::Standard,
        };

        let err = svc.run(&user(), input).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
        assert_eq!(ledger.debits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_platform_selected_is_rejected() {
        let (svc, _, _) = service(50);
        let err = svc
            .run(&user(), input(&["08123456789"], false, false))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn insufficient_credits_carry_both_amounts() {
        let (svc, _, _) = service(1);
        let err = svc
            .run(&user(), input(&["08123456789", "08123456780"], true, false))
            .await
            .unwrap_err();
        match err {
            DomainError::InsufficientCredits { required, available } => {
                assert_eq!(required, 2);
                assert_eq!(available, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn duplicates_are_removed_before_charging() {
        let (svc, _, _) = service(50);
        let outcome = svc
            .run(
                &user(),
                input(&["Budi 08123456789", "08123456789"], true, false),
            )
            .await
            .unwrap();

        assert_eq!(outcome.results.details.len(), 1);
        assert_eq!(outcome.duplicates_removed, 1);
        assert_eq!(outcome.credits_used, 1);
        assert_eq!(
            outcome.results.details[0].identifier.as_deref(),
            Some("Budi")
        );
    }
}
