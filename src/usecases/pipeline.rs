//! Shared per-number validation pipeline: cache lookup -> provider dispatch
//! -> write-through. Used by both the bulk job processor and quick check.
//!
//! - Cache errors degrade to misses; they never fail the request
//! - Cache writes happen only when both platforms were validated in the
//!   same pass (partial entries would answer later requests with data for a
//!   platform that was never checked)
//! - Cached results carry no identifier; the request's own is re-attached

use crate::domain::{PerNumberResult, PhoneRecord, TelegramMethod, WhatsAppMethod};
use crate::ports::{CacheStorePort, TelegramProvider, WhatsAppProvider};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Provider variants registered once at startup. Selection is by method
/// enum; variants without a configured backend fall back to the standard
/// one, so a lookup can never dead-end.
pub struct ProviderRegistry {
    pub whatsapp_standard: Arc<dyn WhatsAppProvider>,
    pub whatsapp_deeplink: Option<Arc<dyn WhatsAppProvider>>,
    pub telegram_standard: Arc<dyn TelegramProvider>,
    pub telegram_mtp: Option<Arc<dyn TelegramProvider>>,
    pub telegram_mtp_profile: Option<Arc<dyn TelegramProvider>>,
}

impl ProviderRegistry {
    pub fn whatsapp(&self, method: WhatsAppMethod) -> &Arc<dyn WhatsAppProvider> {
        match method {
            WhatsAppMethod::Standard => &self.whatsapp_standard,
            WhatsAppMethod::DeeplinkProfile => self
                .whatsapp_deeplink
                .as_ref()
                .unwrap_or(&self.whatsapp_standard),
        }
    }

    pub fn telegram(&self, method: TelegramMethod) -> &Arc<dyn TelegramProvider> {
        match method {
            TelegramMethod::Standard => &self.telegram_standard,
            TelegramMethod::Mtp => self.telegram_mtp.as_ref().unwrap_or(&self.telegram_standard),
            TelegramMethod::MtpProfile => self
                .telegram_mtp_profile
                .as_ref()
                .or(self.telegram_mtp.as_ref())
                .unwrap_or(&self.telegram_standard),
        }
    }
}

/// Which platforms and provider variants a request asked for.
#[derive(Debug, Clone, Copy)]
pub struct ValidationRequest {
    pub whatsapp: bool,
    pub telegram: bool,
    pub whatsapp_method: WhatsAppMethod,
    pub telegram_method: TelegramMethod,
}

/// Validation pipeline. Coordinates the cache and the provider registry for
/// a single phone record.
pub struct ValidationPipeline {
    cache: Arc<dyn CacheStorePort>,
    providers: ProviderRegistry,
}

impl ValidationPipeline {
    pub fn new(cache: Arc<dyn CacheStorePort>, providers: ProviderRegistry) -> Self {
        Self { cache, providers }
    }

    /// Validate one record against the requested platforms.
    ///
    /// Never fails: provider problems surface as `status = Error` results
    /// inside the returned detail.
    pub async fn validate_number(
        &self,
        record: &PhoneRecord,
        request: &ValidationRequest,
    ) -> PerNumberResult {
        let phone = record.phone_number.as_str();

        let cached = match self.cache.get(phone).await {
            Ok(Some(entry)) if entry.is_fresh(Utc::now()) => {
                debug!(phone, "cache hit");
                Some(entry)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(phone, error = %e, "cache read failed, treating as miss");
                None
            }
        };

        let mut whatsapp = None;
        let mut telegram = None;
        let mut whatsapp_fresh = false;
        let mut telegram_fresh = false;

        if request.whatsapp {
            whatsapp = cached.as_ref().and_then(|c| c.whatsapp.clone());
            if whatsapp.is_none() {
                let provider = self.providers.whatsapp(request.whatsapp_method);
                whatsapp = Some(
                    provider
                        .validate(phone, record.identifier.as_deref())
                        .await,
                );
                whatsapp_fresh = true;
            }
        }

        if request.telegram {
            telegram = cached.as_ref().and_then(|c| c.telegram.clone());
            if telegram.is_none() {
                let provider = self.providers.telegram(request.telegram_method);
                telegram = Some(provider.validate(phone).await);
                telegram_fresh = true;
            }
        }

        if whatsapp_fresh && telegram_fresh {
            if let (Some(wa), Some(tg)) = (&whatsapp, &telegram) {
                if let Err(e) = self.cache.put(phone, wa, tg).await {
                    warn!(phone, error = %e, "cache write failed");
                }
            }
        }

        PerNumberResult {
            identifier: record.identifier.clone(),
            phone_number: record.phone_number.clone(),
            original_input: record.original_input.clone(),
            whatsapp,
            telegram,
            error: None,
            processed_at: Utc::now(),
        }
    }
}
