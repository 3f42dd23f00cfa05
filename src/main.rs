//! Wiring & DI. Entry point: bootstrap adapters, inject into services, run
//! the HTTP server. No business logic here.

use centang::adapters::email::{DisabledMailer, SendgridMailer};
use centang::adapters::http::{AppState, HttpServer, Limits, ServerConfig};
use centang::adapters::persistence::SqliteStore;
use centang::adapters::providers::{
    AccountPool, AccountSeed, DeeplinkWhatsApp, Dialog360Lookup, MtpTelegram,
    StatisticalTelegram, TwilioLookup, VonageLookup, WebHeuristicWhatsApp,
};
use centang::ports::{
    ApiPort, CacheStorePort, CreditLedgerPort, JobStorePort, MailerPort, TelegramProvider,
    UsageLogPort, WhatsAppProvider,
};
use centang::shared::config::AppConfig;
use centang::usecases::{
    JobProcessor, JobWorker, ProgressHub, ProviderRegistry, QuickCheckService,
    ValidationPipeline,
};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const TWILIO_BASE_URL: &str = "https://lookups.twilio.com";
const VONAGE_BASE_URL: &str = "https://api.nexmo.com";
const DIALOG360_BASE_URL: &str = "https://waba.360dialog.io";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!("no .env found"),
    }

    let cfg = AppConfig::load().unwrap_or_default();
    let data_dir = PathBuf::from(cfg.data_dir_or_default());

    // --- Persistence: one SQLite store backs four ports ---
    let sqlite_store = Arc::new(
        SqliteStore::connect(&data_dir)
            .await
            .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?,
    );
    let store: Arc<dyn JobStorePort> = Arc::clone(&sqlite_store) as Arc<dyn JobStorePort>;
    let cache: Arc<dyn CacheStorePort> = Arc::clone(&sqlite_store) as Arc<dyn CacheStorePort>;
    let ledger: Arc<dyn CreditLedgerPort> =
        Arc::clone(&sqlite_store) as Arc<dyn CreditLedgerPort>;
    let usage: Arc<dyn UsageLogPort> = Arc::clone(&sqlite_store) as Arc<dyn UsageLogPort>;

    // --- WhatsApp providers ---
    let wa_heuristic: Arc<dyn WhatsAppProvider> = Arc::new(WebHeuristicWhatsApp::new());

    let whatsapp_standard: Arc<dyn WhatsAppProvider> = if cfg.is_lookup_configured() {
        match cfg.whatsapp_lookup_provider.as_deref() {
            Some("twilio") => {
                info!("WhatsApp standard method backed by Twilio lookup");
                Arc::new(TwilioLookup::new(
                    TWILIO_BASE_URL.to_string(),
                    cfg.twilio_account_sid.clone().unwrap_or_default(),
                    cfg.twilio_auth_token.clone().unwrap_or_default(),
                ))
            }
            Some("vonage") => {
                info!("WhatsApp standard method backed by Vonage number insight");
                Arc::new(VonageLookup::new(
                    VONAGE_BASE_URL.to_string(),
                    cfg.vonage_api_key.clone().unwrap_or_default(),
                    cfg.vonage_api_secret.clone().unwrap_or_default(),
                ))
            }
            Some("360dialog") => {
                info!("WhatsApp standard method backed by 360dialog contacts check");
                Arc::new(Dialog360Lookup::new(
                    DIALOG360_BASE_URL.to_string(),
                    cfg.dialog360_api_key.clone().unwrap_or_default(),
                ))
            }
            other => {
                warn!(provider = ?other, "unknown lookup provider, using web heuristic");
                Arc::clone(&wa_heuristic)
            }
        }
    } else {
        info!("no paid lookup configured, WhatsApp standard method uses web heuristic");
        Arc::clone(&wa_heuristic)
    };

    let whatsapp_deeplink: Option<Arc<dyn WhatsAppProvider>> = if cfg.is_deeplink_configured() {
        match load_account_seeds(cfg.deeplink_accounts_path.as_deref().unwrap_or_default()).await
        {
            Ok(seeds) if !seeds.is_empty() => {
                info!(accounts = seeds.len(), "deep-link account pool loaded");
                let pool = Arc::new(AccountPool::new(seeds));
                Some(Arc::new(DeeplinkWhatsApp::new(
                    cfg.deeplink_broker_url.clone().unwrap_or_default(),
                    pool,
                    Arc::clone(&wa_heuristic),
                )))
            }
            Ok(_) => {
                warn!("deep-link accounts file is empty, deeplink_profile falls back to heuristic");
                None
            }
            Err(e) => {
                warn!(error = %e, "could not load deep-link accounts, falling back to heuristic");
                None
            }
        }
    } else {
        None
    };

    // --- Telegram providers ---
    let telegram_standard: Arc<dyn TelegramProvider> = Arc::new(StatisticalTelegram::new());
    let (telegram_mtp, telegram_mtp_profile) = match build_mtp_client(&cfg).await {
        Some(client) => {
            info!("Telegram MTP provider enabled");
            (
                Some(Arc::new(MtpTelegram::new(client.clone(), false))
                    as Arc<dyn TelegramProvider>),
                Some(Arc::new(MtpTelegram::new(client, true)) as Arc<dyn TelegramProvider>),
            )
        }
        None => {
            warn!("Telegram MTP not configured, mtp methods fall back to statistical heuristic");
            (None, None)
        }
    };

    let registry = ProviderRegistry {
        whatsapp_standard,
        whatsapp_deeplink,
        telegram_standard,
        telegram_mtp,
        telegram_mtp_profile,
    };

    // --- Mailer ---
    let mailer: Arc<dyn MailerPort> = if cfg.is_mailer_configured() {
        info!("mailer enabled with SendGrid adapter");
        Arc::new(SendgridMailer::new(
            cfg.sendgrid_api_key.clone().unwrap_or_default(),
            cfg.mail_from.clone().unwrap_or_default(),
            cfg.completion_template_id.clone().unwrap_or_default(),
            cfg.low_credit_template_id.clone().unwrap_or_default(),
        ))
    } else {
        warn!("CENTANG_SENDGRID_API_KEY not set, using disabled mailer");
        Arc::new(DisabledMailer::new())
    };

    // --- Pipeline, processor, worker ---
    let progress = Arc::new(ProgressHub::new());
    let pipeline = Arc::new(ValidationPipeline::new(Arc::clone(&cache), registry));

    let record_delay_ms = cfg.record_delay_ms_or_default();
    info!(record_delay_ms, "record rate limit: {} ms between records", record_delay_ms);

    let processor = Arc::new(JobProcessor::new(
        Arc::clone(&store),
        Arc::clone(&pipeline),
        Arc::clone(&ledger),
        Arc::clone(&usage),
        Arc::clone(&mailer),
        Arc::clone(&progress),
        Duration::from_millis(record_delay_ms),
        cfg.low_credit_threshold_or_default(),
    ));

    let job_concurrency = cfg.job_concurrency_or_default();
    info!(job_concurrency, "job worker pool: {} concurrent jobs", job_concurrency);
    let (worker, queue) = JobWorker::new(processor, job_concurrency);
    tokio::spawn(async move {
        worker.run().await;
    });

    let quick_check = Arc::new(QuickCheckService::new(
        Arc::clone(&pipeline),
        Arc::clone(&store),
        Arc::clone(&ledger),
        Arc::clone(&usage),
        cfg.quick_check_max_or_default(),
        cfg.credits_per_platform_or_default(),
    ));

    // --- HTTP server ---
    let server = HttpServer::new(
        ServerConfig {
            host: cfg.host_or_default(),
            port: cfg.port_or_default(),
        },
        AppState {
            store,
            ledger,
            quick_check,
            queue,
            progress,
            limits: Limits {
                max_upload_bytes: cfg.max_upload_bytes_or_default(),
                bulk_max_numbers: cfg.bulk_max_numbers_or_default(),
                credits_per_platform: cfg.credits_per_platform_or_default(),
            },
        },
    );

    server.serve().await.map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}

/// Read deep-link account seeds from a JSON file.
async fn load_account_seeds(path: &str) -> anyhow::Result<Vec<AccountSeed>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("read {}: {}", path, e))?;
    serde_json::from_str(&raw).map_err(|e| anyhow::anyhow!("parse {}: {}", path, e))
}

/// Create a grammers Client from an already-authorized session file.
/// Returns None (with a warning) when MTP is unconfigured or the session is
/// not logged in; the Telegram methods then degrade to the heuristic.
async fn build_mtp_client(cfg: &AppConfig) -> Option<grammers_client::Client> {
    if !cfg.is_mtp_configured() {
        return None;
    }
    let api_id = cfg.telegram_api_id.unwrap_or_default();
    let session_path = PathBuf::from(cfg.telegram_session_path.clone().unwrap_or_default());

    let session =
        match centang::adapters::providers::tg_session::open_file_session(&session_path).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "could not open Telegram session");
                return None;
            }
        };
    let session = Arc::new(session);
    let pool = grammers_client::SenderPool::new(session, api_id);
    let handle = pool.handle.clone();
    tokio::spawn(async move {
        pool.runner.run().await;
    });
    let client = grammers_client::Client::new(handle);

    match client.is_authorized().await {
        Ok(true) => Some(client),
        Ok(false) => {
            warn!(
                path = %session_path.display(),
                "Telegram session is not authorized; log in once with a userbot tool"
            );
            None
        }
        Err(e) => {
            warn!(error = %e, "Telegram authorization check failed");
            None
        }
    }
}
