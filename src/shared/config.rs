//! Application configuration. Server binding, limits, provider credentials.

use serde::Deserialize;

/// Default cap on concurrently processed bulk jobs.
pub const DEFAULT_JOB_CONCURRENCY: usize = 4;

/// Default courtesy delay between records within one job.
pub const DEFAULT_RECORD_DELAY_MS: u64 = 200;

/// Balance at or below this triggers the low-credit alert.
pub const DEFAULT_LOW_CREDIT_THRESHOLD: i64 = 100;

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<String>,

    /// Delay in ms between records in a bulk job (rate limiting courtesy to
    /// upstream providers). Read from CENTANG_RECORD_DELAY_MS.
    #[serde(default)]
    pub record_delay_ms: Option<u64>,

    /// Max bulk jobs processed concurrently. Read from CENTANG_JOB_CONCURRENCY.
    #[serde(default)]
    pub job_concurrency: Option<usize>,

    /// Credits charged per number per requested platform.
    #[serde(default)]
    pub credits_per_platform: Option<i64>,

    /// Balance threshold for the low-credit alert.
    #[serde(default)]
    pub low_credit_threshold: Option<i64>,

    /// Max numbers accepted by quick check.
    #[serde(default)]
    pub quick_check_max: Option<usize>,

    /// Max unique numbers accepted by bulk check after dedup.
    #[serde(default)]
    pub bulk_max_numbers: Option<usize>,

    /// Max upload size in bytes for bulk check.
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,

    // ─────────────────────────────────────────────────────────────────────────
    // Paid WhatsApp Lookup Configuration
    // ─────────────────────────────────────────────────────────────────────────
    /// Which paid lookup backend to use: "twilio" | "vonage" | "360dialog".
    /// Unset means the free web heuristic handles the standard method.
    #[serde(default)]
    pub whatsapp_lookup_provider: Option<String>,

    #[serde(default)]
    pub twilio_account_sid: Option<String>,
    #[serde(default)]
    pub twilio_auth_token: Option<String>,
    #[serde(default)]
    pub vonage_api_key: Option<String>,
    #[serde(default)]
    pub vonage_api_secret: Option<String>,
    #[serde(default)]
    pub dialog360_api_key: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // Deep-link (account session) Configuration
    // ─────────────────────────────────────────────────────────────────────────
    /// Base URL of the session broker fronting logged-in WhatsApp accounts.
    #[serde(default)]
    pub deeplink_broker_url: Option<String>,

    /// Path to a JSON file of account seeds (id, label, session_token,
    /// daily_quota).
    #[serde(default)]
    pub deeplink_accounts_path: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // Telegram MTP Configuration
    // ─────────────────────────────────────────────────────────────────────────
    /// Telegram API id from https://my.telegram.org. Read from CENTANG_TELEGRAM_API_ID.
    #[serde(default)]
    pub telegram_api_id: Option<i32>,

    /// Path to an already-authorized grammers session file.
    #[serde(default)]
    pub telegram_session_path: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // Mailer Configuration
    // ─────────────────────────────────────────────────────────────────────────
    /// SendGrid API key. Unset means the disabled mailer is wired in.
    #[serde(default)]
    pub sendgrid_api_key: Option<String>,

    #[serde(default)]
    pub mail_from: Option<String>,
    #[serde(default)]
    pub completion_template_id: Option<String>,
    #[serde(default)]
    pub low_credit_template_id: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("CENTANG"));
        if let Ok(path) = std::env::var("CENTANG_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c.build()?.try_deserialize()
    }

    pub fn host_or_default(&self) -> String {
        self.host.clone().unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(8080)
    }

    pub fn data_dir_or_default(&self) -> String {
        self.data_dir.clone().unwrap_or_else(|| "./data".to_string())
    }

    pub fn record_delay_ms_or_default(&self) -> u64 {
        self.record_delay_ms.unwrap_or(DEFAULT_RECORD_DELAY_MS)
    }

    pub fn job_concurrency_or_default(&self) -> usize {
        self.job_concurrency
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_JOB_CONCURRENCY)
    }

    pub fn credits_per_platform_or_default(&self) -> i64 {
        self.credits_per_platform.unwrap_or(1)
    }

    pub fn low_credit_threshold_or_default(&self) -> i64 {
        self.low_credit_threshold
            .unwrap_or(DEFAULT_LOW_CREDIT_THRESHOLD)
    }

    pub fn quick_check_max_or_default(&self) -> usize {
        self.quick_check_max.unwrap_or(20)
    }

    pub fn bulk_max_numbers_or_default(&self) -> usize {
        self.bulk_max_numbers.unwrap_or(1000)
    }

    pub fn max_upload_bytes_or_default(&self) -> usize {
        self.max_upload_bytes.unwrap_or(10 * 1024 * 1024)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Capability predicates
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns true if a paid WhatsApp lookup backend is fully configured.
    pub fn is_lookup_configured(&self) -> bool {
        match self.whatsapp_lookup_provider.as_deref() {
            Some("twilio") => {
                self.twilio_account_sid.is_some() && self.twilio_auth_token.is_some()
            }
            Some("vonage") => self.vonage_api_key.is_some() && self.vonage_api_secret.is_some(),
            Some("360dialog") => self.dialog360_api_key.is_some(),
            _ => false,
        }
    }

    /// Returns true if the deep-link account pool can be built.
    pub fn is_deeplink_configured(&self) -> bool {
        self.deeplink_broker_url.is_some() && self.deeplink_accounts_path.is_some()
    }

    /// Returns true if the MTP Telegram provider can be built.
    pub fn is_mtp_configured(&self) -> bool {
        self.telegram_api_id.is_some() && self.telegram_session_path.is_some()
    }

    /// Returns true if real mail can be sent.
    pub fn is_mailer_configured(&self) -> bool {
        self.sendgrid_api_key.is_some() && self.mail_from.is_some()
    }
}
