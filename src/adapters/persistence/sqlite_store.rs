//! SQLite-backed store via libsql. One database file backs the job store,
//! the validation cache, the credit ledger and the usage log.
//!
//! Uses the same libsql backend as grammers-session to avoid duplicate
//! SQLite symbol link errors. Nested data (phone records, results, cached
//! platform results) lives in JSON columns; timestamps are Unix seconds.

use crate::domain::{
    CacheEntry, DomainError, Job, JobResults, JobStatus, PhoneRecord, TelegramMethod, User,
    ValidationResult, WhatsAppMethod,
};
use crate::ports::{CacheStorePort, CreditLedgerPort, JobStorePort, UsageLogPort};
use chrono::{DateTime, Utc};
use libsql::{params, Database};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

const JOBS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    filename TEXT NOT NULL,
    status TEXT NOT NULL,
    total_numbers INTEGER NOT NULL,
    processed_numbers INTEGER NOT NULL DEFAULT 0,
    phone_data TEXT NOT NULL,
    validate_whatsapp INTEGER NOT NULL,
    validate_telegram INTEGER NOT NULL,
    whatsapp_method TEXT NOT NULL,
    telegram_method TEXT NOT NULL,
    results TEXT,
    credits_used INTEGER NOT NULL,
    credits_settled INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    completed_at INTEGER
)"#;
const JOBS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_jobs_user_created ON jobs (user_id, created_at DESC)";

const CACHE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS validation_cache (
    phone_number TEXT PRIMARY KEY,
    whatsapp_json TEXT,
    telegram_json TEXT,
    cached_at INTEGER NOT NULL
)"#;

const USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    email TEXT,
    api_key TEXT NOT NULL UNIQUE,
    credits INTEGER NOT NULL DEFAULT 0,
    tenant_id TEXT NOT NULL
)"#;

const USAGE_LOG_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS usage_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    reference TEXT NOT NULL,
    action TEXT NOT NULL,
    credits INTEGER NOT NULL,
    detail TEXT NOT NULL,
    created_at INTEGER NOT NULL
)"#;

/// One row per user per day; quick checks fold their counters in.
const ROLLUPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS quick_check_rollups (
    user_id TEXT NOT NULL,
    day TEXT NOT NULL,
    total_checked INTEGER NOT NULL DEFAULT 0,
    whatsapp_active INTEGER NOT NULL DEFAULT 0,
    telegram_active INTEGER NOT NULL DEFAULT 0,
    inactive INTEGER NOT NULL DEFAULT 0,
    errors INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, day)
)"#;

/// SQLite store. One database file (centang.db) in the given base directory.
/// Safe to share via Arc; every call opens its own connection.
pub struct SqliteStore {
    db: Database,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Connect to (or create) the database and ensure the schema exists.
    /// Call once at startup.
    ///
    /// WAL mode enables concurrent readers + one writer; synchronous=NORMAL
    /// is safe with WAL and faster than FULL.
    pub async fn connect(base_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base).map_err(|e| DomainError::Store(e.to_string()))?;
        let db_path = base.join("centang.db");
        let path_str = db_path.to_string_lossy();
        let db = libsql::Builder::new_local(path_str.as_ref())
            .build()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        let conn = db.connect().map_err(|e| DomainError::Store(e.to_string()))?;

        // PRAGMA returns a row (new value); use query and consume rows
        // (execute fails when rows are returned).
        for pragma in ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL"] {
            let mut rows = conn
                .query(pragma, ())
                .await
                .map_err(|e| DomainError::Store(format!("{pragma} failed: {e}")))?;
            while rows
                .next()
                .await
                .map_err(|e| DomainError::Store(e.to_string()))?
                .is_some()
            {}
        }

        for ddl in [
            JOBS_TABLE,
            JOBS_INDEX,
            CACHE_TABLE,
            USERS_TABLE,
            USAGE_LOG_TABLE,
            ROLLUPS_TABLE,
        ] {
            conn.execute(ddl, ())
                .await
                .map_err(|e| DomainError::Store(e.to_string()))?;
        }

        info!(path = %db_path.display(), "SQLite connected with WAL mode");

        Ok(Self {
            db,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<libsql::Connection, DomainError> {
        self.db.connect().map_err(|e| DomainError::Store(e.to_string()))
    }

    fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DomainError> {
        serde_json::to_string(value).map_err(|e| DomainError::Store(e.to_string()))
    }

    fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, DomainError> {
        serde_json::from_str(s).map_err(|e| DomainError::Store(e.to_string()))
    }

    fn job_from_row(row: &libsql::Row) -> Result<Job, DomainError> {
        let status_str: String = row.get(4).map_err(|e| DomainError::Store(e.to_string()))?;
        let phone_data_json: String = row.get(7).map_err(|e| DomainError::Store(e.to_string()))?;
        let wa_method: String = row.get(10).map_err(|e| DomainError::Store(e.to_string()))?;
        let tg_method: String = row.get(11).map_err(|e| DomainError::Store(e.to_string()))?;
        let results_json: Option<String> = row.get::<String>(12).ok();
        let created_at: i64 = row.get(16).map_err(|e| DomainError::Store(e.to_string()))?;
        let updated_at: i64 = row.get(17).map_err(|e| DomainError::Store(e.to_string()))?;
        let completed_at: Option<i64> = row.get::<i64>(18).ok();

        let phone_data: Vec<PhoneRecord> = Self::from_json(&phone_data_json)?;
        let results: Option<JobResults> = match results_json {
            Some(json) => Some(Self::from_json(&json)?),
            None => None,
        };

        Ok(Job {
            id: row.get(0).map_err(|e| DomainError::Store(e.to_string()))?,
            user_id: row.get(1).map_err(|e| DomainError::Store(e.to_string()))?,
            tenant_id: row.get(2).map_err(|e| DomainError::Store(e.to_string()))?,
            filename: row.get(3).map_err(|e| DomainError::Store(e.to_string()))?,
            status: JobStatus::from_str(&status_str)?,
            total_numbers: row
                .get::<i64>(5)
                .map_err(|e| DomainError::Store(e.to_string()))? as u32,
            processed_numbers: row
                .get::<i64>(6)
                .map_err(|e| DomainError::Store(e.to_string()))? as u32,
            phone_data,
            validate_whatsapp: row
                .get::<i64>(8)
                .map_err(|e| DomainError::Store(e.to_string()))?
                != 0,
            validate_telegram: row
                .get::<i64>(9)
                .map_err(|e| DomainError::Store(e.to_string()))?
                != 0,
            whatsapp_method: WhatsAppMethod::from_str(&wa_method)
                .unwrap_or(WhatsAppMethod::Standard),
            telegram_method: TelegramMethod::from_str(&tg_method)
                .unwrap_or(TelegramMethod::Standard),
            results,
            credits_used: row.get(13).map_err(|e| DomainError::Store(e.to_string()))?,
            credits_settled: row
                .get::<i64>(14)
                .map_err(|e| DomainError::Store(e.to_string()))?
                != 0,
            error_message: row.get::<String>(15).ok(),
            created_at: ts_to_datetime(created_at),
            updated_at: ts_to_datetime(updated_at),
            completed_at: completed_at.map(ts_to_datetime),
        })
    }

    fn user_from_row(row: &libsql::Row) -> Result<User, DomainError> {
        Ok(User {
            id: row.get(0).map_err(|e| DomainError::Store(e.to_string()))?,
            username: row.get(1).map_err(|e| DomainError::Store(e.to_string()))?,
            email: row.get::<String>(2).ok(),
            api_key: row.get(3).map_err(|e| DomainError::Store(e.to_string()))?,
            credits: row.get(4).map_err(|e| DomainError::Store(e.to_string()))?,
            tenant_id: row.get(5).map_err(|e| DomainError::Store(e.to_string()))?,
        })
    }
}

const JOB_COLUMNS: &str = "id, user_id, tenant_id, filename, status, total_numbers, \
                           processed_numbers, phone_data, validate_whatsapp, validate_telegram, \
                           whatsapp_method, telegram_method, results, credits_used, \
                           credits_settled, error_message, created_at, updated_at, completed_at";

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or_default()
}

#[async_trait::async_trait]
impl JobStorePort for SqliteStore {
    async fn create_job(&self, job: &Job) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO jobs (id, user_id, tenant_id, filename, status, total_numbers,
                              processed_numbers, phone_data, validate_whatsapp, validate_telegram,
                              whatsapp_method, telegram_method, results, credits_used,
                              credits_settled, error_message, created_at, updated_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, ?13, 0, NULL, ?14, ?15, NULL)
            "#,
            params![
                job.id.as_str(),
                job.user_id.as_str(),
                job.tenant_id.as_str(),
                job.filename.as_str(),
                job.status.as_str(),
                job.total_numbers as i64,
                job.processed_numbers as i64,
                Self::to_json(&job.phone_data)?,
                job.validate_whatsapp as i64,
                job.validate_telegram as i64,
                job.whatsapp_method.as_str(),
                job.telegram_method.as_str(),
                job.credits_used,
                job.created_at.timestamp(),
                job.updated_at.timestamp(),
            ],
        )
        .await
        .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, DomainError> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![job_id],
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        match rows
            .next()
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?
        {
            Some(row) => Ok(Some(Self::job_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn claim_job(&self, job_id: &str) -> Result<Job, DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE jobs SET status = 'processing', updated_at = ?2 WHERE id = ?1",
            params![job_id, Utc::now().timestamp()],
        )
        .await
        .map_err(|e| DomainError::Store(e.to_string()))?;

        self.get_job(job_id)
            .await?
            .ok_or_else(|| DomainError::Store(format!("job {job_id} disappeared during claim")))
    }

    async fn update_progress(&self, job_id: &str, processed: u32) -> Result<(), DomainError> {
        let conn = self.conn()?;
        // MAX keeps the counter monotonic even if a stale write lands late
        conn.execute(
            "UPDATE jobs SET processed_numbers = MAX(processed_numbers, ?2), updated_at = ?3 \
             WHERE id = ?1",
            params![job_id, processed as i64, Utc::now().timestamp()],
        )
        .await
        .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(())
    }

    async fn complete_job(
        &self,
        job_id: &str,
        results: &JobResults,
        completed_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE jobs SET status = 'completed', results = ?2,
                            processed_numbers = ?3, updated_at = ?4, completed_at = ?4
            WHERE id = ?1
            "#,
            params![
                job_id,
                Self::to_json(results)?,
                results.details.len() as i64,
                completed_at.timestamp(),
            ],
        )
        .await
        .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(())
    }

    async fn fail_job(&self, job_id: &str, error_message: &str) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE jobs SET status = 'failed', error_message = ?2, updated_at = ?3 WHERE id = ?1",
            params![job_id, error_message, Utc::now().timestamp()],
        )
        .await
        .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(())
    }

    async fn delete_job(&self, job_id: &str, user_id: &str) -> Result<bool, DomainError> {
        let conn = self.conn()?;
        let affected = conn
            .execute(
                "DELETE FROM jobs WHERE id = ?1 AND user_id = ?2",
                params![job_id, user_id],
            )
            .await
            .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(affected > 0)
    }

    async fn append_quick_check_rollup(
        &self,
        user_id: &str,
        day: &str,
        results: &JobResults,
    ) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO quick_check_rollups
                (user_id, day, total_checked, whatsapp_active, telegram_active, inactive, errors, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (user_id, day) DO UPDATE SET
                total_checked = total_checked + excluded.total_checked,
                whatsapp_active = whatsapp_active + excluded.whatsapp_active,
                telegram_active = telegram_active + excluded.telegram_active,
                inactive = inactive + excluded.inactive,
                errors = errors + excluded.errors,
                updated_at = excluded.updated_at
            "#,
            params![
                user_id,
                day,
                results.details.len() as i64,
                results.whatsapp_active as i64,
                results.telegram_active as i64,
                results.inactive as i64,
                results.errors as i64,
                Utc::now().timestamp(),
            ],
        )
        .await
        .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CacheStorePort for SqliteStore {
    async fn get(&self, phone: &str) -> Result<Option<CacheEntry>, DomainError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DomainError::Cache(e.to_string()))?;
        let mut rows = conn
            .query(
                "SELECT phone_number, whatsapp_json, telegram_json, cached_at \
                 FROM validation_cache WHERE phone_number = ?1",
                params![phone],
            )
            .await
            .map_err(|e| DomainError::Cache(e.to_string()))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DomainError::Cache(e.to_string()))?
        else {
            return Ok(None);
        };

        let whatsapp_json: Option<String> = row.get::<String>(1).ok();
        let telegram_json: Option<String> = row.get::<String>(2).ok();
        let cached_at: i64 = row.get(3).map_err(|e| DomainError::Cache(e.to_string()))?;

        let parse = |json: Option<String>| -> Option<ValidationResult> {
            json.and_then(|j| serde_json::from_str(&j).ok())
        };

        Ok(Some(CacheEntry {
            phone_number: row.get(0).map_err(|e| DomainError::Cache(e.to_string()))?,
            whatsapp: parse(whatsapp_json),
            telegram: parse(telegram_json),
            cached_at: ts_to_datetime(cached_at),
        }))
    }

    async fn put(
        &self,
        phone: &str,
        whatsapp: &ValidationResult,
        telegram: &ValidationResult,
    ) -> Result<(), DomainError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DomainError::Cache(e.to_string()))?;
        let whatsapp_json =
            serde_json::to_string(whatsapp).map_err(|e| DomainError::Cache(e.to_string()))?;
        let telegram_json =
            serde_json::to_string(telegram).map_err(|e| DomainError::Cache(e.to_string()))?;
        conn.execute(
            r#"
            INSERT INTO validation_cache (phone_number, whatsapp_json, telegram_json, cached_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (phone_number) DO UPDATE SET
                whatsapp_json = excluded.whatsapp_json,
                telegram_json = excluded.telegram_json,
                cached_at = excluded.cached_at
            "#,
            params![phone, whatsapp_json, telegram_json, Utc::now().timestamp()],
        )
        .await
        .map_err(|e| DomainError::Cache(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl CreditLedgerPort for SqliteStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, DomainError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DomainError::Ledger(e.to_string()))?;
        let mut rows = conn
            .query(
                "SELECT id, username, email, api_key, credits, tenant_id FROM users WHERE id = ?1",
                params![user_id],
            )
            .await
            .map_err(|e| DomainError::Ledger(e.to_string()))?;
        match rows
            .next()
            .await
            .map_err(|e| DomainError::Ledger(e.to_string()))?
        {
            Some(row) => Ok(Some(Self::user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_user_by_api_key(&self, api_key: &str) -> Result<Option<User>, DomainError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DomainError::Ledger(e.to_string()))?;
        let mut rows = conn
            .query(
                "SELECT id, username, email, api_key, credits, tenant_id FROM users \
                 WHERE api_key = ?1",
                params![api_key],
            )
            .await
            .map_err(|e| DomainError::Ledger(e.to_string()))?;
        match rows
            .next()
            .await
            .map_err(|e| DomainError::Ledger(e.to_string()))?
        {
            Some(row) => Ok(Some(Self::user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn reserve(&self, user_id: &str, amount: i64) -> Result<(), DomainError> {
        let available = self
            .get_user(user_id)
            .await?
            .map(|u| u.credits)
            .ok_or_else(|| DomainError::Ledger(format!("user {user_id} not found")))?;
        if available < amount {
            return Err(DomainError::InsufficientCredits {
                required: amount,
                available,
            });
        }
        Ok(())
    }

    async fn settle(&self, job_id: &str, user_id: &str, amount: i64) -> Result<bool, DomainError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DomainError::Ledger(e.to_string()))?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DomainError::Ledger(e.to_string()))?;

        // The guard: only the call that flips the flag gets to decrement.
        let claimed = tx
            .execute(
                "UPDATE jobs SET credits_settled = 1, updated_at = ?2 \
                 WHERE id = ?1 AND credits_settled = 0",
                params![job_id, Utc::now().timestamp()],
            )
            .await
            .map_err(|e| DomainError::Ledger(e.to_string()))?;

        if claimed == 0 {
            tx.rollback()
                .await
                .map_err(|e| DomainError::Ledger(e.to_string()))?;
            return Ok(false);
        }

        tx.execute(
            "UPDATE users SET credits = credits - ?2 WHERE id = ?1",
            params![user_id, amount],
        )
        .await
        .map_err(|e| DomainError::Ledger(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| DomainError::Ledger(e.to_string()))?;
        Ok(true)
    }

    async fn debit(
        &self,
        _reference: &str,
        user_id: &str,
        amount: i64,
    ) -> Result<i64, DomainError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DomainError::Ledger(e.to_string()))?;
        conn.execute(
            "UPDATE users SET credits = credits - ?2 WHERE id = ?1",
            params![user_id, amount],
        )
        .await
        .map_err(|e| DomainError::Ledger(e.to_string()))?;

        self.get_user(user_id)
            .await?
            .map(|u| u.credits)
            .ok_or_else(|| DomainError::Ledger(format!("user {user_id} not found")))
    }

    async fn credit_back(&self, user_id: &str, amount: i64) -> Result<(), DomainError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DomainError::Ledger(e.to_string()))?;
        // single-statement addition: cannot race settle's transaction
        conn.execute(
            "UPDATE users SET credits = credits + ?2 WHERE id = ?1",
            params![user_id, amount],
        )
        .await
        .map_err(|e| DomainError::Ledger(e.to_string()))?;
        Ok(())
    }

    async fn upsert_user(&self, user: &User) -> Result<(), DomainError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| DomainError::Ledger(e.to_string()))?;
        conn.execute(
            r#"
            INSERT INTO users (id, username, email, api_key, credits, tenant_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (id) DO UPDATE SET
                username = excluded.username,
                email = excluded.email,
                api_key = excluded.api_key,
                credits = excluded.credits,
                tenant_id = excluded.tenant_id
            "#,
            params![
                user.id.as_str(),
                user.username.as_str(),
                user.email.as_deref(),
                user.api_key.as_str(),
                user.credits,
                user.tenant_id.as_str(),
            ],
        )
        .await
        .map_err(|e| DomainError::Ledger(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl UsageLogPort for SqliteStore {
    async fn record(
        &self,
        user_id: &str,
        reference: &str,
        action: &str,
        credits: i64,
        detail: &str,
    ) -> Result<(), DomainError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO usage_log (user_id, reference, action, credits, detail, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                user_id,
                reference,
                action,
                credits,
                detail,
                Utc::now().timestamp()
            ],
        )
        .await
        .map_err(|e| DomainError::Store(e.to_string()))?;
        Ok(())
    }
}
